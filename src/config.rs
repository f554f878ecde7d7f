//! Application configuration, loaded from environment variables.
//!
//! Every value falls back to a safe default when the variable is missing
//! or unparsable; problems are reported on stderr instead of aborting
//! startup.

use std::env;
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use crate::packer::PackerConfig;
use crate::types::DEFAULT_DECIMAL_FACTOR;

/// Complete application configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment
    /// variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            engine: EngineConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;

    fn from_env() -> Self {
        let host_value =
            env_string("PACKWISE_API_HOST").unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, display_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                eprintln!(
                    "⚠️ Could not parse PACKWISE_API_HOST ('{}'): {}. Using {}.",
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (
                    Self::DEFAULT_HOST
                        .parse::<IpAddr>()
                        .expect("Default host must be valid"),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = load_parsed(
            "PACKWISE_API_PORT",
            Self::DEFAULT_PORT,
            |value: &u16| *value != 0,
            "must not be 0",
        );

        Self {
            bind_ip,
            display_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    /// Configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }
}

/// Configuration for the packing engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    packer: PackerConfig,
    decimal_factor: i32,
}

impl EngineConfig {
    const TIME_BUDGET_VAR: &'static str = "PACKWISE_TIME_BUDGET_MS";
    const COUNTING_OVERLAP_VAR: &'static str = "PACKWISE_COUNTING_OVERLAP_RATIO";
    const BLOCKING_OVERLAP_VAR: &'static str = "PACKWISE_BLOCKING_OVERLAP_RATIO";
    const EXACT_AT_PLACEMENT_VAR: &'static str = "PACKWISE_EXACT_AT_PLACEMENT";
    const DECIMAL_FACTOR_VAR: &'static str = "PACKWISE_DECIMAL_FACTOR";

    fn from_env() -> Self {
        let defaults = PackerConfig::default();

        let time_budget_ms = load_parsed(
            Self::TIME_BUDGET_VAR,
            PackerConfig::DEFAULT_TIME_BUDGET_MS,
            |value: &u64| *value > 0,
            "must be greater than 0",
        );

        let counting_overlap = load_parsed(
            Self::COUNTING_OVERLAP_VAR,
            defaults.stacking.counting_overlap_ratio,
            |value: &f64| (0.0..=1.0).contains(value),
            "must be between 0 and 1",
        );

        let blocking_overlap = load_parsed(
            Self::BLOCKING_OVERLAP_VAR,
            defaults.stacking.blocking_overlap_ratio,
            |value: &f64| (0.0..=1.0).contains(value),
            "must be between 0 and 1",
        );

        let exact_at_placement = env_string(Self::EXACT_AT_PLACEMENT_VAR)
            .and_then(|raw| parse_bool(&raw, Self::EXACT_AT_PLACEMENT_VAR))
            .unwrap_or(false);

        // More than six decimal places of integer resolution overflows
        // volumes of real-world container sizes.
        let decimal_factor = load_parsed(
            Self::DECIMAL_FACTOR_VAR,
            DEFAULT_DECIMAL_FACTOR,
            |value: &i32| (-6..=6).contains(value),
            "must be between -6 and 6",
        );

        let packer = PackerConfig::builder()
            .time_budget_ms(time_budget_ms)
            .counting_overlap_ratio(counting_overlap)
            .blocking_overlap_ratio(blocking_overlap)
            .exact_at_placement(exact_at_placement)
            .build();

        Self {
            packer,
            decimal_factor,
        }
    }

    /// Returns the configured PackerConfig.
    pub fn packer_config(&self) -> PackerConfig {
        self.packer
    }

    /// Decimal factor for converting boundary values to integer units.
    pub fn decimal_factor(&self) -> i32 {
        self.decimal_factor
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            eprintln!(
                "⚠️ Access to {} failed: {}. Using default value.",
                name, err
            );
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            eprintln!(
                "⚠️ Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

/// Loads and validates one numeric environment variable, falling back to
/// the default with a warning on parse or validation failure.
fn load_parsed<T>(
    var_name: &str,
    default: T,
    validator: impl Fn(&T) -> bool,
    invalid_hint: &str,
) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env_string(var_name) {
        Some(raw) => match raw.parse::<T>() {
            Ok(value) => {
                if validator(&value) {
                    value
                } else {
                    eprintln!(
                        "⚠️ {} contains invalid value '{}': {}. Using {}.",
                        var_name, raw, invalid_hint, default
                    );
                    default
                }
            }
            Err(err) => {
                eprintln!(
                    "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                    var_name, raw, err, default
                );
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("1", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("true", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("Yes", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool(" on ", "TEST_VAR"), Some(true));

        assert_eq!(parse_bool("0", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("FALSE", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("no", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool(" off ", "TEST_VAR"), Some(false));
    }

    #[test]
    fn parse_bool_rejects_everything_else() {
        assert_eq!(parse_bool("maybe", "TEST_VAR"), None);
        assert_eq!(parse_bool("2", "TEST_VAR"), None);
        assert_eq!(parse_bool("", "TEST_VAR"), None);
    }

    #[test]
    fn load_parsed_falls_back_on_missing_variable() {
        let value: u64 = load_parsed(
            "PACKWISE_TEST_UNSET_VARIABLE",
            42,
            |v: &u64| *v > 0,
            "must be greater than 0",
        );
        assert_eq!(value, 42);
    }

    #[test]
    fn engine_defaults_match_the_packer_defaults() {
        let engine = EngineConfig {
            packer: PackerConfig::default(),
            decimal_factor: DEFAULT_DECIMAL_FACTOR,
        };
        assert_eq!(
            engine.packer_config().time_budget.as_millis() as u64,
            PackerConfig::DEFAULT_TIME_BUDGET_MS
        );
        assert_eq!(engine.decimal_factor(), 0);
    }
}

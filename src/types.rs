//! Shared types for integer 3D geometry.
//!
//! The engine works on integer lengths exclusively: every dimension and
//! position is an `i64` in a fixed unit, so equality, ordering and
//! "at the same height" comparisons are exact. Real-valued inputs are
//! converted once at the system boundary (see [`to_units`]).
//!
//! The y axis points up; an item's footprint is its projection onto the
//! xz plane.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Fraction of a lower item's footprint an upper item must cover to be
/// counted by the layer, weight and stacking-height rules.
pub const COUNTING_OVERLAP_RATIO: f64 = 0.5;

/// Fraction of a lower item's footprint that already blocks placement when
/// the lower item forbids stacking. Lower than [`COUNTING_OVERLAP_RATIO`]:
/// stacking prohibitions trigger on marginal contact.
pub const BLOCKING_OVERLAP_RATIO: f64 = 0.1;

/// Default decimal factor for boundary scaling: `10^0 = 1`, i.e. inputs are
/// already integer units.
pub const DEFAULT_DECIMAL_FACTOR: i32 = 0;

/// Converts a real-valued length to integer engine units.
///
/// # Parameters
/// * `value` - Length as supplied by the caller
/// * `decimal_factor` - Decimal shift; the result is `round(value × 10^decimal_factor)`
#[inline]
pub fn to_units(value: f64, decimal_factor: i32) -> i64 {
    (value * 10f64.powi(decimal_factor)).round() as i64
}

/// Converts integer engine units back to a real value for output.
///
/// Inverse of [`to_units`] up to rounding.
#[inline]
pub fn from_units(units: i64, decimal_factor: i32) -> f64 {
    units as f64 / 10f64.powi(decimal_factor)
}

/// An integer point or axis-aligned extent in container space.
///
/// Used both for positions (minimum corner of an item) and for projected
/// extents along the container's x, y and z axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Vec3 {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl Vec3 {
    /// Creates a new point.
    #[inline]
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// The origin (0, 0, 0).
    #[inline]
    pub const fn zero() -> Self {
        Self::new(0, 0, 0)
    }

    /// Manhattan distance to the origin, `x + y + z`.
    ///
    /// Candidate positions are ranked by this value to bias the search
    /// toward compact packing near the origin corner.
    #[inline]
    pub const fn manhattan(&self) -> i64 {
        self.x + self.y + self.z
    }

    /// Converts to tuple format for events and logs.
    #[inline]
    pub const fn as_tuple(&self) -> (i64, i64, i64) {
        (self.x, self.y, self.z)
    }
}

/// Native extents of a box: width, height and depth before any rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: i64,
    pub height: i64,
    pub depth: i64,
}

impl Dimensions {
    /// Creates a new dimension triple.
    #[inline]
    pub const fn new(width: i64, height: i64, depth: i64) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Volume as the product of all three extents.
    #[inline]
    pub const fn volume(&self) -> i64 {
        self.width * self.height * self.depth
    }
}

/// One of the six axis permutations an item may be placed in.
///
/// The three letters name which native extent (w, h, d) aligns with the
/// container's x, y and z axes, in that order. The declaration order is the
/// tie-break order for rotation scoring and is part of the public surface.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    Whd,
    Hwd,
    Hdw,
    Dhw,
    Dwh,
    Wdh,
}

impl Rotation {
    /// All six rotations in tie-break order.
    pub const ALL: [Rotation; 6] = [
        Rotation::Whd,
        Rotation::Hwd,
        Rotation::Hdw,
        Rotation::Dhw,
        Rotation::Dwh,
        Rotation::Wdh,
    ];

    /// Projects native extents onto the container axes under this rotation.
    ///
    /// # Returns
    /// The item's extents along the container's x, y and z axes.
    #[inline]
    pub const fn project(self, dims: Dimensions) -> Vec3 {
        let Dimensions {
            width: w,
            height: h,
            depth: d,
        } = dims;
        match self {
            Rotation::Whd => Vec3::new(w, h, d),
            Rotation::Hwd => Vec3::new(h, w, d),
            Rotation::Hdw => Vec3::new(h, d, w),
            Rotation::Dhw => Vec3::new(d, h, w),
            Rotation::Dwh => Vec3::new(d, w, h),
            Rotation::Wdh => Vec3::new(w, d, h),
        }
    }

    /// Human-readable permutation label for logs and API output.
    pub const fn label(self) -> &'static str {
        match self {
            Rotation::Whd => "(w, h, d)",
            Rotation::Hwd => "(h, w, d)",
            Rotation::Hdw => "(h, d, w)",
            Rotation::Dhw => "(d, h, w)",
            Rotation::Dwh => "(d, w, h)",
            Rotation::Wdh => "(w, d, h)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_permutes_native_extents() {
        let dims = Dimensions::new(1, 2, 3);

        assert_eq!(Rotation::Whd.project(dims), Vec3::new(1, 2, 3));
        assert_eq!(Rotation::Hwd.project(dims), Vec3::new(2, 1, 3));
        assert_eq!(Rotation::Hdw.project(dims), Vec3::new(2, 3, 1));
        assert_eq!(Rotation::Dhw.project(dims), Vec3::new(3, 2, 1));
        assert_eq!(Rotation::Dwh.project(dims), Vec3::new(3, 1, 2));
        assert_eq!(Rotation::Wdh.project(dims), Vec3::new(1, 3, 2));
    }

    #[test]
    fn projection_preserves_volume() {
        let dims = Dimensions::new(4, 5, 6);
        for rotation in Rotation::ALL {
            let p = rotation.project(dims);
            assert_eq!(p.x * p.y * p.z, dims.volume());
        }
    }

    #[test]
    fn rotation_tags_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Rotation::Whd).unwrap(), "\"whd\"");
        assert_eq!(serde_json::to_string(&Rotation::Dwh).unwrap(), "\"dwh\"");

        let parsed: Rotation = serde_json::from_str("\"hdw\"").unwrap();
        assert_eq!(parsed, Rotation::Hdw);
    }

    #[test]
    fn rotation_labels_spell_out_the_permutation() {
        assert_eq!(Rotation::Whd.label(), "(w, h, d)");
        assert_eq!(Rotation::Hdw.label(), "(h, d, w)");
        assert_eq!(Rotation::Wdh.label(), "(w, d, h)");
    }

    #[test]
    fn unit_scaling_rounds_to_nearest() {
        assert_eq!(to_units(12.0, 0), 12);
        assert_eq!(to_units(12.34, 1), 123);
        assert_eq!(to_units(2.5, 0), 3);
        assert_eq!(to_units(0.04, 1), 0);

        assert!((from_units(123, 1) - 12.3).abs() < 1e-9);
        assert!((from_units(12, 0) - 12.0).abs() < 1e-9);
    }

    #[test]
    fn manhattan_ranks_origin_first() {
        assert_eq!(Vec3::zero().manhattan(), 0);
        assert!(Vec3::new(0, 1, 0).manhattan() < Vec3::new(5, 0, 0).manhattan());
    }
}

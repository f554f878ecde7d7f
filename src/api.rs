//! REST API for the packing service.
//!
//! Provides the HTTP surface over the packing engine. Real-valued lengths
//! cross into integer engine units exactly here, via the configured
//! decimal factor, and are converted back on the way out. Uses Axum as the
//! web framework and supports CORS.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use utoipa::{OpenApi, ToSchema};

use crate::config::{ApiConfig, EngineConfig};
use crate::model::{Container, HeightKind, Item, StackingRules, ValidationError};
use crate::packer::Packer;
use crate::types::{Rotation, from_units, to_units};

#[derive(Clone)]
struct ApiState {
    engine: EngineConfig,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>packwise API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// One container offered for packing.
#[derive(Deserialize, Clone, ToSchema)]
pub struct ContainerSpec {
    pub id: usize,
    pub label: Option<String>,
    pub description: Option<String>,
    /// Display image reference, passed through untouched.
    pub image: Option<String>,
    #[schema(example = json!([120.0, 100.0, 80.0]))]
    pub dims: [f64; 3],
    /// Weight capacity in kg; 0 or omitted means unlimited.
    #[serde(default)]
    pub max_weight: f64,
}

impl ContainerSpec {
    fn into_container(self, decimal_factor: i32) -> Result<Container, ValidationError> {
        let dims = (
            to_units(self.dims[0], decimal_factor),
            to_units(self.dims[1], decimal_factor),
            to_units(self.dims[2], decimal_factor),
        );
        let mut container = Container::new(self.id, dims, self.max_weight)?;
        if let Some(label) = self.label {
            container = container.with_label(label);
        }
        container.description = self.description;
        container.image = self.image;
        Ok(container)
    }
}

/// One item to pack.
#[derive(Deserialize, Clone, ToSchema)]
pub struct ItemSpec {
    pub id: usize,
    /// Native (width, height, depth).
    #[schema(example = json!([30.0, 40.0, 20.0]))]
    pub dims: [f64; 3],
    #[serde(default)]
    pub weight: f64,
    pub color: Option<String>,
    /// Permitted axis permutations; omitted or empty allows all six.
    #[serde(default)]
    pub allowed_rotations: Vec<Rotation>,
    /// Cap on distinct layers stacked above; 0 disables.
    #[serde(default)]
    pub max_layers_above: u32,
    /// Cap on summed weight stacked above in kg; 0 disables.
    #[serde(default)]
    pub max_weight_above: f64,
    /// Cap on the vertical span above the item's top; 0 disables.
    #[serde(default)]
    pub stacking_height: f64,
    /// Declared height limit; its presence forbids stacking onto the item.
    pub height_limit: Option<f64>,
    /// "maximum" (default) or "exact" evaluation of the layer and
    /// stacking-height caps.
    pub height_kind: Option<HeightKind>,
    #[serde(default)]
    pub bottom_load_only: bool,
    #[serde(default)]
    pub disable_stacking: bool,
}

impl ItemSpec {
    fn into_item(self, decimal_factor: i32) -> Result<Item, ValidationError> {
        let dims = (
            to_units(self.dims[0], decimal_factor),
            to_units(self.dims[1], decimal_factor),
            to_units(self.dims[2], decimal_factor),
        );
        let mut item = Item::new(self.id, dims, self.weight)?;
        if let Some(color) = self.color {
            item = item.with_color(color);
        }
        item = item.with_allowed_rotations(self.allowed_rotations);
        item = item.with_rules(StackingRules {
            max_layers_above: self.max_layers_above,
            max_weight_above: self.max_weight_above,
            stacking_height: to_units(self.stacking_height, decimal_factor),
            height_limit: self.height_limit.map(|v| to_units(v, decimal_factor)),
            height_kind: self.height_kind.unwrap_or(HeightKind::Maximum),
            bottom_load_only: self.bottom_load_only,
            disable_stacking: self.disable_stacking,
        });
        Ok(item)
    }
}

/// Request structure for the packing endpoints.
#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "containers": [
            { "id": 1, "label": "Standard crate", "dims": [120.0, 100.0, 80.0], "max_weight": 500.0 }
        ],
        "items": [
            { "id": 1, "dims": [30.0, 40.0, 20.0], "weight": 5.0 },
            { "id": 2, "dims": [30.0, 40.0, 20.0], "weight": 8.0, "disable_stacking": true }
        ]
    })
)]
pub struct PackRequest {
    pub containers: Vec<ContainerSpec>,
    pub items: Vec<ItemSpec>,
}

#[derive(Debug)]
enum PackRequestValidationError {
    MissingContainers,
    InvalidContainer(ValidationError),
    InvalidItem(ValidationError),
}

impl PackRequest {
    /// Converts the payload into engine inputs, scaling lengths into
    /// integer units.
    fn into_engine_inputs(
        self,
        decimal_factor: i32,
    ) -> Result<(Vec<Container>, Vec<Item>), PackRequestValidationError> {
        if self.containers.is_empty() {
            return Err(PackRequestValidationError::MissingContainers);
        }

        let containers = self
            .containers
            .into_iter()
            .map(|spec| spec.into_container(decimal_factor))
            .collect::<Result<Vec<_>, ValidationError>>()
            .map_err(PackRequestValidationError::InvalidContainer)?;

        let items = self
            .items
            .into_iter()
            .map(|spec| spec.into_item(decimal_factor))
            .collect::<Result<Vec<_>, ValidationError>>()
            .map_err(PackRequestValidationError::InvalidItem)?;

        Ok((containers, items))
    }
}

/// Response structure with every container and the unfit items.
#[derive(Serialize, ToSchema)]
pub struct PackResponse {
    pub containers: Vec<PackedContainer>,
    pub unfit: Vec<UnfitItem>,
    pub is_complete: bool,
}

/// Single container with its placed items.
#[derive(Serialize, ToSchema)]
pub struct PackedContainer {
    pub id: usize,
    pub label: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    #[schema(example = json!([120.0, 100.0, 80.0]))]
    pub dims: [f64; 3],
    pub max_weight: f64,
    pub total_weight: f64,
    pub items: Vec<PlacedItem>,
}

/// Single placed item in the response.
#[derive(Serialize, ToSchema)]
pub struct PlacedItem {
    pub id: usize,
    /// Minimum corner within the container; y is up.
    #[schema(example = json!([0.0, 0.0, 0.0]))]
    pub position: [f64; 3],
    /// Axis permutation the item was placed in.
    pub rotation: Rotation,
    /// Human-readable form of the permutation, e.g. `"(h, w, d)"`.
    pub rotation_label: String,
    /// Extents along the container axes under that rotation.
    #[schema(example = json!([40.0, 30.0, 20.0]))]
    pub rotated_dims: [f64; 3],
    pub weight: f64,
    pub color: String,
}

/// Single item that could not be placed.
#[derive(Serialize, ToSchema)]
pub struct UnfitItem {
    pub id: usize,
    pub reason_code: String,
    pub reason: String,
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn parse_pack_request(
    payload: Result<Json<PackRequest>, JsonRejection>,
    decimal_factor: i32,
) -> Result<(Vec<Container>, Vec<Item>), Response> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(err) => {
            return Err(error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Invalid JSON data",
                err.to_string(),
            ));
        }
    };

    payload
        .into_engine_inputs(decimal_factor)
        .map_err(|err| match err {
            PackRequestValidationError::MissingContainers => error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Invalid input data",
                "At least one container must be specified",
            ),
            PackRequestValidationError::InvalidContainer(err) => error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Invalid container configuration",
                err.to_string(),
            ),
            PackRequestValidationError::InvalidItem(err) => error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Invalid input data",
                err.to_string(),
            ),
        })
}

/// Converts a finished packer run back into boundary units.
fn pack_response(packer: &Packer, decimal_factor: i32) -> PackResponse {
    let scale3 = |x: i64, y: i64, z: i64| {
        [
            from_units(x, decimal_factor),
            from_units(y, decimal_factor),
            from_units(z, decimal_factor),
        ]
    };

    let containers = packer
        .containers()
        .iter()
        .map(|container| PackedContainer {
            id: container.id,
            label: container.label.clone(),
            description: container.description.clone(),
            image: container.image.clone(),
            dims: scale3(
                container.dims.width,
                container.dims.height,
                container.dims.depth,
            ),
            max_weight: container.max_weight,
            total_weight: container.total_weight(packer.items()),
            items: packer
                .placed_items(container)
                .map(|item| {
                    let p = item.position;
                    let d = item.projected_dims();
                    PlacedItem {
                        id: item.id,
                        position: scale3(p.x, p.y, p.z),
                        rotation: item.rotation,
                        rotation_label: item.rotation.label().to_string(),
                        rotated_dims: scale3(d.x, d.y, d.z),
                        weight: item.weight,
                        color: item.color.clone(),
                    }
                })
                .collect(),
        })
        .collect();

    let unfit: Vec<UnfitItem> = packer
        .unfit_entries()
        .iter()
        .map(|entry| {
            let item = &packer.items()[entry.item];
            UnfitItem {
                id: item.id,
                reason_code: entry.reason.code().to_string(),
                reason: entry.reason.to_string(),
            }
        })
        .collect();

    let is_complete = unfit.is_empty();
    PackResponse {
        containers,
        unfit,
        is_complete,
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_pack, handle_pack_stream),
    components(
        schemas(
            PackRequest,
            ContainerSpec,
            ItemSpec,
            PackResponse,
            PackedContainer,
            PlacedItem,
            UnfitItem,
            ErrorResponse,
            Rotation,
            HeightKind
        )
    ),
    tags((name = "packing", description = "Endpoints for bin packing"))
)]
struct ApiDoc;

/// Starts the API server.
///
/// Configures CORS for cross-origin requests. Blocks until the server is
/// terminated.
pub async fn start_api_server(config: ApiConfig, engine: EngineConfig) {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let state = ApiState { engine };

    let app = Router::new()
        // API endpoints
        .route("/pack", post(handle_pack))
        .route("/pack_stream", post(handle_pack_stream))
        // API documentation
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state);

    let addr = config.socket_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            panic!("❌ Could not bind API server to {}: {}", addr, err);
        }
    };

    println!(
        "🚀 Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() {
        println!("💡 Local access: http://localhost:{}", config.port());
    }
    println!("📦 API Endpoints:");
    println!("   - POST /pack");
    println!("   - POST /pack_stream");
    println!("📑 Documentation:");
    println!("   - GET /docs");
    println!("   - GET /docs/openapi.json");

    if let Err(err) = axum::serve(listener, app).await {
        eprintln!("❌ API server terminated with an error: {err}");
    }
}

/// Handler for the POST /pack endpoint.
///
/// Packs the supplied items into the supplied containers and returns every
/// placement plus the unfit items.
#[utoipa::path(
    post,
    path = "/pack",
    request_body = PackRequest,
    responses(
        (status = 200, description = "Packing finished", body = PackResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or container configuration",
            body = ErrorResponse
        )
    ),
    tag = "packing"
)]
async fn handle_pack(
    State(state): State<ApiState>,
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> impl IntoResponse {
    let decimal_factor = state.engine.decimal_factor();
    let (containers, items) = match parse_pack_request(payload, decimal_factor) {
        Ok(inputs) => inputs,
        Err(response) => return response,
    };

    println!(
        "📥 New pack request: {} items, {} containers",
        items.len(),
        containers.len()
    );

    let mut packer = Packer::with_config(state.engine.packer_config());
    for container in containers {
        packer.add_container(container);
    }
    for item in items {
        packer.add_item(item);
    }
    packer.pack();

    let response = pack_response(&packer, decimal_factor);
    println!(
        "📦 Result: {} placed, {} unfit",
        response
            .containers
            .iter()
            .map(|c| c.items.len())
            .sum::<usize>(),
        response.unfit.len()
    );

    (StatusCode::OK, Json(response)).into_response()
}

/// Handler for the POST /pack_stream endpoint (SSE).
///
/// Streams pack events in real time as Server-Sent Events
/// (text/event-stream). Event positions are in integer engine units.
#[utoipa::path(
    post,
    path = "/pack_stream",
    request_body = PackRequest,
    responses(
        (
            status = 200,
            description = "Streams pack events in real time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or container configuration",
            body = ErrorResponse
        )
    ),
    tag = "packing"
)]
async fn handle_pack_stream(
    State(state): State<ApiState>,
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> impl IntoResponse {
    let decimal_factor = state.engine.decimal_factor();
    let (containers, items) = match parse_pack_request(payload, decimal_factor) {
        Ok(inputs) => inputs,
        Err(response) => return response,
    };

    let (tx, rx) = mpsc::channel::<String>(32);
    let packer_config = state.engine.packer_config();

    tokio::task::spawn_blocking(move || {
        let mut packer = Packer::with_config(packer_config);
        for container in containers {
            packer.add_container(container);
        }
        for item in items {
            packer.add_item(item);
        }
        packer.pack_with_progress(|event| {
            if let Ok(json) = serde_json::to_string(event) {
                // A closed receiver just means the client went away;
                // remaining events are discarded.
                let _ = tx.blocking_send(json);
            }
        });
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{CimscopeError, Result};
use crate::session::{ClickTracker, ExplorationSession, InFlight};
use crate::web::types::*;

/// Session plus the per-client click state, guarded together.
pub struct ViewerState {
    session: ExplorationSession,
    clicks: ClickTracker,
    truncated: bool,
}

impl ViewerState {
    pub fn new(session: ExplorationSession, click_window: Duration) -> Self {
        Self {
            session,
            clicks: ClickTracker::new(click_window),
            truncated: false,
        }
    }

    pub fn session(&self) -> &ExplorationSession {
        &self.session
    }

    fn view(&self, relayout: bool) -> ElementsResponse {
        ElementsResponse {
            elements: self.session.elements().to_vec(),
            types: self.session.types(),
            hidden: self.session.hidden_types().clone(),
            seed: self.session.current_seed().map(|id| id.to_string()),
            truncated: self.truncated,
            relayout,
        }
    }
}

/// HTTP surface for the graph viewer
pub struct HttpServer {
    viewer: Arc<Mutex<ViewerState>>,
    in_flight: InFlight,
    allowed_origins: Vec<String>,
}

impl HttpServer {
    pub fn new(viewer: ViewerState, allowed_origins: Vec<String>) -> Self {
        Self {
            viewer: Arc::new(Mutex::new(viewer)),
            in_flight: InFlight::new(),
            allowed_origins,
        }
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Run the HTTP server
    pub async fn run(&self, port: u16) -> Result<()> {
        let app = self.create_router();

        let addr = format!("127.0.0.1:{}", port);
        log::info!("Starting graph viewer on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            CimscopeError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to bind to {}: {}. Set http_server.port in config.toml to use another port",
                    addr, e
                ),
            ))
        })?;

        axum::serve(listener, app)
            .await
            .map_err(|e| CimscopeError::Io(std::io::Error::other(format!("HTTP server error: {}", e))))?;

        Ok(())
    }

    pub fn create_router(&self) -> Router {
        let cors = if self.allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .route("/health", get(handle_health))
            .route("/elements", get(handle_elements))
            .route("/nodes/:id", get(handle_node))
            .route("/click", post(handle_click))
            .route("/goto", post(handle_goto))
            .route("/filter", post(handle_filter))
            .route("/reset", post(handle_reset))
            .route("/positions", post(handle_positions))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors),
            )
            .with_state(AppState {
                viewer: Arc::clone(&self.viewer),
                in_flight: self.in_flight.clone(),
            })
    }
}

#[derive(Clone)]
struct AppState {
    viewer: Arc<Mutex<ViewerState>>,
    in_flight: InFlight,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

fn status_for(err: &CimscopeError) -> StatusCode {
    match err {
        CimscopeError::UnresolvableSeed(_) | CimscopeError::UnknownPrefix(_) => StatusCode::NOT_FOUND,
        CimscopeError::MalformedIdentifier(_) | CimscopeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(err: CimscopeError) -> Response {
    error_response(status_for(&err), err.to_string())
}

/// Traversals are synchronous and may be long; keep them off the runtime.
async fn with_viewer<F>(state: &AppState, f: F) -> Response
where
    F: FnOnce(&mut ViewerState) -> Response + Send + 'static,
{
    let viewer = Arc::clone(&state.viewer);
    let joined = tokio::task::spawn_blocking(move || {
        let mut guard = viewer.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    })
    .await;

    match joined {
        Ok(response) => response,
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Task failed: {}", e)),
    }
}

fn busy() -> Response {
    log::debug!("Rejected request: another exploration is in flight");
    error_response(StatusCode::CONFLICT, "another exploration request is in progress")
}

async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "cimscope",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

async fn handle_elements(State(state): State<AppState>) -> Response {
    with_viewer(&state, |viewer| Json(viewer.view(false)).into_response()).await
}

async fn handle_node(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    with_viewer(&state, move |viewer| match viewer.session.node_details(&id) {
        Ok(node) => Json(node).into_response(),
        Err(e) => failure(e),
    })
    .await
}

async fn handle_click(State(state): State<AppState>, Json(request): Json<NodeRequest>) -> Response {
    let Some(_guard) = state.in_flight.try_acquire() else {
        return busy();
    };

    with_viewer(&state, move |viewer| {
        if !viewer.clicks.register(&request.id, Instant::now()) {
            log::debug!("Click on {} debounced", request.id);
            return Json(ClickResponse::Skipped { skipped: true }).into_response();
        }
        match viewer.session.expand_node(&request.id) {
            Ok(delta) => {
                viewer.truncated |= delta.truncated;
                let relayout = !delta.is_empty();
                Json(ClickResponse::Expanded {
                    added: delta.elements,
                    view: viewer.view(relayout),
                })
                .into_response()
            }
            Err(e) => failure(e),
        }
    })
    .await
}

async fn handle_goto(State(state): State<AppState>, Json(request): Json<NodeRequest>) -> Response {
    let Some(_guard) = state.in_flight.try_acquire() else {
        return busy();
    };

    with_viewer(&state, move |viewer| match viewer.session.go_to(&request.id) {
        Ok(delta) => {
            viewer.truncated = delta.truncated;
            viewer.clicks.reset();
            Json(viewer.view(true)).into_response()
        }
        Err(e) => {
            log::info!("Go-to {} failed: {}", request.id, e);
            failure(e)
        }
    })
    .await
}

async fn handle_reset(State(state): State<AppState>) -> Response {
    let Some(_guard) = state.in_flight.try_acquire() else {
        return busy();
    };

    with_viewer(&state, |viewer| match viewer.session.reset() {
        Ok(delta) => {
            viewer.truncated = delta.truncated;
            viewer.clicks.reset();
            Json(viewer.view(true)).into_response()
        }
        Err(e) => failure(e),
    })
    .await
}

async fn handle_filter(State(state): State<AppState>, Json(request): Json<FilterRequest>) -> Response {
    with_viewer(&state, move |viewer| {
        let change = viewer.session.set_hidden_types(request.hidden);
        Json(viewer.view(change.relayout)).into_response()
    })
    .await
}

async fn handle_positions(State(state): State<AppState>, Json(positions): Json<PositionsRequest>) -> Response {
    with_viewer(&state, move |viewer| {
        viewer.session.record_positions(&positions);
        StatusCode::NO_CONTENT.into_response()
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{CompositeId, FileRegistry};
    use crate::session::ExploreSettings;
    use crate::store::{GraphStore, MemoryStore, Triple, RDF_TYPE};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn server() -> HttpServer {
        let mut registry = FileRegistry::new();
        registry.prefix_for("EQ.xml");
        let source = MemoryStore::from(vec![
            Triple::reference("NSFILE_0:sub", RDF_TYPE, "cim:Substation"),
            Triple::literal("NSFILE_0:sub", "cim:IdentifiedObject.name", "Sub"),
            Triple::reference("NSFILE_0:vl", RDF_TYPE, "cim:VoltageLevel"),
            Triple::reference("NSFILE_0:vl", "cim:VoltageLevel.Substation", "NSFILE_0:sub"),
            Triple::reference("NSFILE_0:bay", RDF_TYPE, "cim:Bay"),
            Triple::reference("NSFILE_0:bay", "cim:Bay.VoltageLevel", "NSFILE_0:vl"),
        ]);
        let store = Arc::new(GraphStore::new(registry, source));
        let settings = ExploreSettings {
            max_depth: 2,
            ..ExploreSettings::default()
        };
        let mut session = ExplorationSession::new(store, settings);
        session.seed(&CompositeId::new("0", "sub")).unwrap();
        HttpServer::new(ViewerState::new(session, Duration::from_secs(60)), vec![])
    }

    async fn call(router: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(v) => Body::from(v.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn node_ids(json: &Value) -> Vec<String> {
        json["elements"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|e| e["data"]["id"].as_str().map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, json) = call(server().create_router(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_elements_after_seed() {
        let (status, json) = call(server().create_router(), "GET", "/elements", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(node_ids(&json), vec!["sub", "vl"]);
        assert_eq!(json["seed"], "NSFILE_0:sub");
        assert_eq!(json["truncated"], false);
    }

    #[tokio::test]
    async fn test_click_expands_then_debounces() {
        let server = server();
        let (status, json) = call(
            server.create_router(),
            "POST",
            "/click",
            Some(serde_json::json!({"id": "vl"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["added"].as_array().unwrap().len(), 2);
        assert_eq!(node_ids(&json), vec!["bay", "sub", "vl"]);

        let (status, json) = call(
            server.create_router(),
            "POST",
            "/click",
            Some(serde_json::json!({"id": "vl"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({"skipped": true}));
    }

    #[tokio::test]
    async fn test_click_rejected_while_busy() {
        let server = server();
        let _guard = server.in_flight().try_acquire().unwrap();
        let (status, _) = call(
            server.create_router(),
            "POST",
            "/click",
            Some(serde_json::json!({"id": "vl"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_goto_unknown_keeps_graph() {
        let server = server();
        let (status, json) = call(
            server.create_router(),
            "POST",
            "/goto",
            Some(serde_json::json!({"id": "nowhere"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("nowhere"));

        let (_, json) = call(server.create_router(), "GET", "/elements", None).await;
        assert_eq!(node_ids(&json), vec!["sub", "vl"]);
    }

    #[tokio::test]
    async fn test_goto_then_reset() {
        let server = server();
        let (status, json) = call(
            server.create_router(),
            "POST",
            "/goto",
            Some(serde_json::json!({"id": "NSFILE_0:bay"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["seed"], "NSFILE_0:bay");

        let (status, json) = call(server.create_router(), "POST", "/reset", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["seed"], "NSFILE_0:sub");
    }

    #[tokio::test]
    async fn test_filter_hides_type() {
        let (status, json) = call(
            server().create_router(),
            "POST",
            "/filter",
            Some(serde_json::json!({"hidden": ["VoltageLevel"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(node_ids(&json), vec!["sub"]);
        assert_eq!(json["relayout"], true);
        assert!(json["types"].as_array().unwrap().contains(&Value::from("VoltageLevel")));
    }

    #[tokio::test]
    async fn test_node_details() {
        let server = server();
        let (status, json) = call(server.create_router(), "GET", "/nodes/sub", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["type"], "Substation");
        assert_eq!(json["name"], "Sub");

        let (status, _) = call(server.create_router(), "GET", "/nodes/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_positions_recorded() {
        let server = server();
        let (status, _) = call(
            server.create_router(),
            "POST",
            "/positions",
            Some(serde_json::json!({"sub": {"x": 1.5, "y": 2.5}})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, json) = call(server.create_router(), "GET", "/elements", None).await;
        let sub = json["elements"]
            .as_array()
            .unwrap()
            .iter()
            .find(|e| e["data"]["id"] == "sub")
            .unwrap()
            .clone();
        assert_eq!(sub["position"]["x"], 1.5);
    }
}

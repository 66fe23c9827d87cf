//
// web.rs
// Dicom-Viewer-rs
//
// Axum-based HTTP server driving one shared viewer session: loading, viewport operations, input events, frames, and snapshots.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::{
    annotation::AnnotationKind,
    config::ViewerConfig,
    decoder::DicomDecoder,
    error::{DecodeError, ViewerError},
    interaction::{InputEvent, Outcome},
    models::ViewerState,
    render::{encode_png, Point, SurfaceBounds, MAX_SURFACE_DIM},
    session::{Attachment, FrameTicket, LoadTicket, ViewerSession},
    storage::ResourceStore,
    viewport::WindowAdjust,
};

#[derive(Clone)]
struct AppState {
    session: Arc<Mutex<ViewerSession>>,
    // Listeners stay attached for as long as the server holds the state.
    _attachment: Arc<Attachment>,
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

/// Bootstraps the Axum HTTP server and wires up API routes.
pub async fn start_server(host: &str, port: u16, config: ViewerConfig) -> anyhow::Result<()> {
    let app = router(config);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Server running at http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Routes over a fresh session backed by the dicom-rs decoder.
pub fn router(config: ViewerConfig) -> Router {
    Router::new()
        .route("/api/state", get(state_handler))
        .route("/api/upload", post(upload_handler))
        .route("/api/load-url", post(load_url_handler))
        .route("/api/viewport", post(viewport_handler))
        .route("/api/bounds", post(bounds_handler))
        .route("/api/events", post(event_handler))
        .route("/api/draw-mode", post(draw_mode_handler))
        .route("/api/annotations/clear", post(clear_annotations_handler))
        .route("/api/frame/:index", post(frame_handler))
        .route("/api/hit-test", get(hit_test_handler))
        .route("/api/render.png", get(render_handler))
        .route("/api/snapshot", get(snapshot_handler))
        .with_state(app_state(config))
        .layer(CorsLayer::permissive())
}

fn app_state(config: ViewerConfig) -> AppState {
    let decoder = Arc::new(DicomDecoder::new(ResourceStore::new()));
    let mut session = ViewerSession::new(config, decoder);
    let attachment = session.attach();
    AppState {
        session: Arc::new(Mutex::new(session)),
        _attachment: Arc::new(attachment),
    }
}

async fn state_handler(State(state): State<AppState>) -> Json<ViewerState> {
    Json(state.session.lock().await.state())
}

async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ViewerState>> {
    let mut original_name = None;
    let mut data = None;

    // Find the first part named "file" and pull bytes eagerly.
    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        if field.name() == Some("file") {
            original_name = field.file_name().map(|s| s.to_string());
            data = Some(field.bytes().await.map_err(internal_error)?);
            break;
        }
    }

    let data = data.ok_or((StatusCode::BAD_REQUEST, "No file uploaded".to_string()))?;
    let ticket = state
        .session
        .lock()
        .await
        .begin_drop(original_name.as_deref(), data.to_vec());
    Ok(Json(run_load(&state, ticket).await))
}

#[derive(Debug, Deserialize)]
struct LoadUrlRequest {
    url: String,
}

async fn load_url_handler(
    State(state): State<AppState>,
    Json(request): Json<LoadUrlRequest>,
) -> ApiResult<Json<ViewerState>> {
    if request.url.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "url must not be empty".into()));
    }
    let ticket = state.session.lock().await.begin_load_url(&request.url);
    Ok(Json(run_load(&state, ticket).await))
}

/// Decodes without holding the session lock, so input keeps flowing against the current image.
async fn run_load(state: &AppState, ticket: Option<LoadTicket>) -> ViewerState {
    let Some(ticket) = ticket else {
        return state.session.lock().await.state();
    };
    let decoder = state.session.lock().await.decoder();
    let result = match decoder {
        Some(decoder) => decoder.decode(&ticket.image_id).await,
        None => Err(DecodeError::UnknownResource(ticket.image_id.clone())),
    };
    let mut session = state.session.lock().await;
    session.finish_load(ticket, result);
    session.state()
}

async fn run_frame(state: &AppState, ticket: Option<FrameTicket>) -> ViewerState {
    let Some(ticket) = ticket else {
        return state.session.lock().await.state();
    };
    let decoder = state.session.lock().await.decoder();
    let result = match decoder {
        Some(decoder) => decoder.decode(&ticket.request.image_id).await,
        None => Err(DecodeError::UnknownResource(ticket.request.image_id.clone())),
    };
    let mut session = state.session.lock().await;
    session.finish_frame(ticket, result);
    session.state()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ViewportCommand {
    Zoom { factor: f64 },
    ZoomIn,
    ZoomOut,
    Pan { dx: f64, dy: f64 },
    Window { kind: WindowAdjust, delta: f64 },
    WindowStep { kind: WindowAdjust, increase: bool },
    Invert,
    Reset,
}

async fn viewport_handler(
    State(state): State<AppState>,
    Json(command): Json<ViewportCommand>,
) -> Json<ViewerState> {
    let mut session = state.session.lock().await;
    let step = session.config().window_step;
    // Commands on an empty viewer are no-ops; the returned state shows nothing changed.
    match command {
        ViewportCommand::Zoom { factor } => session.zoom(factor),
        ViewportCommand::ZoomIn => session.zoom_in(),
        ViewportCommand::ZoomOut => session.zoom_out(),
        ViewportCommand::Pan { dx, dy } => session.pan(dx, dy),
        ViewportCommand::Window { kind, delta } => session.adjust_window(kind, delta),
        ViewportCommand::WindowStep { kind, increase } => {
            session.adjust_window(kind, if increase { step } else { -step })
        }
        ViewportCommand::Invert => session.toggle_invert(),
        ViewportCommand::Reset => session.reset_view(),
    };
    Json(session.state())
}

async fn bounds_handler(
    State(state): State<AppState>,
    Json(bounds): Json<SurfaceBounds>,
) -> ApiResult<Json<ViewerState>> {
    if !bounds.is_valid() || !bounds.left.is_finite() || !bounds.top.is_finite() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "surface must be 1..={} pixels on each side at a finite position",
                MAX_SURFACE_DIM
            ),
        ));
    }
    let mut session = state.session.lock().await;
    session.set_bounds(bounds);
    Ok(Json(session.state()))
}

async fn event_handler(
    State(state): State<AppState>,
    Json(event): Json<InputEvent>,
) -> Json<ViewerState> {
    let ticket = {
        let mut session = state.session.lock().await;
        match session.handle_event(&event) {
            Outcome::Navigate(step) => session.begin_step(step),
            _ => None,
        }
    };
    Json(run_frame(&state, ticket).await)
}

#[derive(Debug, Deserialize)]
struct DrawModeRequest {
    mode: Option<AnnotationKind>,
    #[serde(default)]
    toggle: bool,
}

async fn draw_mode_handler(
    State(state): State<AppState>,
    Json(request): Json<DrawModeRequest>,
) -> Json<ViewerState> {
    let mut session = state.session.lock().await;
    match (request.mode, request.toggle) {
        (Some(kind), true) => session.toggle_draw_mode(kind),
        (mode, _) => session.set_draw_mode(mode),
    };
    Json(session.state())
}

async fn clear_annotations_handler(State(state): State<AppState>) -> Json<ViewerState> {
    let mut session = state.session.lock().await;
    session.clear_annotations();
    Json(session.state())
}

async fn frame_handler(
    State(state): State<AppState>,
    Path(index): Path<i64>,
) -> Json<ViewerState> {
    let ticket = state.session.lock().await.begin_go_to(index);
    Json(run_frame(&state, ticket).await)
}

#[derive(Debug, Deserialize)]
struct HitTestQuery {
    x: f64,
    y: f64,
}

async fn hit_test_handler(
    State(state): State<AppState>,
    Query(query): Query<HitTestQuery>,
) -> Json<Option<Point>> {
    Json(state.session.lock().await.image_coordinates(query.x, query.y))
}

async fn render_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let session = state.session.lock().await;
    let rendered = session.rendered().ok_or_else(|| no_image(ViewerError::NoImage))?;
    let bytes = encode_png(&rendered).map_err(internal_error)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}

#[derive(Debug, Default, Deserialize)]
struct SnapshotQuery {
    #[serde(default)]
    annotated: bool,
}

async fn snapshot_handler(
    State(state): State<AppState>,
    Query(query): Query<SnapshotQuery>,
) -> ApiResult<impl IntoResponse> {
    let snapshot = state
        .session
        .lock()
        .await
        .snapshot(query.annotated)
        .map_err(|err| match err {
            ViewerError::NoImage | ViewerError::NotMounted => no_image(err),
            other => internal_error(other),
        })?;
    let disposition =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", snapshot.filename))
            .map_err(internal_error)?;
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/png")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        snapshot.png,
    ))
}

fn bad_request<E: Display>(err: E) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, err.to_string())
}

fn internal_error<E: Display>(err: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

fn no_image<E: Display>(err: E) -> (StatusCode, String) {
    (StatusCode::CONFLICT, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(width: u32, height: u32) -> SurfaceBounds {
        SurfaceBounds {
            left: 0.0,
            top: 0.0,
            width,
            height,
        }
    }

    #[tokio::test]
    async fn bounds_outside_the_cap_are_rejected() {
        let state = app_state(ViewerConfig::default());

        for rejected in [bounds(u32::MAX, u32::MAX), bounds(0, 10), bounds(MAX_SURFACE_DIM + 1, 10)] {
            match bounds_handler(State(state.clone()), Json(rejected)).await {
                Err((status, _)) => assert_eq!(status, StatusCode::BAD_REQUEST),
                Ok(_) => panic!("bounds {:?} should be rejected", rejected),
            }
        }
        let unplaced = SurfaceBounds {
            left: f64::NAN,
            ..bounds(10, 10)
        };
        assert!(bounds_handler(State(state.clone()), Json(unplaced)).await.is_err());

        assert!(bounds_handler(State(state.clone()), Json(bounds(640, 480))).await.is_ok());
        assert_eq!(state.session.lock().await.surface().size(), Some((640, 480)));
    }

    #[tokio::test]
    async fn empty_viewer_has_no_hit_target() {
        let state = app_state(ViewerConfig::default());
        let Json(point) = hit_test_handler(State(state), Query(HitTestQuery { x: 5.0, y: 5.0 })).await;
        assert!(point.is_none());
    }
}

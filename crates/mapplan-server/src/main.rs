//! Map Planning Remote Authority Server
//!
//! Persists the actions executed by editor clients. Maps live in memory.
//!
//! ## Routes
//!
//! ```text
//! GET    /health
//! GET    /api/maps
//! GET    /api/maps/{map_id}
//! PUT    /api/maps/{map_id}                         body: TrackedMapState
//! POST   /api/maps/{map_id}/layers/{layer}/objects  body: [ObjectState]
//! PATCH  /api/maps/{map_id}/layers/{layer}/objects  body: [{ "type": "Move" | "Transform", "content": ... }]
//! DELETE /api/maps/{map_id}/layers/{layer}/objects  body: [ObjectId]
//! PATCH  /api/maps/{map_id}/geometry                body: MapGeometry
//! ```
//!
//! Errors are returned as `{ "message": "..." }`. Editors reach this server
//! through `mapplan_core::HttpAuthority`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use mapplan_core::{
    LayerName, MapGeometry, MapId, MemoryAuthority, ObjectId, ObjectState, ObjectUpdate,
    RemoteAuthority, RemoteError, TrackedMapState,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Default listen address.
const DEFAULT_ADDR: &str = "0.0.0.0:3030";

/// Shared application state
struct AppState {
    authority: MemoryAuthority,
}

type SharedState = Arc<AppState>;

/// Error body returned to clients
#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

/// A remote error turned into an HTTP response.
#[derive(Debug)]
struct ApiError(RemoteError);

impl From<RemoteError> for ApiError {
    fn from(error: RemoteError) -> Self {
        Self(error)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            RemoteError::NotFound(_) => StatusCode::NOT_FOUND,
            RemoteError::Conflict(_) => StatusCode::CONFLICT,
            RemoteError::Validation(_) => StatusCode::BAD_REQUEST,
            RemoteError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RemoteError::Io(_) | RemoteError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!("Request failed with {}: {}", status, self.0);
        let body = ErrorBody {
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn app(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/maps", get(list_maps))
        .route("/api/maps/{map_id}", get(get_map).put(put_map))
        .route(
            "/api/maps/{map_id}/layers/{layer}/objects",
            patch(update_objects)
                .post(create_objects)
                .delete(delete_objects),
        )
        .route("/api/maps/{map_id}/geometry", patch(update_geometry))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Parse the listen address, falling back to [`DEFAULT_ADDR`].
fn listen_addr(value: Option<String>) -> SocketAddr {
    let fallback = || DEFAULT_ADDR.parse().unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 3030)));
    match value {
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Ignoring invalid MAPPLAN_ADDR {:?}: {}", raw, e);
            fallback()
        }),
        None => fallback(),
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mapplan_server=info,tower_http=info".into()),
        )
        .init();

    let state = Arc::new(AppState {
        authority: MemoryAuthority::new(),
    });

    let addr = listen_addr(std::env::var("MAPPLAN_ADDR").ok());
    info!("Map planning authority listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

async fn list_maps(State(state): State<SharedState>) -> Json<Vec<MapId>> {
    Json(state.authority.map_ids())
}

async fn get_map(
    State(state): State<SharedState>,
    Path(map_id): Path<MapId>,
) -> Result<Json<TrackedMapState>, ApiError> {
    let map = state.authority.load_map(map_id).await?;
    Ok(Json(map))
}

/// Create or replace a whole map.
async fn put_map(
    State(state): State<SharedState>,
    Path(map_id): Path<MapId>,
    Json(map): Json<TrackedMapState>,
) -> Result<StatusCode, ApiError> {
    map.validate().map_err(RemoteError::Validation)?;
    state.authority.insert_map(map_id, map);
    info!("Stored map {}", map_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn create_objects(
    State(state): State<SharedState>,
    Path((map_id, layer)): Path<(MapId, LayerName)>,
    Json(objects): Json<Vec<ObjectState>>,
) -> Result<(StatusCode, Json<Vec<ObjectState>>), ApiError> {
    let created = state.authority.create_objects(map_id, layer, &objects).await?;
    info!("Map {}: created {} objects on {:?}", map_id, created.len(), layer);
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_objects(
    State(state): State<SharedState>,
    Path((map_id, layer)): Path<(MapId, LayerName)>,
    Json(updates): Json<Vec<ObjectUpdate>>,
) -> Result<Json<Vec<ObjectState>>, ApiError> {
    let updated = state.authority.update_objects(map_id, layer, &updates).await?;
    info!("Map {}: updated {} objects on {:?}", map_id, updated.len(), layer);
    Ok(Json(updated))
}

async fn delete_objects(
    State(state): State<SharedState>,
    Path((map_id, layer)): Path<(MapId, LayerName)>,
    Json(ids): Json<Vec<ObjectId>>,
) -> Result<Json<Vec<ObjectId>>, ApiError> {
    let removed = state.authority.delete_objects(map_id, layer, &ids).await?;
    info!("Map {}: deleted {} objects on {:?}", map_id, removed.len(), layer);
    Ok(Json(removed))
}

async fn update_geometry(
    State(state): State<SharedState>,
    Path(map_id): Path<MapId>,
    Json(geometry): Json<MapGeometry>,
) -> Result<Json<MapGeometry>, ApiError> {
    let geometry = state.authority.update_map_geometry(map_id, &geometry).await?;
    info!("Map {}: boundary updated", map_id);
    Ok(Json(geometry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Rect;
    use mapplan_core::action::{CreateObjects, MoveObjects, MoveUpdate};
    use mapplan_core::{HttpAuthority, MapStore};

    fn state_with_map(map_id: MapId) -> SharedState {
        let state = Arc::new(AppState {
            authority: MemoryAuthority::new(),
        });
        state.authority.insert_map(map_id, TrackedMapState::new());
        state
    }

    fn plant() -> ObjectState {
        ObjectState::new(LayerName::Plant, "plant", 1.0, 2.0, 10.0, 10.0)
    }

    /// Serve the router on an ephemeral port and return its base URL.
    async fn spawn_server(state: SharedState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_store_syncs_over_http() {
        let state = state_with_map(1);
        let base_url = spawn_server(state.clone()).await;
        let remote = Arc::new(HttpAuthority::new(base_url).unwrap());
        let mut store = MapStore::new(1, remote);
        store.load_from_remote().await.unwrap();

        let object = plant();
        store
            .execute_action(CreateObjects::single(object.clone()))
            .unwrap()
            .await
            .unwrap();
        store
            .execute_action(MoveObjects::new(
                LayerName::Plant,
                vec![MoveUpdate::new(object.id, 40.0, 50.0)],
            ))
            .unwrap()
            .await
            .unwrap();
        let stored = state.authority.snapshot(1).unwrap();
        let moved = stored.find_object(object.id).unwrap();
        assert_eq!((moved.x, moved.y), (40.0, 50.0));

        store.undo().unwrap().unwrap().await.unwrap();
        store.undo().unwrap().unwrap().await.unwrap();
        assert!(!state.authority.snapshot(1).unwrap().contains_object(object.id));
        assert_eq!(store.unsynced_failures(), 0);
    }

    #[tokio::test]
    async fn test_http_authority_error_mapping() {
        let state = state_with_map(1);
        let remote = HttpAuthority::new(spawn_server(state).await).unwrap();

        assert!(matches!(remote.load_map(2).await, Err(RemoteError::NotFound(_))));

        let object = plant();
        remote
            .create_objects(1, LayerName::Plant, &[object.clone()])
            .await
            .unwrap();
        let mut changed = object.clone();
        changed.x = 99.0;
        assert!(matches!(
            remote.create_objects(1, LayerName::Plant, &[changed]).await,
            Err(RemoteError::Conflict(_))
        ));

        let missing = ObjectUpdate::Move(MoveUpdate::new(ObjectId::new_v4(), 1.0, 1.0));
        assert!(matches!(
            remote.update_objects(1, LayerName::Plant, &[missing]).await,
            Err(RemoteError::NotFound(_))
        ));

        let square = MapGeometry::rectangle(Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(remote.update_map_geometry(1, &square).await.unwrap(), square);
        let mut open = square.clone();
        open.rings[0].pop();
        assert!(matches!(
            remote.update_map_geometry(1, &open).await,
            Err(RemoteError::Validation(_))
        ));

        assert_eq!(
            remote.delete_objects(1, LayerName::Plant, &[object.id]).await.unwrap(),
            vec![object.id]
        );
    }

    #[test]
    fn test_error_status_mapping() {
        let status = |e: RemoteError| ApiError(e).into_response().status();
        assert_eq!(status(RemoteError::NotFound("m".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(RemoteError::Conflict("c".into())), StatusCode::CONFLICT);
        assert_eq!(status(RemoteError::Validation("v".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(RemoteError::Unavailable("u".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_listen_addr() {
        assert_eq!(listen_addr(None), "0.0.0.0:3030".parse::<SocketAddr>().unwrap());
        assert_eq!(
            listen_addr(Some("127.0.0.1:8080".to_string())),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            listen_addr(Some("not an address".to_string())),
            "0.0.0.0:3030".parse::<SocketAddr>().unwrap()
        );
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let state = state_with_map(1);
        let object = plant();

        let (status, Json(created)) = create_objects(
            State(state.clone()),
            Path((1, LayerName::Plant)),
            Json(vec![object.clone()]),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created, vec![object.clone()]);

        let Json(map) = get_map(State(state), Path(1)).await.unwrap();
        assert!(map.contains_object(object.id));
    }

    #[tokio::test]
    async fn test_missing_map_is_404() {
        let state = state_with_map(1);
        let error = get_map(State(state), Path(2)).await.unwrap_err();
        assert_eq!(error.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_conflicting_create_is_409() {
        let state = state_with_map(1);
        let object = plant();
        create_objects(
            State(state.clone()),
            Path((1, LayerName::Plant)),
            Json(vec![object.clone()]),
        )
        .await
        .unwrap();

        let mut changed = object;
        changed.x = 50.0;
        let error = create_objects(State(state), Path((1, LayerName::Plant)), Json(vec![changed]))
            .await
            .unwrap_err();
        assert_eq!(error.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_invalid_geometry_is_400() {
        let state = state_with_map(1);
        let mut geometry = MapGeometry::rectangle(Rect::new(0.0, 0.0, 10.0, 10.0));
        geometry.rings[0].pop();

        let error = update_geometry(State(state), Path(1), Json(geometry))
            .await
            .unwrap_err();
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_put_then_delete() {
        let state = Arc::new(AppState {
            authority: MemoryAuthority::new(),
        });
        let object = plant();
        let mut map = TrackedMapState::new();
        map.layer_mut(LayerName::Plant).objects.push(object.clone());

        let status = put_map(State(state.clone()), Path(3), Json(map)).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let Json(removed) = delete_objects(
            State(state.clone()),
            Path((3, LayerName::Plant)),
            Json(vec![object.id]),
        )
        .await
        .unwrap();
        assert_eq!(removed, vec![object.id]);
        assert_eq!(list_maps(State(state)).await.0, vec![3]);
    }
}

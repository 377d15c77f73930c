//! Remote authority reached over HTTP, as served by `mapplan-server`.

use super::{BoxFuture, ObjectUpdate, RemoteAuthority, RemoteError, RemoteResult};
use crate::boundary::MapGeometry;
use crate::state::{LayerName, MapId, ObjectId, ObjectState, TrackedMapState};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Error body returned by the server.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Authority that sends one request per call to a map planning server.
pub struct HttpAuthority {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuthority {
    /// Create a client for the server at `base_url`, e.g. `http://localhost:3030`.
    pub fn new(base_url: impl Into<String>) -> RemoteResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| RemoteError::Unavailable(format!("failed to build HTTP client: {}", e)))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_url(&self, map_id: MapId) -> String {
        format!("{}/api/maps/{}", self.base_url, map_id)
    }

    fn objects_url(&self, map_id: MapId, layer: LayerName) -> RemoteResult<String> {
        Ok(format!(
            "{}/layers/{}/objects",
            self.map_url(map_id),
            layer_segment(layer)?
        ))
    }
}

/// Path segment of a layer: its serialized name.
fn layer_segment(layer: LayerName) -> RemoteResult<String> {
    match serde_json::to_value(layer) {
        Ok(serde_json::Value::String(name)) => Ok(name),
        Ok(other) => Err(RemoteError::Serialization(format!(
            "layer {:?} serialized as {}",
            layer, other
        ))),
        Err(e) => Err(RemoteError::Serialization(e.to_string())),
    }
}

/// Map a non-success response to the matching remote error.
fn error_for_status(status: u16, body: &str) -> RemoteError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.to_string());
    match status {
        404 => RemoteError::NotFound(message),
        409 => RemoteError::Conflict(message),
        400 | 422 => RemoteError::Validation(message),
        408 | 502 | 503 | 504 => RemoteError::Unavailable(message),
        _ => RemoteError::Io(format!("HTTP {}: {}", status, message)),
    }
}

async fn send<T: DeserializeOwned>(request: RequestBuilder) -> RemoteResult<T> {
    let response = request
        .send()
        .await
        .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| RemoteError::Io(e.to_string()))?;

    if !status.is_success() {
        log::warn!("Authority answered {}: {}", status, body);
        return Err(error_for_status(status.as_u16(), &body));
    }
    serde_json::from_str(&body).map_err(|e| RemoteError::Serialization(e.to_string()))
}

impl RemoteAuthority for HttpAuthority {
    fn load_map(&self, map_id: MapId) -> BoxFuture<'_, RemoteResult<TrackedMapState>> {
        let request = self.http.get(self.map_url(map_id));
        Box::pin(send(request))
    }

    fn create_objects(
        &self,
        map_id: MapId,
        layer: LayerName,
        objects: &[ObjectState],
    ) -> BoxFuture<'_, RemoteResult<Vec<ObjectState>>> {
        let request = self
            .objects_url(map_id, layer)
            .map(|url| self.http.post(url).json(objects));
        Box::pin(async move { send(request?).await })
    }

    fn update_objects(
        &self,
        map_id: MapId,
        layer: LayerName,
        updates: &[ObjectUpdate],
    ) -> BoxFuture<'_, RemoteResult<Vec<ObjectState>>> {
        let request = self
            .objects_url(map_id, layer)
            .map(|url| self.http.patch(url).json(updates));
        Box::pin(async move { send(request?).await })
    }

    fn delete_objects(
        &self,
        map_id: MapId,
        layer: LayerName,
        ids: &[ObjectId],
    ) -> BoxFuture<'_, RemoteResult<Vec<ObjectId>>> {
        let request = self
            .objects_url(map_id, layer)
            .map(|url| self.http.delete(url).json(ids));
        Box::pin(async move { send(request?).await })
    }

    fn update_map_geometry(
        &self,
        map_id: MapId,
        geometry: &MapGeometry,
    ) -> BoxFuture<'_, RemoteResult<MapGeometry>> {
        let request = self
            .http
            .patch(format!("{}/geometry", self.map_url(map_id)))
            .json(geometry);
        Box::pin(send(request))
    }
}

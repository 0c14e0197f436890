//! Admin and client HTTP surface of the flash group master.
//!
//! Every reply uses the `{code, msg, data}` envelope. Mutations run in a
//! spawned task so a caller that stops waiting never cancels a change that
//! is already being persisted.

use crate::core::{FlashGroupAdminView, FlashGroupRemoval, FlashNodeViewInfo, TopologyError};
use crate::flash::{FlashGroupManager, FlashNodeTarget};
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{Level, event};

/// Reply envelope shared by every route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiReply<T> {
    pub code: String,
    pub msg: String,
    pub data: Option<T>,
}

impl<T> ApiReply<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: "ok".to_string(),
            msg: "success".to_string(),
            data: Some(data),
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Topology(TopologyError),
    Input(String),
    CacheEmpty,
    Internal(String),
}

impl From<TopologyError> for WebError {
    fn from(err: TopologyError) -> Self {
        WebError::Topology(err)
    }
}

/// Status and machine-readable code for a topology failure. Batch failures
/// are reported by what stopped them.
fn topology_status(err: &TopologyError) -> (StatusCode, &'static str) {
    match err.root_cause() {
        TopologyError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        TopologyError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        TopologyError::StaleNode { .. } => (StatusCode::CONFLICT, "stale_node"),
        TopologyError::Precondition(_) => (StatusCode::CONFLICT, "precondition_failed"),
        TopologyError::Allocation(_) => (StatusCode::CONFLICT, "allocation_error"),
        TopologyError::InsufficientCapacity { .. } => {
            (StatusCode::CONFLICT, "insufficient_capacity")
        }
        TopologyError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
        TopologyError::Persistence(_) => (StatusCode::SERVICE_UNAVAILABLE, "persistence_error"),
        TopologyError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        TopologyError::LockError(_)
        | TopologyError::Serialization(_)
        | TopologyError::BatchFailed { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            WebError::Topology(err) => {
                let (status, code) = topology_status(&err);
                (status, err.to_string(), code.to_string())
            }
            WebError::Input(msg) => (StatusCode::BAD_REQUEST, msg, "invalid_argument".to_string()),
            WebError::CacheEmpty => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "flash group response cache is empty".to_string(),
                "cache_empty".to_string(),
            ),
            WebError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                msg,
                "internal_error".to_string(),
            ),
        };

        let body = Json(ApiReply::<()> {
            code,
            msg: message,
            data: None,
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;

pub fn router(manager: Arc<FlashGroupManager>) -> Router {
    Router::new()
        .route("/flashGroup/create", post(create_flash_group))
        .route("/flashGroup/remove", post(remove_flash_group))
        .route("/flashGroup/set", post(set_flash_group))
        .route("/flashGroup/get", get(get_flash_group))
        .route("/flashGroup/list", get(list_flash_groups))
        .route("/flashGroup/addFlashNode", post(add_flash_node_to_group))
        .route("/flashGroup/removeFlashNode", post(remove_flash_node_from_group))
        .route("/flashGroup/turn", post(turn_client_serving))
        .route("/client/flashGroups", get(client_flash_groups))
        .route("/flashNode/add", post(add_flash_node))
        .layer(TraceLayer::new_for_http())
        .with_state(manager)
}

/// Runs `op` on its own task and waits at most the configured request
/// timeout. The task keeps running after a timeout.
async fn spawn_mutation<T, F, Fut>(manager: &Arc<FlashGroupManager>, op: F) -> Result<T>
where
    F: FnOnce(Arc<FlashGroupManager>) -> Fut,
    Fut: Future<Output = crate::core::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let wait = manager.config().request_timeout;
    let handle = tokio::spawn(op(manager.clone()));
    match tokio::time::timeout(wait, handle).await {
        Ok(Ok(outcome)) => outcome.map_err(WebError::from),
        Ok(Err(join_err)) => Err(WebError::Internal(join_err.to_string())),
        Err(_) => {
            event!(
                Level::WARN,
                waited_ms = wait.as_millis() as u64,
                "flash group request timed out, mutation continues"
            );
            Err(TopologyError::Timeout(format!(
                "no result within {}ms",
                wait.as_millis()
            ))
            .into())
        }
    }
}

/// Parses a comma separated slot list, skipping entries that are not valid
/// slots and stopping once `cap` slots were read.
pub fn parse_slots(raw: &str, cap: usize) -> Vec<u32> {
    let mut slots = Vec::new();
    for part in raw.split(',') {
        if slots.len() >= cap {
            break;
        }
        if let Ok(slot) = part.trim().parse::<u32>() {
            slots.push(slot);
        }
    }
    slots
}

#[derive(Debug, Deserialize)]
pub struct CreateQuery {
    slots: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SetQuery {
    id: Option<u64>,
    enable: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    enable: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TurnQuery {
    enable: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTargetQuery {
    id: Option<u64>,
    addr: Option<String>,
    zone_name: Option<String>,
    count: Option<usize>,
}

impl NodeTargetQuery {
    fn into_target(self) -> Result<(u64, FlashNodeTarget)> {
        let id = required(self.id, "id")?;
        if let Some(addr) = self.addr.filter(|addr| !addr.trim().is_empty()) {
            return Ok((id, FlashNodeTarget::Host(addr)));
        }
        match (self.zone_name, self.count) {
            (Some(zone_name), Some(count)) if !zone_name.trim().is_empty() => {
                Ok((id, FlashNodeTarget::Zone { zone_name, count }))
            }
            _ => Err(WebError::Input(
                "either addr or zoneName and count are required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNodeQuery {
    addr: Option<String>,
    zone_name: Option<String>,
    version: Option<String>,
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| WebError::Input(format!("missing parameter '{}'", name)))
}

async fn create_flash_group(
    State(manager): State<Arc<FlashGroupManager>>,
    Query(query): Query<CreateQuery>,
) -> Result<Json<ApiReply<FlashGroupAdminView>>> {
    let cap = manager.config().slots_per_group;
    let slots = query
        .slots
        .as_deref()
        .map(|raw| parse_slots(raw, cap))
        .unwrap_or_default();
    let view = spawn_mutation(&manager, move |m| async move {
        m.create_flash_group(slots).await
    })
    .await?;
    Ok(Json(ApiReply::ok(view)))
}

async fn remove_flash_group(
    State(manager): State<Arc<FlashGroupManager>>,
    Query(query): Query<IdQuery>,
) -> Result<Json<ApiReply<FlashGroupRemoval>>> {
    let id = required(query.id, "id")?;
    let removal = spawn_mutation(&manager, move |m| async move {
        m.remove_flash_group(id).await
    })
    .await?;
    Ok(Json(ApiReply::ok(removal)))
}

async fn set_flash_group(
    State(manager): State<Arc<FlashGroupManager>>,
    Query(query): Query<SetQuery>,
) -> Result<Json<ApiReply<FlashGroupAdminView>>> {
    let id = required(query.id, "id")?;
    let enable = required(query.enable, "enable")?;
    let view = spawn_mutation(&manager, move |m| async move {
        m.set_flash_group_status(id, enable).await
    })
    .await?;
    Ok(Json(ApiReply::ok(view)))
}

async fn get_flash_group(
    State(manager): State<Arc<FlashGroupManager>>,
    Query(query): Query<IdQuery>,
) -> Result<Json<ApiReply<FlashGroupAdminView>>> {
    let id = required(query.id, "id")?;
    let view = manager.get_flash_group(id).await?;
    Ok(Json(ApiReply::ok(view)))
}

async fn list_flash_groups(
    State(manager): State<Arc<FlashGroupManager>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiReply<Vec<FlashGroupAdminView>>>> {
    let views = manager.list_flash_groups(query.enable).await?;
    Ok(Json(ApiReply::ok(views)))
}

async fn add_flash_node_to_group(
    State(manager): State<Arc<FlashGroupManager>>,
    Query(query): Query<NodeTargetQuery>,
) -> Result<Json<ApiReply<FlashGroupAdminView>>> {
    let (id, target) = query.into_target()?;
    let view = spawn_mutation(&manager, move |m| async move {
        m.add_flash_node_to_group(id, target).await
    })
    .await?;
    Ok(Json(ApiReply::ok(view)))
}

async fn remove_flash_node_from_group(
    State(manager): State<Arc<FlashGroupManager>>,
    Query(query): Query<NodeTargetQuery>,
) -> Result<Json<ApiReply<FlashGroupAdminView>>> {
    let (id, target) = query.into_target()?;
    let view = spawn_mutation(&manager, move |m| async move {
        m.remove_flash_node_from_group(id, target).await
    })
    .await?;
    Ok(Json(ApiReply::ok(view)))
}

async fn turn_client_serving(
    State(manager): State<Arc<FlashGroupManager>>,
    Query(query): Query<TurnQuery>,
) -> Result<Json<ApiReply<bool>>> {
    let enable = required(query.enable, "enable")?;
    manager.set_serving_enabled(enable);
    Ok(Json(ApiReply::ok(enable)))
}

/// Serves the cached snapshot bytes as-is.
async fn client_flash_groups(State(manager): State<Arc<FlashGroupManager>>) -> Result<Response> {
    let snapshot = manager.client_flash_groups();
    if snapshot.is_empty() {
        return Err(WebError::CacheEmpty);
    }
    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        snapshot.as_ref().clone(),
    )
        .into_response())
}

async fn add_flash_node(
    State(manager): State<Arc<FlashGroupManager>>,
    Query(query): Query<AddNodeQuery>,
) -> Result<Json<ApiReply<FlashNodeViewInfo>>> {
    let addr = required(query.addr, "addr")?;
    let zone_name = required(query.zone_name, "zoneName")?;
    let version = query.version.unwrap_or_default();
    let info = spawn_mutation(&manager, move |m| async move {
        m.add_flash_node(&addr, &zone_name, &version).await
    })
    .await?;
    Ok(Json(ApiReply::ok(info)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slots_skips_garbage_and_caps() {
        assert_eq!(parse_slots("100, 5000,abc,,-1,7", 32), vec![100, 5000, 7]);
        assert_eq!(parse_slots("1,2,3,4,5", 3), vec![1, 2, 3]);
        assert!(parse_slots("", 32).is_empty());
    }

    #[test]
    fn test_batch_status_follows_root_cause() {
        let err = TopologyError::BatchFailed {
            succeeded: vec!["a:1".to_string()],
            failed_host: "b:1".to_string(),
            source: Box::new(TopologyError::Persistence("log unavailable".to_string())),
        };
        assert_eq!(
            topology_status(&err),
            (StatusCode::SERVICE_UNAVAILABLE, "persistence_error")
        );
    }

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (TopologyError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (TopologyError::Conflict("x".into()), StatusCode::CONFLICT),
            (TopologyError::Precondition("x".into()), StatusCode::CONFLICT),
            (TopologyError::Allocation("x".into()), StatusCode::CONFLICT),
            (
                TopologyError::InsufficientCapacity {
                    found: 2,
                    requested: 3,
                },
                StatusCode::CONFLICT,
            ),
            (
                TopologyError::InvalidArgument("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (TopologyError::Timeout("x".into()), StatusCode::GATEWAY_TIMEOUT),
        ];
        for (err, expected) in cases {
            assert_eq!(topology_status(&err).0, expected, "{}", err);
        }
    }

    #[test]
    fn test_node_target_prefers_addr() {
        let query = NodeTargetQuery {
            id: Some(3),
            addr: Some("a:1".to_string()),
            zone_name: Some("z1".to_string()),
            count: Some(2),
        };
        let (id, target) = query.into_target().unwrap();
        assert_eq!(id, 3);
        assert_eq!(target, FlashNodeTarget::Host("a:1".to_string()));

        let incomplete = NodeTargetQuery {
            id: Some(3),
            addr: None,
            zone_name: Some("z1".to_string()),
            count: None,
        };
        assert!(matches!(incomplete.into_target(), Err(WebError::Input(_))));
    }
}

//! REST API handlers.
//!
//! Each handler calls into `HealthMonitor` and returns JSON responses.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::warn;

use peerwatch_health::MonitorError;
use peerwatch_state::{ConfigUpdate, StateError};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn monitor_error(e: &MonitorError) -> axum::response::Response {
    let status = match e {
        MonitorError::PeerNotFound(_) => StatusCode::NOT_FOUND,
        MonitorError::State(StateError::InvalidInterface(_) | StateError::InvalidPeer) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!(error = %e, "health request failed");
    }
    error_response(&e.to_string(), status).into_response()
}

// ── Health ─────────────────────────────────────────────────────

/// GET /api/v1/health
pub async fn get_overview(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.monitor.overview().await)
}

/// GET /api/v1/health/stats
pub async fn get_stats(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.monitor.stats().await)
}

/// POST /api/v1/health/cycle
pub async fn run_cycle(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.monitor.force_cycle().await)
}

// ── Peers ──────────────────────────────────────────────────────

/// GET /api/v1/health/peers/{key}
pub async fn get_peer(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match state.monitor.peer_health(&key).await {
        Some(snapshot) => ApiResponse::ok(snapshot).into_response(),
        None => error_response("peer not found", StatusCode::NOT_FOUND).into_response(),
    }
}

/// POST /api/v1/health/peers/{key}/probe
pub async fn probe_peer(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match state.monitor.probe_now(&key).await {
        Ok(snapshot) => ApiResponse::ok(snapshot).into_response(),
        Err(e) => monitor_error(&e),
    }
}

// ── Interfaces ─────────────────────────────────────────────────

/// GET /api/v1/health/interfaces/{name}
pub async fn get_interface(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.monitor.interface_config(&name).await {
        Ok(config) => ApiResponse::ok(config).into_response(),
        Err(e) => monitor_error(&e),
    }
}

/// PUT /api/v1/health/interfaces/{name}
///
/// Numeric fields are clamped rather than rejected.
pub async fn update_interface(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(update): Json<ConfigUpdate>,
) -> impl IntoResponse {
    match state.monitor.update_interface_config(&name, &update).await {
        Ok(config) => ApiResponse::ok(config).into_response(),
        Err(e) => monitor_error(&e),
    }
}

// ── Worker control ─────────────────────────────────────────────

/// POST /api/v1/health/start
pub async fn start_monitor(State(state): State<ApiState>) -> impl IntoResponse {
    let changed = state.monitor.start().await;
    ApiResponse::ok(serde_json::json!({
        "running": state.monitor.is_running(),
        "changed": changed,
    }))
}

/// POST /api/v1/health/stop
pub async fn stop_monitor(State(state): State<ApiState>) -> impl IntoResponse {
    let changed = state.monitor.stop().await;
    ApiResponse::ok(serde_json::json!({
        "running": state.monitor.is_running(),
        "changed": changed,
    }))
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::sync::Arc;

    use axum::body::to_bytes;
    use peerwatch_health::{HealthMonitor, MonitorSettings, ProbeOutcome, Prober};
    use peerwatch_state::InterfaceConfigStore;
    use peerwatch_tunnel::{
        BoxFuture, HandshakeValue, InterfaceState, PeerReport, Protocol, TunnelResult, TunnelSource,
    };
    use serde_json::Value;

    use super::*;

    const KEY: &str = "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=";

    struct OnePeer;

    impl TunnelSource for OnePeer {
        fn list_interfaces(&self) -> BoxFuture<'_, TunnelResult<Vec<InterfaceState>>> {
            Box::pin(async {
                Ok(vec![InterfaceState {
                    name: "wg0".to_string(),
                    protocol: Protocol::Wg,
                    is_up: true,
                }])
            })
        }

        fn list_peers<'a>(
            &'a self,
            _interface: &'a InterfaceState,
        ) -> BoxFuture<'a, TunnelResult<Vec<PeerReport>>> {
            Box::pin(async {
                Ok(vec![PeerReport {
                    public_key: KEY.to_string(),
                    name: "laptop".to_string(),
                    allowed_ips: "10.0.0.2/32".to_string(),
                    endpoint: "203.0.113.5:51820".to_string(),
                    latest_handshake: HandshakeValue::Text("0:00:42".to_string()),
                    persistent_keepalive: Some(25),
                }])
            })
        }

        fn set_keepalive<'a>(
            &'a self,
            _interface: &'a str,
            _protocol: Protocol,
            _peer: &'a str,
            _seconds: u16,
        ) -> BoxFuture<'a, TunnelResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    struct Answers;

    impl Prober for Answers {
        fn probe(&self, _address: IpAddr) -> BoxFuture<'_, ProbeOutcome> {
            Box::pin(async {
                ProbeOutcome {
                    success: true,
                    rtt_ms: 3.5,
                    packets_sent: 1,
                    packets_received: 1,
                    error: None,
                }
            })
        }
    }

    fn test_state() -> (tempfile::TempDir, ApiState) {
        let dir = tempfile::tempdir().unwrap();
        let configs = InterfaceConfigStore::open(&dir.path().join("settings.ini")).unwrap();
        let monitor = HealthMonitor::new(
            Arc::new(OnePeer),
            Arc::new(Answers),
            configs,
            MonitorSettings::default(),
        );
        (dir, ApiState { monitor })
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn overview_before_first_cycle() {
        let (_dir, state) = test_state();
        let resp = get_overview(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["success"], true);
        assert!(json["data"]["peers"].as_object().unwrap().is_empty());
        assert_eq!(json["data"]["interfaces"]["wg0"]["interface_active"], true);
        assert_eq!(json["data"]["running"], false);
    }

    #[tokio::test]
    async fn cycle_then_get_peer() {
        let (_dir, state) = test_state();
        let resp = run_cycle(State(state.clone())).await.into_response();
        let json = body_json(resp).await;
        assert_eq!(json["data"]["online"], 1);

        let resp = get_peer(State(state), Path(KEY.to_string())).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["data"]["status"], "online");
        assert_eq!(json["data"]["vpn_ip"], "10.0.0.2");
        assert_eq!(json["data"]["ping_rtt_ms"], 3.5);
    }

    #[tokio::test]
    async fn get_unknown_peer() {
        let (_dir, state) = test_state();
        let resp = get_peer(State(state), Path("nope".to_string())).await.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp).await;
        assert_eq!(json["success"], false);
        assert!(json.get("data").is_none());
    }

    #[tokio::test]
    async fn probe_unknown_peer() {
        let (_dir, state) = test_state();
        let resp = probe_peer(State(state), Path("nope".to_string())).await.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn probe_known_peer_counts_ping() {
        let (_dir, state) = test_state();
        state.monitor.force_cycle().await;

        let resp = probe_peer(State(state.clone()), Path(KEY.to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(get_stats(State(state)).await.into_response()).await;
        assert_eq!(json["data"]["total_pings"], 2);
        assert_eq!(json["data"]["successful_pings"], 2);
    }

    #[tokio::test]
    async fn update_interface_clamps() {
        let (_dir, state) = test_state();
        let update = ConfigUpdate {
            ping_interval: Some(1),
            keepalive_value: Some(999),
            ..Default::default()
        };
        let resp = update_interface(State(state.clone()), Path("wg0".to_string()), Json(update))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(
            get_interface(State(state), Path("wg0".to_string()))
                .await
                .into_response(),
        )
        .await;
        assert_eq!(json["data"]["ping_interval"], 10);
        assert_eq!(json["data"]["keepalive_value"], 120);
    }

    #[tokio::test]
    async fn invalid_interface_is_bad_request() {
        let (_dir, state) = test_state();
        let resp = get_interface(State(state), Path("way-too-long-interface".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn start_and_stop() {
        let (_dir, state) = test_state();

        let json = body_json(start_monitor(State(state.clone())).await.into_response()).await;
        assert_eq!(json["data"]["running"], true);
        assert_eq!(json["data"]["changed"], true);

        let json = body_json(start_monitor(State(state.clone())).await.into_response()).await;
        assert_eq!(json["data"]["changed"], false);

        let json = body_json(stop_monitor(State(state.clone())).await.into_response()).await;
        assert_eq!(json["data"]["running"], false);
        assert_eq!(json["data"]["changed"], true);
    }
}

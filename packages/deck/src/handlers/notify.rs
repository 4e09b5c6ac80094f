//! Out-of-band notification endpoint for the Claude CLI hook script.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::AppState;
use crate::ws::protocol::ServerMessage;

#[derive(Debug, Deserialize)]
pub struct HookNotifyBody {
    #[serde(rename = "panelId")]
    panel_id: String,
    message: String,
}

/// Forward a hook notification to the connected client, but only for panels
/// the session manager actually knows. Anything else is acknowledged and
/// dropped so a stale script cannot spam the UI.
pub async fn hook_notify(
    State(state): State<AppState>,
    Json(body): Json<HookNotifyBody>,
) -> StatusCode {
    if !state.sessions.has(&body.panel_id) {
        debug!(panel = %body.panel_id, "dropping hook notification for unknown panel");
    } else if state.broker.is_connected() {
        state.broker.send(ServerMessage::HookNotify {
            panel_id: body.panel_id,
            message: body.message,
        });
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::post;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use deck_pty::CreateSession;

    use super::*;
    use crate::test_support::{recv_message, test_state};

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/hook/notify", post(hook_notify))
            .with_state(state)
    }

    fn notify_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/hook/notify")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn forwards_for_known_panel() {
        let (state, _tmp) = test_state();
        let (tx, mut rx) = mpsc::channel(16);
        state.broker.authorize(tx);
        state
            .sessions
            .create(CreateSession {
                command: "bash".to_string(),
                args: vec![],
                cwd: "/tmp".to_string(),
                cols: 80,
                rows: 24,
                panel_id: Some("p1".to_string()),
                cli: "bash".to_string(),
                options: String::new(),
            })
            .unwrap();

        let resp = app(state)
            .oneshot(notify_request(r#"{"panelId":"p1","message":"input"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        assert_eq!(
            recv_message(&mut rx).await,
            ServerMessage::HookNotify {
                panel_id: "p1".to_string(),
                message: "input".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn drops_for_unknown_panel() {
        let (state, _tmp) = test_state();
        let (tx, mut rx) = mpsc::channel(16);
        state.broker.authorize(tx);

        let resp = app(state)
            .oneshot(notify_request(r#"{"panelId":"ghost","message":"input"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rejects_malformed_body() {
        let (state, _tmp) = test_state();
        let resp = app(state)
            .oneshot(notify_request("{not json"))
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{http::StatusCode, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};

pub const OAUTH_CALLBACK_ADDR: &str = "127.0.0.1:8085";
pub const OAUTH_CALLBACK_PATH: &str = "/callback";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCallback {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
struct CallbackState {
    expected_state: String,
    callback_tx: Arc<Mutex<Option<oneshot::Sender<std::result::Result<OAuthCallback, String>>>>>,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

/// Serve one OAuth redirect on the loopback address and return its code.
pub async fn wait_for_oauth_callback(
    addr: &str,
    expected_state: impl Into<String>,
    timeout: Duration,
) -> Result<OAuthCallback> {
    let expected_state = expected_state.into();
    let (callback_tx, callback_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);

    let app_state = CallbackState {
        expected_state,
        callback_tx: Arc::new(Mutex::new(Some(callback_tx))),
        shutdown_tx: shutdown_tx.clone(),
    };

    let app = Router::new()
        .route(OAUTH_CALLBACK_PATH, get(handle_callback))
        .with_state(app_state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind callback server at {addr}"))?;

    let server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut rx = shutdown_rx;
                let _ = rx.recv().await;
            })
            .await
    });

    let callback = tokio::select! {
        result = callback_rx => {
            match result {
                Ok(Ok(cb)) => Ok(cb),
                Ok(Err(denied)) => Err(anyhow!("authorization denied: {denied}")),
                Err(_) => Err(anyhow!("callback channel closed before receiving OAuth code")),
            }
        }
        _ = tokio::time::sleep(timeout) => {
            Err(anyhow!("timed out waiting for OAuth callback"))
        }
    };

    let _ = shutdown_tx.send(());
    let _ = server_task.await;

    callback
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(query): Query<CallbackQuery>,
) -> impl IntoResponse {
    if let Some(error) = query.error.clone() {
        if let Some(tx) = state.callback_tx.lock().await.take() {
            let _ = tx.send(Err(error));
        }
        let _ = state.shutdown_tx.send(());
        return (
            StatusCode::FORBIDDEN,
            Html("<h1>Authorization denied</h1><p>You can close this window.</p>"),
        )
            .into_response();
    }

    match validate_callback(query, &state.expected_state) {
        Ok(callback) => {
            if let Some(tx) = state.callback_tx.lock().await.take() {
                let _ = tx.send(Ok(callback));
            }
            let _ = state.shutdown_tx.send(());
            (
                StatusCode::OK,
                Html("<h1>Calendar access granted</h1><p>You can close this window.</p>"),
            )
                .into_response()
        }
        Err((status, message)) => (status, Html(message)).into_response(),
    }
}

fn validate_callback(
    query: CallbackQuery,
    expected_state: &str,
) -> std::result::Result<OAuthCallback, (StatusCode, String)> {
    let code = query
        .code
        .filter(|v| !v.is_empty())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "missing OAuth code".to_string()))?;
    let state = query
        .state
        .filter(|v| !v.is_empty())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "missing OAuth state".to_string()))?;

    if state != expected_state {
        return Err((
            StatusCode::UNAUTHORIZED,
            "state mismatch for OAuth callback".to_string(),
        ));
    }

    Ok(OAuthCallback { code, state })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(code: Option<&str>, state: Option<&str>) -> CallbackQuery {
        CallbackQuery {
            code: code.map(str::to_string),
            state: state.map(str::to_string),
            error: None,
        }
    }

    #[test]
    fn validate_callback_accepts_valid_query() {
        let callback =
            validate_callback(query(Some("4/code"), Some("state-abc")), "state-abc").unwrap();
        assert_eq!(callback.code, "4/code");
        assert_eq!(callback.state, "state-abc");
    }

    #[test]
    fn validate_callback_rejects_state_mismatch() {
        let err = validate_callback(query(Some("4/code"), Some("wrong")), "state-abc").unwrap_err();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn validate_callback_rejects_missing_code() {
        let err = validate_callback(query(Some(""), Some("state-abc")), "state-abc").unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn callback_server_delivers_code() {
        let addr = "127.0.0.1:18085";
        let waiter = tokio::spawn(wait_for_oauth_callback(
            addr,
            "s-1",
            Duration::from_secs(10),
        ));

        let url = format!("http://{addr}{OAUTH_CALLBACK_PATH}?code=abc&state=s-1");
        let mut delivered = false;
        for _ in 0..50 {
            if let Ok(resp) = reqwest::get(&url).await {
                assert!(resp.status().is_success());
                delivered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(delivered);

        let callback = waiter.await.unwrap().unwrap();
        assert_eq!(callback.code, "abc");
    }

    #[tokio::test]
    async fn callback_server_times_out() {
        let err = wait_for_oauth_callback("127.0.0.1:18086", "s", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}

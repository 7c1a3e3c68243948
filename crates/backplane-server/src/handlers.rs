use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use backplane_access::PolicyLookup;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::HttpError;
use crate::state::AppState;

pub async fn health_check() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::OK, "OK")
}

#[derive(Deserialize)]
pub struct AccessQuery {
    domain: String,
}

#[derive(Serialize)]
pub struct AccessResponse {
    playlist_url: String,
    token: String,
    expires_at: i64,
    cdn_base_url: String,
}

/// `GET /hls/{code}/access` (spec.md §7 "Stream access"): resolves the
/// referring domain against the whitelist, then mints a Stream Access
/// token bound to it. A whitelist miss is a structured denial, never a
/// pipeline failure (spec.md §8 edge cases).
pub async fn request_access(State(state): State<Arc<AppState>>, Path(code): Path<String>, Query(query): Query<AccessQuery>) -> Result<Response, HttpError> {
    let video = state.store.get_video_by_code(&code).await.ok_or_else(|| HttpError::NotFound(format!("video {code} not found")))?;

    let master_hls_path = video.master_hls_path.ok_or_else(|| HttpError::BadRequest(format!("video {code} is not ready for playback")))?;

    let policy = state.whitelist_cache.resolve(&query.domain, state.whitelist_source.as_ref()).await;
    if matches!(policy, PolicyLookup::Denied) {
        return Err(HttpError::Forbidden(format!("domain {} is not whitelisted for embedding", query.domain)));
    }

    let now = chrono::Utc::now().timestamp();
    let (token, cookie) = state.gate.mint(&query.domain, now);

    let body = AccessResponse {
        playlist_url: format!("{}/{}", state.cdn_base_url.trim_end_matches('/'), master_hls_path.trim_start_matches('/')),
        token: token.clone(),
        expires_at: now + cookie.max_age_secs,
        cdn_base_url: state.cdn_base_url.clone(),
    };

    let mut cookie_value = format!("backplane_access={token}; Max-Age={}; Path=/; HttpOnly; SameSite=None; Secure", cookie.max_age_secs);
    if let Some(domain) = &cookie.domain {
        cookie_value.push_str(&format!("; Domain={domain}"));
    }

    let mut response = Json(body).into_response();
    response.headers_mut().insert(axum::http::header::SET_COOKIE, axum::http::HeaderValue::from_str(&cookie_value).map_err(|e| HttpError::Internal(e.to_string()))?);
    Ok(response)
}

/// `GET /ws`: upgrades to a WebSocket and fans out every `ClientEvent`
/// published to the process-wide client registry (spec.md §9).
pub async fn websocket_upgrade(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut receiver = state.registry.subscribe();
    loop {
        tokio::select! {
            event = receiver.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "websocket client lagged, dropping buffered events");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                let Ok(payload) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

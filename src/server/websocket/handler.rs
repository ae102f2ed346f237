use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{ClientMessage, ServerMessage};
use crate::collaboration::{ConnectionId, CoordinatorHandle, Mutation};
use crate::config::HubConfig;
use crate::errors::{HubError, HubResult};
use crate::scene::{is_finite_vec3, Vec3};
use crate::server::app::AppState;

pub async fn websocket_handler(ws: WebSocketUpgrade, State(app_state): State<AppState>) -> Response {
    debug!("WebSocket upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, app_state.coordinator, app_state.hub_config))
}

async fn handle_socket(socket: WebSocket, hub: CoordinatorHandle, config: Arc<HubConfig>) {
    let (mut sender, mut receiver) = socket.split();

    let (handle, mut rx) = hub.register();
    let connection_id = handle.id;
    let Some(outbound) = hub.registry().outbound(connection_id) else {
        return;
    };
    info!("WebSocket connection {} opened", connection_id);

    // Everything for this client, room events and direct replies alike, goes
    // through the bounded outbound queue so ordering is preserved.
    let mut writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if let Err(e) = sender.send(Message::Text(json)).await {
                        debug!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize {}: {}", msg.event_name(), e);
                }
            }
        }
    });

    let mut rate_limiter = RateLimiter::new(config.max_messages_per_sec, Duration::from_secs(1));

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if !rate_limiter.allow() {
                    warn!("Rate limit exceeded for connection {}", connection_id);
                    let notice = ServerMessage::Error {
                        kind: "RoomBackpressure".to_string(),
                        message: "Rate limit exceeded".to_string(),
                    };
                    if outbound.send(notice).await.is_err() {
                        break;
                    }
                    continue;
                }

                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => {
                        handle_client_message(client_msg, connection_id, &hub, &config).await
                    }
                    Err(e) => {
                        warn!("Failed to parse client message: {}", e);
                        Err(HubError::InvalidPayload(format!(
                            "Invalid message format: {}",
                            e
                        )))
                    }
                };

                match reply {
                    Ok(Some(msg)) => {
                        if outbound.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        if err.is_client_error() {
                            debug!(
                                "Connection {} request rejected [{}]: {}",
                                connection_id,
                                err.error_code(),
                                err
                            );
                        } else {
                            warn!(
                                "Connection {} request failed [{}] (retryable: {}): {}",
                                connection_id,
                                err.error_code(),
                                err.is_retryable(),
                                err
                            );
                        }
                        let evicted = matches!(err, HubError::ConnectionNotFound(_));
                        if outbound.send(ServerMessage::from_error(&err)).await.is_err() || evicted {
                            break;
                        }
                    }
                }
            }
            Ok(Message::Close(_)) => {
                debug!("Close frame from connection {}", connection_id);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket error on connection {}: {}", connection_id, e);
                break;
            }
        }
    }

    hub.disconnect(connection_id).await;
    drop(outbound);
    if tokio::time::timeout(Duration::from_secs(1), &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }
    info!("WebSocket connection {} closed", connection_id);
}

async fn handle_client_message(
    message: ClientMessage,
    connection_id: ConnectionId,
    hub: &CoordinatorHandle,
    config: &HubConfig,
) -> HubResult<Option<ServerMessage>> {
    match message {
        ClientMessage::Join { data } => {
            let label = data.user_label.trim();
            if label.is_empty() {
                return Err(HubError::InvalidPayload(
                    "User label cannot be empty".to_string(),
                ));
            }
            hub.join(connection_id, data.project_id, label.to_string())
                .await?;
        }

        ClientMessage::Leave {} => hub.leave(connection_id).await?,

        ClientMessage::AddAnnotation { data } => {
            validate_vector("position", &data.position)?;
            let text = validate_text(&data.text, config.max_text_len)?;
            hub.submit(
                connection_id,
                Mutation::AddAnnotation {
                    position: data.position,
                    text,
                },
            )
            .await?;
        }

        ClientMessage::PostChat { data } => {
            let text = validate_text(&data.text, config.max_text_len)?;
            hub.submit(connection_id, Mutation::PostChat { text }).await?;
        }

        ClientMessage::UpdateTransform { data } => {
            validate_vector("position", &data.position)?;
            validate_vector("rotation", &data.rotation)?;
            validate_scale(&data.scale)?;
            hub.submit(
                connection_id,
                Mutation::UpdateTransform {
                    position: data.position,
                    rotation: data.rotation,
                    scale: data.scale,
                },
            )
            .await?;
        }

        ClientMessage::UpdateCamera { data } => {
            if !data.camera.is_object() {
                return Err(HubError::InvalidPayload(
                    "Camera must be a JSON object".to_string(),
                ));
            }
            hub.submit(connection_id, Mutation::UpdateCamera { camera: data.camera })
                .await?;
        }

        ClientMessage::Ping => return Ok(Some(ServerMessage::Pong)),
    }

    Ok(None)
}

fn validate_vector(field: &str, v: &Vec3) -> HubResult<()> {
    if is_finite_vec3(v) {
        Ok(())
    } else {
        Err(HubError::InvalidPayload(format!(
            "{} components must be finite",
            field
        )))
    }
}

fn validate_scale(scale: &Vec3) -> HubResult<()> {
    validate_vector("scale", scale)?;
    if scale.iter().all(|s| *s > 0.0) {
        Ok(())
    } else {
        Err(HubError::InvalidPayload(
            "scale components must be positive".to_string(),
        ))
    }
}

fn validate_text(text: &str, max_len: usize) -> HubResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(HubError::InvalidPayload("Text cannot be empty".to_string()));
    }
    if text.chars().count() > max_len {
        return Err(HubError::InvalidPayload(format!(
            "Text exceeds {} characters",
            max_len
        )));
    }
    Ok(text.to_string())
}

/// Sliding-window limit on inbound messages for one connection
struct RateLimiter {
    max_requests: u32,
    window: Duration,
    requests: VecDeque<Instant>,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: VecDeque::new(),
        }
    }

    fn allow(&mut self) -> bool {
        let now = Instant::now();

        while let Some(&front) = self.requests.front() {
            if now.duration_since(front) > self.window {
                self.requests.pop_front();
            } else {
                break;
            }
        }

        if self.requests.len() < self.max_requests as usize {
            self.requests.push_back(now);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_caps_window() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[test]
    fn test_rate_limiter_window_slides() {
        let mut limiter = RateLimiter::new(1, Duration::from_millis(10));
        assert!(limiter.allow());
        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.allow());
    }

    #[test]
    fn test_vector_validation() {
        assert!(validate_vector("position", &[0.0, -1.5, 2.0]).is_ok());
        assert!(validate_vector("position", &[f64::NAN, 0.0, 0.0]).is_err());
        assert!(validate_scale(&[1.0, 2.0, 0.5]).is_ok());
        assert!(validate_scale(&[1.0, 0.0, 1.0]).is_err());
        assert!(validate_scale(&[1.0, f64::INFINITY, 1.0]).is_err());
    }

    #[test]
    fn test_text_validation() {
        assert_eq!(validate_text("  hello ", 10), Ok("hello".to_string()));
        assert!(matches!(
            validate_text("   ", 10),
            Err(HubError::InvalidPayload(_))
        ));
        assert!(validate_text("abcdef", 5).is_err());
        assert!(validate_text("ééééé", 5).is_ok());
    }
}

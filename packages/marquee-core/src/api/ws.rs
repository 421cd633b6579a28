//! WebSocket handler for the screen event channel.
//!
//! Each screen opens one persistent bidirectional channel. The first
//! message must be `player:register`; from then on the handler pumps the
//! screen's outbound queue into the socket and routes inbound messages
//! (heartbeats, acks, screenshots, mode reports) to the services. A
//! heartbeat-silent connection is closed so the registry sweep can flip
//! the row offline.

use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::{SplitSink, StreamExt};
use serde_json::Value;

use crate::api::AppState;
use crate::events::{ClientMessage, ServerMessage};
use crate::model::{Screen, ScreenStatus, BOOTSTRAP_TENANT};
use crate::services::ConnectionGuard;
use crate::utils::now_millis;

/// How long to wait for the initial `player:register`.
const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Builds the screen row a registration upserts.
fn screen_from_register(message: &ClientMessage) -> Option<Screen> {
    let ClientMessage::PlayerRegister {
        screen_id,
        name,
        group_id,
        location_id,
        client_id,
        platform,
        resolution,
        orientation,
        capabilities,
    } = message
    else {
        return None;
    };
    Some(Screen {
        id: screen_id.clone(),
        client_id: client_id
            .clone()
            .unwrap_or_else(|| BOOTSTRAP_TENANT.to_string()),
        name: name.clone().unwrap_or_else(|| screen_id.clone()),
        group_id: group_id.clone(),
        location_id: location_id.clone(),
        sync_group: None,
        screen_type: None,
        status: ScreenStatus::Online,
        last_seen: now_millis(),
        platform: platform.clone(),
        resolution: resolution.clone(),
        orientation: orientation.clone(),
        capabilities: capabilities.clone(),
        config: Value::Null,
        connected: true,
        current_mode: Default::default(),
    })
}

/// Sends a catch-up `sync:state` if the screen is in a playing group.
fn send_sync_catchup(state: &AppState, screen_id: &str) {
    let Ok(screen) = state.store.get_screen(screen_id) else {
        return;
    };
    let Some(group_id) = screen.sync_group else {
        return;
    };
    let Some(run) = state.sync.runs().get(&group_id) else {
        return;
    };
    let Ok(members) = state.store.sync_group_members(&group_id) else {
        return;
    };
    let Some(position) = members.iter().position(|m| m == screen_id) else {
        return;
    };
    state.registry.send_to(
        screen_id,
        ServerMessage::SyncState {
            group_id,
            item_index: run.item_index,
            started_at: run.started_at,
            mode: run.mode,
            screen_index: position,
            total_screens: members.len(),
            playing: true,
        },
    );
}

/// Serializes and sends one server message; false on a dead socket.
async fn send_message(sender: &mut SplitSink<WebSocket, Message>, message: &ServerMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            log::error!("[WS] Failed to serialize message: {e}");
            true
        }
    }
}

/// Main connection handler.
async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // The channel is useless until the screen tells us who it is.
    let registration = tokio::time::timeout(REGISTER_TIMEOUT, async {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Text(text) = message {
                if let Ok(parsed) = serde_json::from_str::<ClientMessage>(&text) {
                    if let Some(screen) = screen_from_register(&parsed) {
                        return Some(screen);
                    }
                }
            }
        }
        None
    })
    .await;

    let screen = match registration {
        Ok(Some(screen)) => screen,
        Ok(None) => {
            log::debug!("[WS] Channel closed before registration");
            return;
        }
        Err(_) => {
            log::warn!("[WS] No registration within {REGISTER_TIMEOUT:?}, closing");
            return;
        }
    };

    let guard: ConnectionGuard = match state.registry.register_connection(&screen) {
        Ok(guard) => guard,
        Err(e) => {
            log::warn!("[WS] Registration for {} failed: {e}", screen.id);
            return;
        }
    };
    send_sync_catchup(&state, guard.screen_id());

    let heartbeat_timeout =
        Duration::from_secs(state.config.heartbeat_interval_secs.saturating_mul(2));
    let mut heartbeat_check = tokio::time::interval(Duration::from_secs(1));
    heartbeat_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            _ = guard.cancel_token().cancelled() => {
                log::info!("[WS] Channel force-closed: {}", guard.screen_id());
                break;
            }
            outbound = guard.queue().pop() => {
                if !send_message(&mut sender, &outbound).await {
                    break;
                }
            }
            inbound = receiver.next() => {
                last_activity = Instant::now();
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(message) => handle_client_message(&state, guard.screen_id(), message),
                            Err(_) => {} // Unknown message type, ignore
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            _ = heartbeat_check.tick() => {
                if last_activity.elapsed() > heartbeat_timeout {
                    log::warn!("[WS] Heartbeat timeout for {}", guard.screen_id());
                    break;
                }
            }
        }
    }

    // ConnectionGuard::drop removes the map entry and flips the row offline.
}

/// Routes one inbound message to the owning service.
fn handle_client_message(state: &AppState, connected_id: &str, message: ClientMessage) {
    // Re-registration over a live channel: refresh the row.
    if let Some(screen) = screen_from_register(&message) {
        if screen.id == connected_id {
            if let Err(e) = state.store.upsert_screen(&screen) {
                log::warn!("[WS] Re-registration failed for {connected_id}: {e}");
            }
        }
        return;
    }

    match message {
        ClientMessage::PlayerRegister { .. } => {}
        ClientMessage::PlayerHeartbeat {
            screen_id,
            screenshot,
            ..
        } => {
            if screen_id == connected_id {
                if let Err(e) = state.registry.heartbeat(&screen_id, screenshot) {
                    log::warn!("[WS] Heartbeat persist failed for {screen_id}: {e}");
                }
            }
        }
        ClientMessage::PlayerReady { screen_id, .. } => {
            if screen_id == connected_id {
                send_sync_catchup(state, &screen_id);
            }
        }
        ClientMessage::SyncAck {
            screen_id,
            group_id,
            item_index,
        } => {
            if screen_id == connected_id {
                state.sync.record_ack(&group_id, &screen_id, item_index);
            }
        }
        ClientMessage::ScreenshotResponse { screen_id, image } => {
            if screen_id == connected_id {
                state.registry.store_screenshot(&screen_id, image);
            }
        }
        ClientMessage::ModeUpdate { screen_id, mode } => {
            if screen_id == connected_id {
                state.registry.apply_mode_update(&screen_id, mode);
            }
        }
    }
}

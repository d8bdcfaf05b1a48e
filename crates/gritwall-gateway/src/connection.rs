use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use gritwall_engine::Engine;
use gritwall_types::api::Claims;
use gritwall_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a single WebSocket connection: Identify handshake, Ready, then the
/// command/event loop.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    engine: Arc<Engine>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with JWT
    let user_id = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} connected to gateway", user_id);

    // Step 2: Send Ready event
    let ready = GatewayEvent::Ready { user_id };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    // Per-connection room subscriptions (shared between send and recv tasks).
    let subscribed_rooms: Arc<std::sync::RwLock<HashSet<Uuid>>> =
        Arc::new(std::sync::RwLock::new(HashSet::new()));
    let send_subscriptions = subscribed_rooms.clone();

    // Direct replies (RoomJoin snapshots, list requests) bypass the broadcast
    // bus and go straight to this connection.
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<GatewayEvent>();

    let mut broadcast_rx = dispatcher.subscribe();

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Spawn task to forward broadcasts + direct replies -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if let Some(room_id) = event.room_id() {
                        let subs = send_subscriptions.read()
                            .expect("subscription lock poisoned");
                        if !subs.contains(&room_id) {
                            continue;
                        }
                    }

                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                result = reply_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_subscriptions = subscribed_rooms.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&engine, user_id, cmd, &recv_subscriptions, &reply_tx);
                    }
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            user_id,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} disconnected from gateway", user_id);
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<Uuid> {
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let timeout = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some(token_data.claims.sub);
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

fn handle_command(
    engine: &Arc<Engine>,
    user_id: Uuid,
    cmd: GatewayCommand,
    subscriptions: &Arc<std::sync::RwLock<HashSet<Uuid>>>,
    reply_tx: &mpsc::UnboundedSender<GatewayEvent>,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::RoomJoin { challenge_id } => {
            info!("{} joining room {}", user_id, challenge_id);
            subscriptions
                .write()
                .expect("subscription lock poisoned")
                .insert(challenge_id);

            // Joiner gets an immediate snapshot of the room.
            match engine.get_challenge(challenge_id) {
                Ok(data) => {
                    let _ = reply_tx.send(GatewayEvent::RoomUpdate { challenge_id, data });
                }
                Err(e) => warn!("{} room snapshot for {} failed: {}", user_id, challenge_id, e),
            }
        }

        GatewayCommand::RoomLeave { challenge_id } => {
            subscriptions
                .write()
                .expect("subscription lock poisoned")
                .remove(&challenge_id);
        }

        GatewayCommand::ChallengeAccept { challenge_id } => {
            info!("{} accepting challenge {}", user_id, challenge_id);
            if let Err(e) = engine.accept_challenge(user_id, challenge_id) {
                warn!("{} accept of {} failed: {}", user_id, challenge_id, e);
                return;
            }
            subscriptions
                .write()
                .expect("subscription lock poisoned")
                .insert(challenge_id);
        }

        GatewayCommand::ChallengeReject { challenge_id } => {
            info!("{} rejecting challenge {}", user_id, challenge_id);
            if let Err(e) = engine.reject_challenge(user_id, challenge_id) {
                warn!("{} reject of {} failed: {}", user_id, challenge_id, e);
                return;
            }
            subscriptions
                .write()
                .expect("subscription lock poisoned")
                .remove(&challenge_id);
        }

        GatewayCommand::ChallengeComplete { challenge_id } => {
            info!("{} completing challenge {}", user_id, challenge_id);
            if let Err(e) = engine.complete_challenge(user_id, challenge_id) {
                warn!("{} completion of {} failed: {}", user_id, challenge_id, e);
            }
        }

        GatewayCommand::ShameListGet => match engine.shame_list() {
            Ok(entries) => {
                let _ = reply_tx.send(GatewayEvent::ShameListUpdate(entries));
            }
            Err(e) => warn!("{} shame list request failed: {}", user_id, e),
        },

        GatewayCommand::LeaderboardGet => match engine.global_leaderboard() {
            Ok(entries) => {
                let _ = reply_tx.send(GatewayEvent::GlobalLeaderboard(entries));
            }
            Err(e) => warn!("{} leaderboard request failed: {}", user_id, e),
        },
    }
}

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::broadcast;

use crate::api::AppState;
use crate::models::PositionRecord;

/// Client subscription message
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
enum ClientMessage {
    /// Subscribe to specific vehicles; an empty list means all vehicles
    Subscribe { vehicle_ids: Vec<String> },
}

/// Server message sent to clients
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
enum ServerMessage {
    /// Initial connection acknowledgment
    Connected { message: String },
    /// Current positions of the subscribed vehicles (sent on subscribe)
    Snapshot { vehicles: Vec<PositionRecord> },
    /// One accepted position report
    Position { record: PositionRecord },
}

/// Which vehicles a connection wants to hear about
#[derive(Debug, Default)]
enum Subscription {
    /// No subscribe message received yet; nothing is forwarded
    #[default]
    None,
    /// The "all vehicles" stream
    All,
    Vehicles(HashSet<String>),
}

impl Subscription {
    fn from_ids(vehicle_ids: Vec<String>) -> Self {
        if vehicle_ids.is_empty() {
            Subscription::All
        } else {
            Subscription::Vehicles(vehicle_ids.into_iter().collect())
        }
    }

    fn matches(&self, vehicle_id: &str) -> bool {
        match self {
            Subscription::None => false,
            Subscription::All => true,
            Subscription::Vehicles(ids) => ids.contains(vehicle_id),
        }
    }
}

/// WebSocket endpoint for live position updates
pub async fn ws_positions(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut updates_rx = state.updates_tx.subscribe();
    let mut subscription = Subscription::None;

    // Send connected message
    let connected_msg = ServerMessage::Connected {
        message: "Connected to position updates. Send subscribe message with vehicle_ids."
            .to_string(),
    };
    if let Ok(json) = serde_json::to_string(&connected_msg) {
        let _ = sender.send(Message::Text(json.into())).await;
    }

    // Channel to communicate subscriptions from receiver task to sender task
    let (sub_tx, mut sub_rx) = tokio::sync::mpsc::channel::<Vec<String>>(16);

    let forward_state = state.clone();

    // Spawn task to forward broadcast updates to the WebSocket
    let forward_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                // Handle subscription updates
                Some(vehicle_ids) = sub_rx.recv() => {
                    subscription = Subscription::from_ids(vehicle_ids);

                    // Send a snapshot of the vehicles now covered
                    let vehicles: Vec<PositionRecord> = forward_state
                        .locations
                        .all_locations()
                        .await
                        .into_iter()
                        .filter(|r| subscription.matches(&r.vehicle_id))
                        .collect();
                    let msg = ServerMessage::Snapshot { vehicles };
                    if let Ok(json) = serde_json::to_string(&msg) {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
                // Handle broadcast updates
                result = updates_rx.recv() => {
                    match result {
                        Ok(event) => {
                            if !subscription.matches(&event.vehicle_id) {
                                continue;
                            }
                            let msg = ServerMessage::Position { record: event.record };
                            if let Ok(json) = serde_json::to_string(&msg) {
                                if sender.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
            }
        }
    });

    // Handle incoming messages from the client
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Ok(client_msg) = serde_json::from_str::<ClientMessage>(&text) {
                    match client_msg {
                        ClientMessage::Subscribe { vehicle_ids } => {
                            let _ = sub_tx.send(vehicle_ids).await;
                        }
                    }
                }
            }
            Ok(Message::Ping(_)) => {
                // Axum handles pong automatically
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    // Cleanup
    forward_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_matching() {
        assert!(!Subscription::None.matches("BUS-001"));
        assert!(Subscription::All.matches("BUS-001"));

        let picked = Subscription::from_ids(vec!["BUS-001".to_string()]);
        assert!(picked.matches("BUS-001"));
        assert!(!picked.matches("BUS-002"));

        // Empty id list means the aggregate stream
        assert!(matches!(Subscription::from_ids(vec![]), Subscription::All));
    }

    #[test]
    fn test_subscribe_message_parses() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","vehicle_ids":["BUS-001"]}"#).unwrap();
        let ClientMessage::Subscribe { vehicle_ids } = msg;
        assert_eq!(vehicle_ids, vec!["BUS-001".to_string()]);
    }
}

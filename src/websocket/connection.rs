use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use super::events::{ClientMessage, ServerMessage};

pub type Connections = Arc<RwLock<HashMap<String, String>>>;

/// One broadcast channel for the whole process; each connection's send task
/// drops messages not addressed to its user.
pub struct ConnectionManager {
    connections: Connections,
    broadcast_tx: broadcast::Sender<ServerMessage>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1000);
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            broadcast_tx,
        }
    }

    pub async fn handle_connection(&self, socket: WebSocket, user_id: String) {
        let (mut sender, mut receiver) = socket.split();
        let mut rx = self.broadcast_tx.subscribe();

        let connection_id = Uuid::new_v4().to_string();

        let active = {
            let mut conns = self.connections.write().await;
            conns.insert(connection_id.clone(), user_id.clone());
            conns.len()
        };

        tracing::debug!(
            "Dashboard connected: user={}, connection={}, active={}",
            user_id,
            connection_id,
            active
        );

        let hello = ServerMessage::Connected {
            user_id: user_id.clone(),
        };
        if let Ok(json) = serde_json::to_string(&hello) {
            let _ = sender.send(Message::Text(json)).await;
        }

        let send_user_id = user_id.clone();
        let send_task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(msg) => {
                        if !msg.visible_to(&send_user_id) {
                            continue;
                        }
                        if let Ok(json) = serde_json::to_string(&msg)
                            && sender.send(Message::Text(json)).await.is_err()
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        });

        let broadcast_tx_recv = self.broadcast_tx.clone();
        let connections_clone = self.connections.clone();
        let connection_id_clone = connection_id.clone();

        let recv_task = tokio::spawn(async move {
            while let Some(Ok(msg)) = receiver.next().await {
                if let Message::Text(text) = msg
                    && let Ok(client_msg) = serde_json::from_str::<ClientMessage>(&text)
                    && let ClientMessage::Heartbeat = client_msg
                {
                    let _ = broadcast_tx_recv.send(ServerMessage::Pong);
                }
            }

            let mut conns = connections_clone.write().await;
            conns.remove(&connection_id_clone);
        });

        tokio::select! {
            _ = send_task => {},
            _ = recv_task => {},
        }

        tracing::debug!(
            "Dashboard disconnected: user={}, connection={}",
            user_id,
            connection_id
        );
    }

    pub async fn broadcast(&self, message: ServerMessage) {
        let _ = self.broadcast_tx.send(message);
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

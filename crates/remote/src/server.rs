// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket server implementation.
//!
//! Handles client connections, request routing, and change fanout. Each
//! connection keeps its own subscription table; a change announcement is
//! turned into a `change` push for every subscription whose path it affects.

use std::collections::HashMap;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use lc_core::protocol::{ClientMessage, ServerMessage};
use lc_core::{Error, StorePath};

use crate::state::ServerState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Subscriptions of one connection, keyed by the id of the request that opened them.
type Subscriptions = HashMap<u64, StorePath>;

/// Run the WebSocket server on the given address.
pub async fn run(addr: SocketAddr, state: ServerState) -> Result<(), BoxError> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on: {}", addr);
    serve(listener, state).await
}

/// Accept connections from an already bound listener.
pub async fn serve(listener: TcpListener, state: ServerState) -> Result<(), BoxError> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let state = state.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }
}

/// Handle a single WebSocket connection.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: ServerState,
) -> Result<(), BoxError> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    info!("New WebSocket connection from: {}", peer_addr);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    // Subscribe before serving any request so no change is missed.
    let mut changes = state.subscribe();
    let mut subscriptions = Subscriptions::new();

    loop {
        tokio::select! {
            // Handle incoming requests from client
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_message(&text, &state, &mut subscriptions).await;
                        ws_sink.send(Message::Text(reply.to_json()?.into())).await?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} disconnected", peer_addr);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        ws_sink.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(_)) => {
                        // Ignore other message types (Binary, Pong, Frame)
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", peer_addr, e);
                        break;
                    }
                    None => {
                        info!("Client {} stream ended", peer_addr);
                        break;
                    }
                }
            }

            // Turn change announcements into pushes
            change = changes.recv() => {
                let pushes = match change {
                    Ok(path) => affected(&subscriptions, &path),
                    Err(RecvError::Lagged(n)) => {
                        warn!("Client {} lagged by {} changes, resending subscriptions", peer_addr, n);
                        subscriptions.iter().map(|(id, path)| (*id, path.clone())).collect()
                    }
                    Err(RecvError::Closed) => break,
                };
                for (subscription, path) in pushes {
                    let value = state.read(&path).await;
                    let push = ServerMessage::Change { subscription, value };
                    if let Err(e) = ws_sink.send(Message::Text(push.to_json()?.into())).await {
                        warn!("Failed to push change to {}: {}", peer_addr, e);
                        return Ok(());
                    }
                }
            }
        }
    }

    info!("Connection closed: {}", peer_addr);
    Ok(())
}

fn affected(subscriptions: &Subscriptions, changed: &StorePath) -> Vec<(u64, StorePath)> {
    let mut pushes: Vec<(u64, StorePath)> = subscriptions
        .iter()
        .filter(|(_, watched)| changed.affects(watched))
        .map(|(id, watched)| (*id, watched.clone()))
        .collect();
    pushes.sort_by_key(|(id, _)| *id);
    pushes
}

/// Process a client request and return its reply.
pub(crate) async fn handle_client_message(
    text: &str,
    state: &ServerState,
    subscriptions: &mut Subscriptions,
) -> ServerMessage {
    let msg = match ClientMessage::from_json(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Undecodable request: {}", e);
            return ServerMessage::error(None, &Error::InvalidInput(format!("undecodable request: {e}")));
        }
    };
    debug!("Received message: {:?}", msg);

    let id = msg.id();
    let result = match msg {
        ClientMessage::Read { id, path } => Ok(ServerMessage::Value { id, value: state.read(&path).await }),
        ClientMessage::Write { id, path, value } => state.write(&path, value).await.map(|()| ServerMessage::Ack { id }),
        ClientMessage::Update { id, path, fields } => {
            state.update(&path, fields).await.map(|()| ServerMessage::Ack { id })
        }
        ClientMessage::Increment { id, path, field, delta } => state
            .increment(&path, &field, delta)
            .await
            .map(|value| ServerMessage::Counter { id, value }),
        ClientMessage::Subscribe { id, path } => {
            subscriptions.insert(id, path.clone());
            debug!("Subscription {} opened on {}", id, path);
            Ok(ServerMessage::Subscribed { id, value: state.read(&path).await })
        }
        ClientMessage::Unsubscribe { id, subscription } => {
            subscriptions.remove(&subscription);
            debug!("Subscription {} closed", subscription);
            Ok(ServerMessage::Ack { id })
        }
        ClientMessage::Ping { id } => {
            debug!("Ping received: {}", id);
            Ok(ServerMessage::Pong { id })
        }
    };

    result.unwrap_or_else(|e| {
        warn!("Request {} failed: {}", id, e);
        ServerMessage::error(Some(id), &e)
    })
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;

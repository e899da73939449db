// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket client for the `lc-remote` relay.
//!
//! One connection carries every request. A writer task drains an outgoing
//! queue into the socket; a reader task routes replies to their waiting
//! request by id and change pushes to their subscription callback. Requests
//! that outlive the timeout, or that are in flight when the connection drops,
//! fail with [`Error::TransientNetwork`].
//!
//! A dropped connection is re-established with exponential backoff. Every
//! live subscription is then reopened under its original id, and the relay's
//! `subscribed` reply hands the current value to the existing callback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lc_core::protocol::{ClientMessage, ServerMessage};
use lc_core::{Error, Result, StorePath};

use super::{BoxFuture, ChangeCallback, RemoteSyncClient, Subscription};

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_millis(100);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// [`RemoteSyncClient`] over a relay connection.
pub struct WebSocketStore {
    conn: Arc<Connection>,
}

struct Connection {
    url: String,
    /// Queue of the current link; `None` while reconnecting.
    outgoing: Mutex<Option<mpsc::UnboundedSender<ClientMessage>>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<ServerMessage>>>,
    watchers: Mutex<HashMap<u64, Watcher>>,
    next_id: AtomicU64,
    connected: AtomicBool,
    request_timeout: Duration,
    shutdown: CancellationToken,
}

struct Watcher {
    path: StorePath,
    callback: ChangeCallback,
}

impl WebSocketStore {
    /// Connects to a relay at `url` (`ws://` or `wss://`).
    ///
    /// Only the first connection attempt can fail; later drops are retried
    /// in the background until the store is closed.
    pub async fn connect(url: &str, request_timeout: Duration) -> Result<Self> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::TransientNetwork(format!("connection failed: {e}")))?;
        info!(url, "connected to relay");

        let conn = Arc::new(Connection {
            url: url.to_string(),
            outgoing: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            watchers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(false),
            request_timeout,
            shutdown: CancellationToken::new(),
        });
        let link = conn.attach(ws_stream);
        tokio::spawn(supervise(Arc::downgrade(&conn), link, conn.shutdown.clone()));

        Ok(WebSocketStore { conn })
    }

    /// Round-trips a keepalive.
    pub async fn ping(&self) -> Result<()> {
        let id = self.conn.next_id();
        match self.conn.request(ClientMessage::Ping { id }).await? {
            ServerMessage::Pong { .. } => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Closes the connection for good. Pending and later requests fail.
    pub fn close(&self) {
        self.conn.shutdown.cancel();
        self.conn.disconnected();
    }
}

impl Drop for WebSocketStore {
    fn drop(&mut self) {
        self.close();
    }
}

impl Connection {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Queues `msg` on the current link. False while disconnected.
    fn send(&self, msg: ClientMessage) -> bool {
        lock(&self.outgoing).as_ref().is_some_and(|tx| tx.send(msg).is_ok())
    }

    /// Sends `msg` and waits for the reply carrying its id.
    async fn request(&self, msg: ClientMessage) -> Result<ServerMessage> {
        let id = msg.id();
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        if !self.is_connected() || !self.send(msg) {
            lock(&self.pending).remove(&id);
            return Err(Error::TransientNetwork("not connected to relay".to_string()));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Err(_) => {
                lock(&self.pending).remove(&id);
                Err(Error::TransientNetwork(format!(
                    "request {id} timed out after {}ms",
                    self.request_timeout.as_millis()
                )))
            }
            Ok(Err(_)) => Err(Error::TransientNetwork("connection closed".to_string())),
            Ok(Ok(ServerMessage::Error { kind, message, .. })) => Err(kind.into_error(message)),
            Ok(Ok(reply)) => Ok(reply),
        }
    }

    fn callback(&self, subscription: u64) -> Option<ChangeCallback> {
        lock(&self.watchers).get(&subscription).map(|w| Arc::clone(&w.callback))
    }

    fn dispatch(&self, msg: ServerMessage) {
        match msg {
            ServerMessage::Change { subscription, value } => match self.callback(subscription) {
                Some(callback) => callback(value),
                None => debug!(subscription, "change for closed subscription"),
            },
            ServerMessage::Error { id: None, message, .. } => {
                warn!(%message, "relay reported an error");
            }
            reply => {
                // The initial value is delivered here, before any change that follows it.
                if let ServerMessage::Subscribed { id, value } = &reply {
                    if let Some(callback) = self.callback(*id) {
                        callback(value.clone());
                    }
                }
                let Some(id) = reply.reply_to() else { return };
                match lock(&self.pending).remove(&id) {
                    Some(waiter) => {
                        let _ = waiter.send(reply);
                    }
                    None => debug!(id, "reply for abandoned request"),
                }
            }
        }
    }

    /// Starts the reader and writer for a fresh socket. The returned token
    /// is cancelled when the link goes down.
    fn attach(self: &Arc<Self>, ws_stream: WsStream) -> CancellationToken {
        let link = self.shutdown.child_token();
        let (sink, stream) = ws_stream.split();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        *lock(&self.outgoing) = Some(outgoing);
        self.connected.store(true, Ordering::SeqCst);
        tokio::spawn(write_loop(sink, outgoing_rx, link.clone()));
        tokio::spawn(read_loop(stream, Arc::downgrade(self), link.clone()));
        link
    }

    /// Reopens every live subscription on the current link.
    fn resubscribe(&self) {
        let watched: Vec<(u64, StorePath)> =
            lock(&self.watchers).iter().map(|(id, w)| (*id, w.path.clone())).collect();
        for (id, path) in watched {
            debug!(%path, id, "reopening relay subscription");
            self.send(ClientMessage::Subscribe { id, path });
        }
    }

    fn disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
        *lock(&self.outgoing) = None;
        // Dropping the senders fails every waiting request.
        lock(&self.pending).clear();
    }
}

/// Keeps the connection alive: waits for the current link to drop, then
/// reconnects and restores subscriptions, until shutdown.
async fn supervise(conn: Weak<Connection>, mut link: CancellationToken, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = link.cancelled() => {}
        }
        let url = {
            let Some(strong) = conn.upgrade() else { break };
            strong.disconnected();
            strong.url.clone()
        };
        warn!(url, "relay connection lost, reconnecting");

        let Some(ws_stream) = reconnect(&url, &shutdown).await else { break };
        let Some(strong) = conn.upgrade() else { break };
        link = strong.attach(ws_stream);
        strong.resubscribe();
        info!(url, "reconnected to relay");
    }
}

/// Retries with exponential backoff. `None` once `shutdown` fires.
async fn reconnect(url: &str, shutdown: &CancellationToken) -> Option<WsStream> {
    let mut delay = INITIAL_RECONNECT_DELAY;
    let mut attempt: u32 = 0;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
        match tokio_tungstenite::connect_async(url).await {
            Ok((ws_stream, _)) => return Some(ws_stream),
            Err(e) => {
                debug!(url, attempt, error = %e, "reconnect failed");
                delay = std::cmp::min(delay * 2, MAX_RECONNECT_DELAY);
            }
        }
    }
}

impl RemoteSyncClient for WebSocketStore {
    fn read_once(&self, path: &StorePath) -> BoxFuture<'_, Result<Option<Value>>> {
        let path = path.clone();
        Box::pin(async move {
            let id = self.conn.next_id();
            match self.conn.request(ClientMessage::Read { id, path }).await? {
                ServerMessage::Value { value, .. } => Ok(value),
                other => Err(unexpected(&other)),
            }
        })
    }

    fn write(&self, path: &StorePath, value: Value) -> BoxFuture<'_, Result<()>> {
        let path = path.clone();
        Box::pin(async move {
            let id = self.conn.next_id();
            match self.conn.request(ClientMessage::Write { id, path, value }).await? {
                ServerMessage::Ack { .. } => Ok(()),
                other => Err(unexpected(&other)),
            }
        })
    }

    fn update(&self, path: &StorePath, fields: Map<String, Value>) -> BoxFuture<'_, Result<()>> {
        let path = path.clone();
        Box::pin(async move {
            let id = self.conn.next_id();
            match self.conn.request(ClientMessage::Update { id, path, fields }).await? {
                ServerMessage::Ack { .. } => Ok(()),
                other => Err(unexpected(&other)),
            }
        })
    }

    fn increment(&self, path: &StorePath, field: &str, delta: i64) -> BoxFuture<'_, Result<i64>> {
        let path = path.clone();
        let field = field.to_string();
        Box::pin(async move {
            let id = self.conn.next_id();
            let msg = ClientMessage::Increment { id, path, field, delta };
            match self.conn.request(msg).await? {
                ServerMessage::Counter { value, .. } => Ok(value),
                other => Err(unexpected(&other)),
            }
        })
    }

    fn subscribe(&self, path: &StorePath, on_change: ChangeCallback) -> BoxFuture<'_, Result<Subscription>> {
        let path = path.clone();
        Box::pin(async move {
            let id = self.conn.next_id();
            // Registered first so no change can arrive before its watcher.
            lock(&self.conn.watchers).insert(id, Watcher { path: path.clone(), callback: on_change });

            let reply = self.conn.request(ClientMessage::Subscribe { id, path: path.clone() }).await;
            match reply {
                Ok(ServerMessage::Subscribed { .. }) => {}
                Ok(other) => {
                    lock(&self.conn.watchers).remove(&id);
                    return Err(unexpected(&other));
                }
                Err(e) => {
                    lock(&self.conn.watchers).remove(&id);
                    return Err(e);
                }
            }
            debug!(%path, id, "relay subscription opened");

            let weak: Weak<Connection> = Arc::downgrade(&self.conn);
            Ok(Subscription::new(move || {
                let Some(conn) = weak.upgrade() else { return };
                lock(&conn.watchers).remove(&id);
                let request = conn.next_id();
                // Fire and forget; the ack is dropped as an abandoned reply.
                conn.send(ClientMessage::Unsubscribe { id: request, subscription: id });
            }))
        })
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn write_loop(
    mut sink: futures_util::stream::SplitSink<WsStream, Message>,
    mut outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = outgoing.recv() => {
                let Some(msg) = msg else { break };
                let json = match msg.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "failed to encode request");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    warn!(error = %e, "relay send failed");
                    cancel.cancel();
                    break;
                }
            }
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(
    mut stream: futures_util::stream::SplitStream<WsStream>,
    conn: Weak<Connection>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = stream.next() => frame,
        };
        let Some(strong) = conn.upgrade() else { break };
        match frame {
            Some(Ok(Message::Text(text))) => match ServerMessage::from_json(&text) {
                Ok(msg) => strong.dispatch(msg),
                Err(e) => warn!(error = %e, "undecodable relay message"),
            },
            Some(Ok(Message::Close(_))) | None => {
                info!("relay closed the connection");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "relay connection failed");
                break;
            }
        }
    }
    cancel.cancel();
}

fn unexpected(msg: &ServerMessage) -> Error {
    Error::TransientNetwork(format!("unexpected relay reply: {msg:?}"))
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
#[path = "websocket_tests.rs"]
mod tests;

//! Request correlator.
//!
//! Owns the single WebSocket connection to the clearnode and turns it into
//! a pseudo-synchronous request/response API. Each outbound request
//! registers a oneshot waiter under its numeric identifier; a reader task
//! routes inbound frames to the matching waiter regardless of arrival
//! order. Background notices are dropped without resolving anything.
//!
//! Timeouts are per request: expiry removes only that request's entry and
//! leaves the connection and every other waiter untouched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use clearswap_core::constants::CONNECT_TIMEOUT_MS;
use clearswap_core::error::{Result, SwapError};

use crate::rpc::{classify_frame, InboundFrame, RpcRequest, RpcResponse};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

type Waiter = oneshot::Sender<Result<RpcResponse>>;
type PendingMap = Arc<DashMap<u64, Waiter>>;

/// State of the underlying connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection has been established yet
    Disconnected,
    /// A connect attempt is in flight
    Connecting,
    /// The socket is open and the reader task is running
    Open,
    /// The socket was closed (locally or by the peer)
    Closed,
}

/// Correlates responses on one duplex connection to their requests.
pub struct Correlator {
    ws_url: String,
    next_id: AtomicU64,
    pending: PendingMap,
    outbound: RwLock<Option<mpsc::UnboundedSender<Message>>>,
    state: Arc<RwLock<ConnectionState>>,
    // Single-flight guard: only one connect attempt at a time.
    connect_guard: Mutex<()>,
}

impl Correlator {
    /// Creates a correlator for the given WebSocket URL. No connection is
    /// opened until [`Correlator::connect`] is called.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            next_id: AtomicU64::new(0),
            pending: Arc::new(DashMap::new()),
            outbound: RwLock::new(None),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            connect_guard: Mutex::new(()),
        }
    }

    /// Allocates the next request identifier.
    ///
    /// Identifiers come from a process-wide monotonic counter starting at 1,
    /// which keeps them collision-free for the lifetime of the pending map.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Establishes the connection if not already open. Idempotent.
    ///
    /// Fails with [`SwapError::Connection`] if the transport cannot be
    /// opened within the connect budget.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.connect_guard.lock().await;
        if self.state() == ConnectionState::Open {
            return Ok(());
        }
        *self.state.write() = ConnectionState::Connecting;

        let attempt = connect_async(&self.ws_url);
        let ws = match tokio::time::timeout(Duration::from_millis(CONNECT_TIMEOUT_MS), attempt).await
        {
            Ok(Ok((ws, _))) => ws,
            Ok(Err(e)) => {
                *self.state.write() = ConnectionState::Disconnected;
                return Err(SwapError::Connection(format!(
                    "failed to open {}: {e}",
                    self.ws_url
                )));
            }
            Err(_) => {
                *self.state.write() = ConnectionState::Disconnected;
                return Err(SwapError::Connection(format!(
                    "connect to {} timed out",
                    self.ws_url
                )));
            }
        };

        let (sink, source) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.write() = Some(tx);
        *self.state.write() = ConnectionState::Open;

        tokio::spawn(write_loop(rx, sink));
        tokio::spawn(read_loop(source, self.pending.clone(), self.state.clone()));

        debug!(url = %self.ws_url, "clearnode connection open");
        Ok(())
    }

    /// Closes the connection and rejects every in-flight request.
    pub fn disconnect(&self) {
        *self.outbound.write() = None;
        *self.state.write() = ConnectionState::Closed;
        drain_pending(&self.pending);
    }

    /// Sends one request frame and awaits the matching response.
    ///
    /// Exactly one network write happens per call. The request's pending
    /// entry is inserted before the write and removed when the response
    /// arrives, the timeout fires, or the connection drops - whichever
    /// comes first.
    pub async fn send_and_wait(
        &self,
        request: &RpcRequest,
        signatures: &[String],
        timeout_ms: u64,
    ) -> Result<RpcResponse> {
        if self.state() != ConnectionState::Open {
            return Err(SwapError::Connection("not connected to clearnode".into()));
        }

        let id = request.id;
        let (tx, rx) = oneshot::channel();
        // At most one pending entry per identifier, ever.
        if self.pending.contains_key(&id) {
            return Err(SwapError::Protocol(format!(
                "request identifier {id} is already in flight"
            )));
        }
        self.pending.insert(id, tx);

        let frame = request.envelope(signatures);
        let sent = {
            let outbound = self.outbound.read();
            match outbound.as_ref() {
                Some(tx) => tx.send(Message::Text(frame)).is_ok(),
                None => false,
            }
        };
        if !sent {
            self.pending.remove(&id);
            return Err(SwapError::Connection(
                "connection closed before request could be written".into(),
            ));
        }

        match tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(result)) => result,
            // Waiter dropped without a value: the reader task tore down.
            Ok(Err(_)) => Err(SwapError::Connection(
                "connection dropped before a response arrived".into(),
            )),
            Err(_) => {
                self.pending.remove(&id);
                Err(SwapError::Timeout { id, timeout_ms })
            }
        }
    }
}

async fn write_loop(mut rx: mpsc::UnboundedReceiver<Message>, mut sink: WsSink) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = sink.send(msg).await {
            warn!(error = %e, "write to clearnode failed");
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(mut source: WsSource, pending: PendingMap, state: Arc<RwLock<ConnectionState>>) {
    while let Some(frame) = source.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "clearnode read error");
                break;
            }
        };
        match msg {
            Message::Text(text) => route_frame(&text, &pending),
            Message::Close(_) => break,
            // Pings are answered by the protocol layer; nothing to route.
            _ => {}
        }
    }

    *state.write() = ConnectionState::Closed;
    drain_pending(&pending);
    debug!("clearnode connection closed");
}

/// Routes one inbound text frame to its waiter, or drops it.
fn route_frame(text: &str, pending: &DashMap<u64, Waiter>) {
    match classify_frame(text) {
        InboundFrame::Response(res) => match pending.remove(&res.id) {
            Some((_, waiter)) => {
                // The waiter may have timed out and gone away; that is fine.
                let _ = waiter.send(Ok(res));
            }
            None => debug!(id = res.id, method = %res.method, "unmatched response dropped"),
        },
        InboundFrame::Notice { method } => debug!(%method, "background notice ignored"),
        InboundFrame::Malformed(reason) => warn!(%reason, "malformed frame dropped"),
    }
}

fn drain_pending(pending: &DashMap<u64, Waiter>) {
    let ids: Vec<u64> = pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, waiter)) = pending.remove(&id) {
            let _ = waiter.send(Err(SwapError::Connection(
                "connection closed with request in flight".into(),
            )));
        }
    }
}

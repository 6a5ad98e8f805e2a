//! WebSocket channel to the relay server
//!
//! One logical duplex connection to `{base}/v1/ws`, driven by three tasks:
//!
//! - **writer**: drains the outbound queue in FIFO order once the socket is open
//! - **reader**: routes responses to the correlator, pushes to the dispatcher,
//!   and enforces the heartbeat (no ping within `ping_interval` closes the channel)
//! - **dispatcher**: awaits handlers one event at a time, in server order
//!
//! The channel never reconnects. `Closed` is terminal; recovery means
//! building a new channel, which callers do from the close handler or after
//! [`WebSocketChannel::closed`] resolves.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::correlator::RequestCorrelator;
use super::{parse_frame, EventHandlers, Incoming, ServerEvent};
use crate::config::ClientConfig;
use crate::errors::{ClientError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state of the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Open,
    /// Terminal
    Closed,
}

enum Dispatch {
    Push(ServerEvent),
    Closed { reason: String, by_caller: bool },
}

/// State shared between the channel handle and its tasks
struct Shared {
    state: RwLock<ChannelState>,
    correlator: RequestCorrelator,
    dispatch_tx: mpsc::UnboundedSender<Dispatch>,
    close_fired: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    closure_tx: watch::Sender<Option<Closure>>,
}

/// How the channel ended
#[derive(Debug, Clone)]
struct Closure {
    reason: String,
    by_caller: bool,
}

impl Shared {
    /// Transition to `Closed`; only the first call has any effect
    fn close(&self, reason: impl Into<String>, by_caller: bool) {
        if self.close_fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let reason = reason.into();
        *self.state.write() = ChannelState::Closed;

        if by_caller {
            tracing::info!(reason = %reason, "Relay websocket closed");
        } else {
            tracing::warn!(reason = %reason, "Relay websocket closed");
        }
        metrics::counter!("relay_ws_closed_total").increment(1);

        self.correlator.fail_all(&reason);
        let _ = self.shutdown_tx.send(true);
        self.closure_tx.send_replace(Some(Closure {
            reason: reason.clone(),
            by_caller,
        }));
        let _ = self.dispatch_tx.send(Dispatch::Closed { reason, by_caller });
    }

    fn handle_text(&self, text: &str) {
        match parse_frame(text) {
            Incoming::Response { id, outcome } => {
                self.correlator.resolve(&id, outcome);
            }
            Incoming::Push(event) => {
                metrics::counter!("relay_ws_pushes_total", "kind" => event.kind()).increment(1);
                let _ = self.dispatch_tx.send(Dispatch::Push(event));
            }
            Incoming::Dropped => {}
            Incoming::Unrecognised => {
                let preview: String = text.chars().take(200).collect();
                tracing::warn!(frame = %preview, "Ignoring unrecognised frame");
            }
        }
    }
}

/// Duplex connection to the relay
pub struct WebSocketChannel {
    url: String,
    api_key: Option<String>,
    ping_interval: Duration,
    shared: Arc<Shared>,
    handlers: Arc<RwLock<EventHandlers>>,
    outbound_tx: mpsc::UnboundedSender<Message>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    dispatch_rx: Mutex<Option<mpsc::UnboundedReceiver<Dispatch>>>,
    shutdown_rx: watch::Receiver<bool>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl WebSocketChannel {
    pub fn new(
        url: String,
        api_key: Option<String>,
        response_timeout: Duration,
        ping_interval: Duration,
        handlers: Arc<RwLock<EventHandlers>>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (closure_tx, _) = watch::channel(None);

        Self {
            url,
            api_key,
            ping_interval,
            shared: Arc::new(Shared {
                state: RwLock::new(ChannelState::Disconnected),
                correlator: RequestCorrelator::new(response_timeout),
                dispatch_tx,
                close_fired: AtomicBool::new(false),
                shutdown_tx,
                closure_tx,
            }),
            handlers,
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            dispatch_rx: Mutex::new(Some(dispatch_rx)),
            shutdown_rx,
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn from_config(config: &ClientConfig, handlers: Arc<RwLock<EventHandlers>>) -> Result<Self> {
        Ok(Self::new(
            config.ws_url()?,
            config.api_key.clone(),
            config.response_timeout(),
            config.ping_interval(),
            handlers,
        ))
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.read()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pending_requests(&self) -> usize {
        self.shared.correlator.pending_count()
    }

    /// Open the connection
    ///
    /// Concurrent callers share a single attempt: the second one waits for
    /// the first and then observes its outcome. A failed attempt closes the
    /// channel for good.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        match self.state() {
            ChannelState::Open => return Ok(()),
            ChannelState::Closed => return Err(closed_error()),
            ChannelState::Disconnected | ChannelState::Connecting => {}
        }
        *self.shared.state.write() = ChannelState::Connecting;
        self.start_dispatcher();

        tracing::info!(url = %self.url, "Connecting to relay websocket");
        let request = match self.build_request() {
            Ok(request) => request,
            Err(e) => {
                self.shared.close(e.to_string(), false);
                return Err(e);
            }
        };
        let handshake_timeout = self.shared.correlator.timeout();
        let stream = match tokio::time::timeout(handshake_timeout, connect_async(request)).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                let reason = format!("connect failed: {e}");
                self.shared.close(reason.clone(), false);
                return Err(ClientError::Transport(reason));
            }
            Err(_) => {
                let reason = format!(
                    "connect timed out after {}ms",
                    handshake_timeout.as_millis()
                );
                self.shared.close(reason.clone(), false);
                return Err(ClientError::Transport(reason));
            }
        };

        let outbound_rx = self.outbound_rx.lock().take();
        let Some(outbound_rx) = outbound_rx else {
            return Err(ClientError::transport("outbound queue already attached"));
        };
        {
            let mut state = self.shared.state.write();
            if *state != ChannelState::Connecting {
                return Err(closed_error());
            }
            *state = ChannelState::Open;
        }

        let (sink, stream) = stream.split();
        tokio::spawn(write_loop(
            sink,
            outbound_rx,
            self.shared.clone(),
            self.shutdown_rx.clone(),
        ));
        tokio::spawn(read_loop(
            stream,
            self.shared.clone(),
            self.ping_interval,
            self.shutdown_rx.clone(),
        ));

        tracing::info!(url = %self.url, "Relay websocket connected");
        Ok(())
    }

    /// Send a correlated request and wait for its response
    ///
    /// Requests issued before the socket opens are queued and flushed in call
    /// order; requests on a closed channel fail immediately.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        if self.state() == ChannelState::Closed {
            return Err(closed_error());
        }
        let pending = self.shared.correlator.register();
        if self.state() == ChannelState::Closed {
            return Err(closed_error());
        }

        let frame = json!({ "id": pending.id(), "method": method, "params": params });
        tracing::debug!(request_id = pending.id(), method, "Queueing request");
        if self.outbound_tx.send(Message::Text(frame.to_string())).is_err() {
            return Err(closed_error());
        }

        self.connect().await?;
        self.shared.correlator.wait(pending).await
    }

    /// Close the channel from the caller side
    ///
    /// Pending requests fail and the close handler runs once, as for any
    /// other closure.
    pub fn close(&self) {
        self.start_dispatcher();
        self.shared.close("closed by caller", true);
    }

    /// Resolve once the channel has closed
    ///
    /// `Ok` for a caller close, `Err(Transport)` carrying the reason for any
    /// other closure. Works with no close handler registered.
    pub async fn closed(&self) -> Result<()> {
        let mut closure_rx = self.shared.closure_tx.subscribe();
        let closure = closure_rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| closed_error())?
            .clone();
        match closure {
            Some(Closure { by_caller: true, .. }) => Ok(()),
            Some(Closure { reason, .. }) => Err(ClientError::Transport(reason)),
            None => Err(closed_error()),
        }
    }

    /// Spawn the dispatcher on first use
    ///
    /// Needs a Tokio runtime; without one the close handler cannot run and
    /// only [`Self::closed`] reports the closure.
    fn start_dispatcher(&self) {
        let mut dispatch_rx = self.dispatch_rx.lock();
        if dispatch_rx.is_none() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                if let Some(rx) = dispatch_rx.take() {
                    runtime.spawn(dispatch_loop(rx, self.handlers.clone()));
                }
            }
            Err(e) => tracing::error!(error = %e, "No runtime to run websocket handlers on"),
        }
    }

    fn build_request(&self) -> Result<Request> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::Configuration(format!("invalid websocket url: {e}")))?;
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| ClientError::Configuration(format!("invalid api key: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(request)
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        // Stop the tasks without running the close handler
        let _ = self.shared.shutdown_tx.send(true);
    }
}

fn closed_error() -> ClientError {
    ClientError::transport("websocket channel is closed")
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            message = outbound.recv() => {
                let Some(message) = message else { break };
                if let Err(e) = sink.send(message).await {
                    shared.close(format!("send failed: {e}"), false);
                    break;
                }
            }
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    shared: Arc<Shared>,
    ping_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut deadline = Instant::now() + ping_interval;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep_until(deadline) => {
                shared.close(
                    format!("no ping received within {}ms", ping_interval.as_millis()),
                    false,
                );
                break;
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Ping(_))) => {
                    deadline = Instant::now() + ping_interval;
                    tracing::trace!("Ping received");
                }
                Some(Ok(Message::Text(text))) => shared.handle_text(&text),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => shared.handle_text(text),
                    Err(_) => tracing::warn!(len = bytes.len(), "Ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|frame| format!("closed by server: {} {}", frame.code, frame.reason))
                        .unwrap_or_else(|| "closed by server".to_string());
                    shared.close(reason, false);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    shared.close(format!("read failed: {e}"), false);
                    break;
                }
                None => {
                    shared.close("connection ended", false);
                    break;
                }
            }
        }
    }
}

async fn dispatch_loop(
    mut rx: mpsc::UnboundedReceiver<Dispatch>,
    handlers: Arc<RwLock<EventHandlers>>,
) {
    while let Some(item) = rx.recv().await {
        let current = handlers.read().clone();
        match item {
            Dispatch::Push(event) => current.dispatch(event).await,
            Dispatch::Closed { reason, by_caller } => {
                match (&current.websocket_close, by_caller) {
                    (Some(handler), _) => handler(reason).await,
                    (None, true) => {}
                    (None, false) => current.closed(reason).await,
                }
                break;
            }
        }
    }
}

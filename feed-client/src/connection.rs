// feed-client/src/connection.rs
//! Client side of a hub connection.
//!
//! A [`HubConnection`] moves through `Disconnected -> Connecting -> Connected`
//! on [`HubConnection::start`]. An unexpected loss moves it to `Reconnecting`,
//! where it waits out each entry of the reconnect schedule and retries with a
//! freshly fetched token. Tokens are single use on the server, so a token is
//! never presented twice. [`HubConnection::stop`] ends the connection without
//! reconnecting.

use common::{HubFrame, Tick, DATA_EVENT, RECEIVE_EVENT};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::config::{ClientConfig, TokenTransport};
use crate::error::ClientError;
use crate::token_source::TokenSource;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Notifications delivered to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    Connected,
    /// The connection was lost and a reconnect is under way.
    Reconnecting { error: String },
    Reconnected,
    /// The connection ended for good. `error` is `None` after `stop()`.
    Closed { error: Option<String> },
    Data(Tick),
    Receive { user: String, message: String },
}

type Completion = oneshot::Sender<Result<(), ClientError>>;

struct Shared {
    config: ClientConfig,
    token_source: Arc<dyn TokenSource>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<HubEvent>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    pending: DashMap<String, Completion>,
    next_id: AtomicU64,
    shutdown: Mutex<Option<CancellationToken>>,
}

/// Handle to a hub connection. Cheap to clone.
#[derive(Clone)]
pub struct HubConnection {
    shared: Arc<Shared>,
}

impl HubConnection {
    pub fn new(config: ClientConfig, token_source: Arc<dyn TokenSource>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                config,
                token_source,
                state,
                events,
                outbound: Mutex::new(None),
                pending: DashMap::new(),
                next_id: AtomicU64::new(1),
                shutdown: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch state transitions
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.shared.events.subscribe()
    }

    /// Connect to the hub. Fails unless the connection is `Disconnected`.
    pub async fn start(&self) -> Result<(), ClientError> {
        let claimed = self.shared.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(ClientError::InvalidState {
                action: "start",
                state: self.state(),
            });
        }
        tracing::info!("Connecting to {}", self.shared.config.server_url);

        let shutdown = CancellationToken::new();
        *lock(&self.shared.shutdown) = Some(shutdown.clone());

        let socket = match self.shared.connect().await {
            Ok(socket) if shutdown.is_cancelled() => {
                drop(socket);
                self.shared.set_state(ConnectionState::Disconnected);
                return Err(ClientError::ConnectionClosed);
            }
            Ok(socket) => socket,
            Err(e) => {
                tracing::warn!("Failed to connect: {}", e);
                self.shared.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let rx = self.shared.open_outbound();

        self.shared.set_state(ConnectionState::Connected);
        self.shared.emit(HubEvent::Connected);

        tokio::spawn(run(self.shared.clone(), socket, rx, shutdown));
        Ok(())
    }

    /// Close the connection without reconnecting and wait until it is
    /// `Disconnected`. Does nothing when already stopped.
    pub async fn stop(&self) {
        let shutdown = lock(&self.shared.shutdown).take();
        if let Some(shutdown) = shutdown {
            shutdown.cancel();
        }

        let mut state = self.watch_state();
        while *state.borrow_and_update() != ConnectionState::Disconnected {
            if state.changed().await.is_err() {
                break;
            }
        }
    }

    /// Call a hub method and wait for its completion.
    pub async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<(), ClientError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let (tx, rx) = oneshot::channel();

        let frame = HubFrame::Invocation {
            invocation_id: Some(id.clone()),
            target: target.to_string(),
            arguments,
        };
        self.shared.send_frame("invoke", &frame, Some((id, tx)))?;

        rx.await.unwrap_or(Err(ClientError::ConnectionClosed))
    }

    /// Call a hub method without waiting for a completion.
    pub fn send(&self, target: &str, arguments: Vec<Value>) -> Result<(), ClientError> {
        self.shared
            .send_frame("send", &HubFrame::invocation(target, arguments), None)
    }
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::info!("Connection state {:?} -> {:?}", previous, next);
        }
    }

    fn emit(&self, event: HubEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Queue `frame` for the live socket. A completion is registered under
    /// the outbound lock, so `close_outbound` either sees it and fails it or
    /// the send is refused.
    fn send_frame(
        &self,
        action: &'static str,
        frame: &HubFrame,
        completion: Option<(String, Completion)>,
    ) -> Result<(), ClientError> {
        let state = *self.state.borrow();
        if state != ConnectionState::Connected {
            return Err(ClientError::InvalidState { action, state });
        }

        let text = frame.to_json()?;
        let outbound = lock(&self.outbound);
        let tx = outbound.as_ref().ok_or(ClientError::ConnectionClosed)?;

        let id = completion.map(|(id, done)| {
            self.pending.insert(id.clone(), done);
            id
        });
        if tx.send(Message::Text(text)).is_err() {
            if let Some(id) = id {
                self.pending.remove(&id);
            }
            return Err(ClientError::ConnectionClosed);
        }
        Ok(())
    }

    /// Fresh queue for a newly opened socket
    fn open_outbound(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.outbound) = Some(tx);
        rx
    }

    /// Refuse further sends, then fail every call still waiting.
    fn close_outbound(&self) {
        *lock(&self.outbound) = None;
        self.fail_pending();
    }

    /// Fetch a fresh token and open the WebSocket.
    async fn connect(&self) -> Result<Socket, ClientError> {
        let token = self.token_source.fetch().await?;
        let request = hub_request(&self.config, &token)?;

        match connect_async(request).await {
            Ok((socket, _)) => Ok(socket),
            Err(WsError::Http(response)) => {
                Err(ClientError::HandshakeRejected(response.status().as_u16()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Walk the reconnect schedule. `Err` carries the last failure once every
    /// attempt is spent; `Ok(None)` means the connection was stopped meanwhile.
    async fn reconnect(
        &self,
        shutdown: &CancellationToken,
        mut last_error: String,
    ) -> Result<Option<Socket>, String> {
        for (attempt, delay_ms) in self.config.reconnect_delays_ms.iter().enumerate() {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(None),
                _ = tokio::time::sleep(Duration::from_millis(*delay_ms)) => {}
            }

            tracing::info!("Reconnect attempt {} after {}ms", attempt + 1, delay_ms);
            let attempted = tokio::select! {
                _ = shutdown.cancelled() => return Ok(None),
                attempted = self.connect() => attempted,
            };
            match attempted {
                Ok(socket) => return Ok(Some(socket)),
                Err(e) => {
                    tracing::warn!("Reconnect attempt {} failed: {}", attempt + 1, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(last_error)
    }

    fn fail_pending(&self) {
        let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(ClientError::ConnectionClosed));
            }
        }
    }

    fn dispatch(&self, text: &str) {
        let frame = match HubFrame::from_json(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Ignoring unreadable hub frame: {}", e);
                return;
            }
        };

        match frame {
            HubFrame::Invocation {
                target, arguments, ..
            } => match decode_event(&target, arguments) {
                Some(event) => self.emit(event),
                None => tracing::debug!("Ignoring hub event '{}'", target),
            },
            HubFrame::Completion {
                invocation_id,
                error,
            } => {
                if let Some((_, tx)) = self.pending.remove(&invocation_id) {
                    let _ = tx.send(match error {
                        Some(error) => Err(ClientError::Invocation(error)),
                        None => Ok(()),
                    });
                }
            }
            HubFrame::Close { error } => {
                tracing::info!("Hub sent close: {:?}", error);
            }
            HubFrame::Ping => {}
        }
    }
}

/// Turn a server-to-client invocation into an event
fn decode_event(target: &str, arguments: Vec<Value>) -> Option<HubEvent> {
    let mut arguments = arguments.into_iter();

    match target {
        DATA_EVENT => {
            let tick = serde_json::from_value(arguments.next()?).ok()?;
            Some(HubEvent::Data(tick))
        }
        RECEIVE_EVENT => match (arguments.next()?, arguments.next()?) {
            (Value::String(user), Value::String(message)) => {
                Some(HubEvent::Receive { user, message })
            }
            _ => None,
        },
        _ => None,
    }
}

/// Handshake request carrying `token` as configured
fn hub_request(config: &ClientConfig, token: &str) -> Result<Request, ClientError> {
    let mut url = config.hub_url()?;

    match config.token_transport {
        TokenTransport::Header => {
            let mut request = url.as_str().into_client_request()?;
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ClientError::InvalidToken(e.to_string()))?;
            request.headers_mut().insert("Authorization", value);
            Ok(request)
        }
        TokenTransport::Query => {
            url.query_pairs_mut().append_pair("access_token", token);
            Ok(url.as_str().into_client_request()?)
        }
    }
}

/// Drive the socket until it is lost or the connection is stopped.
/// Returns the loss reason, or `None` after a stop.
async fn pump(
    shared: &Shared,
    socket: Socket,
    outbound: &mut mpsc::UnboundedReceiver<Message>,
    shutdown: &CancellationToken,
) -> Option<String> {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    tracing::debug!("Close frame not sent: {}", e);
                }
                return None;
            }
            message = outbound.recv() => match message {
                Some(message) => {
                    if let Err(e) = sink.send(message).await {
                        return Some(e.to_string());
                    }
                }
                None => return Some("outbound queue closed".to_string()),
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => shared.dispatch(&text),
                Some(Ok(Message::Close(frame))) => {
                    return Some(format!("server closed the connection: {:?}", frame));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Some(e.to_string()),
                None => return Some("connection closed".to_string()),
            },
        }
    }
}

async fn run(
    shared: Arc<Shared>,
    socket: Socket,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    shutdown: CancellationToken,
) {
    let mut socket = socket;

    let closing_error = loop {
        let lost = pump(&shared, socket, &mut outbound, &shutdown).await;
        shared.close_outbound();

        let error = match lost {
            Some(error) if !shutdown.is_cancelled() => error,
            _ => break None,
        };

        tracing::warn!("Connection lost: {}", error);
        shared.set_state(ConnectionState::Reconnecting);
        shared.emit(HubEvent::Reconnecting {
            error: error.clone(),
        });

        match shared.reconnect(&shutdown, error).await {
            Ok(Some(next)) if !shutdown.is_cancelled() => {
                socket = next;
                outbound = shared.open_outbound();
                shared.set_state(ConnectionState::Connected);
                shared.emit(HubEvent::Reconnected);
            }
            Ok(_) => break None,
            Err(error) => break Some(error),
        }
    };

    shared.close_outbound();
    if let Some(error) = &closing_error {
        tracing::error!("Giving up on the hub: {}", error);
    }
    shared.set_state(ConnectionState::Disconnected);
    shared.emit(HubEvent::Closed {
        error: closing_error,
    });
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

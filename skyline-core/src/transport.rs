//! Live duplex transport to the streaming speech endpoint.
//!
//! `LiveConnector` opens a connection; `LiveTransport` is the per-session
//! outbound handle. The production implementation speaks websocket via
//! tokio-tungstenite: one spawned task owns both halves of the socket,
//! forwarding outbound frames from a bounded channel and parsing inbound
//! text into [`ServerMessage`]s for the session queue.
//!
//! `connect` never blocks on the network. The handshake runs in the spawned
//! task under a deadline; success surfaces as `SessionEvent::Opened`,
//! failure (including timeout) as `SessionEvent::TransportError`.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::{
    error::{Result, SessionError},
    session::event_loop::SessionEvent,
    wire::{RealtimeInput, ServerMessage, SetupRequest},
};

/// Production streaming endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/\
     google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Outbound frames buffered before the writer applies back-pressure.
const WRITER_QUEUE_CAP: usize = 32;

/// Opens live connections. One connector can serve many sequential sessions.
pub trait LiveConnector: Send + Sync + 'static {
    /// Begin connecting and return the outbound handle immediately.
    ///
    /// Lifecycle traffic (`Opened`, `Inbound`, `TransportError`, `Closed`)
    /// arrives on `events`.
    fn connect(
        &self,
        setup: SetupRequest,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Box<dyn LiveTransport>>;
}

/// Outbound half of one live connection.
pub trait LiveTransport: Send + 'static {
    /// Queue one capture frame. Fails when the writer queue is full or the
    /// connection is gone; the caller counts that as a dropped frame.
    fn send_realtime(&mut self, input: RealtimeInput) -> Result<()>;

    /// Ask the writer to close the socket. Idempotent.
    fn close(&mut self);
}

enum WriterCmd {
    Frame(String),
    Close,
}

/// Websocket connector for the real endpoint.
pub struct WsConnector {
    endpoint: String,
    api_key: String,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(api_key: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            connect_timeout,
        }
    }

    /// Point at a non-default endpoint (staging, local mock).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl LiveConnector for WsConnector {
    fn connect(
        &self,
        setup: SetupRequest,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Box<dyn LiveTransport>> {
        let url = format!("{}?key={}", self.endpoint, self.api_key);
        let timeout = self.connect_timeout;
        let (out_tx, out_rx) = mpsc::channel::<WriterCmd>(WRITER_QUEUE_CAP);

        tokio::spawn(run_socket(url, setup, timeout, out_rx, events));

        Ok(Box::new(WsTransport { out_tx }))
    }
}

/// Handshake, negotiate, then pump both directions until either side closes.
async fn run_socket(
    url: String,
    setup: SetupRequest,
    timeout: Duration,
    mut out_rx: mpsc::Receiver<WriterCmd>,
    events: mpsc::Sender<SessionEvent>,
) {
    let connected = tokio::time::timeout(timeout, connect_async(url.as_str())).await;
    let ws = match connected {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(e)) => {
            let _ = events
                .send(SessionEvent::TransportError(format!("handshake: {e}")))
                .await;
            return;
        }
        Err(_elapsed) => {
            let _ = events
                .send(SessionEvent::TransportError(format!(
                    "handshake timed out after {timeout:?}"
                )))
                .await;
            return;
        }
    };

    let (mut write, mut read) = ws.split();

    let setup_text = setup.to_wire().to_string();
    if let Err(e) = write.send(Message::Text(setup_text)).await {
        let _ = events
            .send(SessionEvent::TransportError(format!("setup send: {e}")))
            .await;
        return;
    }

    if events.send(SessionEvent::Opened).await.is_err() {
        return;
    }
    debug!("live socket negotiated");

    loop {
        tokio::select! {
            cmd = out_rx.recv() => match cmd {
                Some(WriterCmd::Frame(text)) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        let _ = events
                            .send(SessionEvent::TransportError(format!("frame send: {e}")))
                            .await;
                        return;
                    }
                }
                Some(WriterCmd::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    return;
                }
            },

            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    dispatch_inbound(text.as_bytes(), &events).await;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    dispatch_inbound(&bytes, &events).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    let _ = events.send(SessionEvent::Closed).await;
                    return;
                }
                Some(Ok(_)) => {} // ping/pong handled by the library
                Some(Err(e)) => {
                    let _ = events
                        .send(SessionEvent::TransportError(format!("socket read: {e}")))
                        .await;
                    return;
                }
            },
        }
    }
}

async fn dispatch_inbound(raw: &[u8], events: &mpsc::Sender<SessionEvent>) {
    match serde_json::from_slice::<ServerMessage>(raw) {
        Ok(message) => {
            let _ = events.send(SessionEvent::Inbound(message)).await;
        }
        Err(e) => {
            // Unparseable messages are skipped; the session decides what to
            // do about malformed audio inside a parseable one.
            warn!(error = %e, "ignoring unparseable server message");
        }
    }
}

/// Outbound handle backed by the writer queue.
pub struct WsTransport {
    out_tx: mpsc::Sender<WriterCmd>,
}

impl LiveTransport for WsTransport {
    fn send_realtime(&mut self, input: RealtimeInput) -> Result<()> {
        let text = serde_json::to_string(&serde_json::json!({ "realtimeInput": input }))
            .map_err(|e| SessionError::Connection(format!("frame encode: {e}")))?;
        self.out_tx
            .try_send(WriterCmd::Frame(text))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    SessionError::Connection("writer queue full".into())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    SessionError::Connection("connection closed".into())
                }
            })
    }

    fn close(&mut self) {
        let _ = self.out_tx.try_send(WriterCmd::Close);
    }
}

//! WebSocket transport to the Inference Session.
//!
//! [`WsConnector`] opens the socket, sends the setup frame, and spawns a
//! single IO task that owns both socket halves. Outgoing messages travel
//! through an mpsc channel; incoming frames are parsed and translated into
//! the ordered [`LiveEvent`] stream the session event loop consumes. The
//! translation preserves arrival order, which is what makes interruption
//! handling correct: an `Interrupted` always reaches the consumer before
//! any audio that followed it on the wire.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::messages::{ClientMessage, ServerMessage, SessionSetup};
use crate::audio::from_transport_text;
use crate::config::LiveConfig;
use crate::error::{ClientError, ClientResult};
use crate::tools::ToolInvocation;

/// Default Inference Session endpoint.
const LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Channel capacity for WebSocket message sending.
const WS_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Events
// =============================================================================

/// One event from the Inference Session, in wire arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// Setup acknowledged, session is live
    Opened,
    /// PCM16 audio from the model, base64 already stripped
    Audio { data: Bytes, sample_rate: u32 },
    /// Text part of a model turn
    Text(String),
    /// The user spoke over the model; queued playback must be flushed
    Interrupted,
    /// The model finished its turn
    TurnComplete,
    /// Function invocations to execute client-side
    ToolCalls(Vec<ToolInvocation>),
    /// Transport-level failure
    Error(String),
    /// Socket is gone, no further events follow
    Closed,
}

// =============================================================================
// Connection Handle
// =============================================================================

/// Cloneable sender for outgoing client messages.
#[derive(Debug, Clone)]
pub struct LiveSender {
    tx: mpsc::Sender<ClientMessage>,
}

impl LiveSender {
    pub async fn send(&self, message: ClientMessage) -> ClientResult<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| ClientError::ConnectError("session channel closed".to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Live connection: outgoing sender, incoming events, and the IO task.
///
/// Dropping every [`LiveSender`] clone makes the IO task send a close frame
/// and exit; aborting `io_task` tears the socket down immediately.
pub struct LiveConnection {
    sender: LiveSender,
    events: mpsc::Receiver<LiveEvent>,
    io_task: JoinHandle<()>,
}

impl LiveConnection {
    pub fn new(
        outbound: mpsc::Sender<ClientMessage>,
        events: mpsc::Receiver<LiveEvent>,
        io_task: JoinHandle<()>,
    ) -> Self {
        Self {
            sender: LiveSender { tx: outbound },
            events,
            io_task,
        }
    }

    /// Clone of the outgoing sender.
    pub fn sender(&self) -> LiveSender {
        self.sender.clone()
    }

    pub async fn send(&self, message: ClientMessage) -> ClientResult<()> {
        self.sender.send(message).await
    }

    /// Next event, `None` once the IO task is gone and the stream drained.
    pub async fn next_event(&mut self) -> Option<LiveEvent> {
        self.events.recv().await
    }

    /// Decompose for the session loop: sender, event stream, IO handle.
    pub fn into_parts(self) -> (LiveSender, mpsc::Receiver<LiveEvent>, JoinHandle<()>) {
        (self.sender, self.events, self.io_task)
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Opens live connections. Implemented by the WebSocket transport and by
/// scripted fakes in tests.
#[async_trait]
pub trait LiveConnector: Send + Sync {
    async fn connect(&self, config: &LiveConfig, setup: SessionSetup)
    -> ClientResult<LiveConnection>;
}

/// Production connector speaking WebSocket to the live endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl LiveConnector for WsConnector {
    async fn connect(
        &self,
        config: &LiveConfig,
        setup: SessionSetup,
    ) -> ClientResult<LiveConnection> {
        let url = build_ws_url(config)?;

        // The URL carries the API key, only the host is loggable.
        tracing::debug!(host = url.host_str().unwrap_or("?"), "opening live socket");
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::ConnectError(e.to_string()))?;
        tracing::info!("live socket connected");

        let (mut ws_sink, ws_stream) = ws_stream.split();

        // Setup is the first frame; a failure here is a failed connect,
        // not a mid-session error.
        let setup_json = serde_json::to_string(&ClientMessage::Setup(setup))
            .map_err(|e| ClientError::ConnectError(format!("setup encode: {e}")))?;
        ws_sink
            .send(Message::Text(setup_json.into()))
            .await
            .map_err(|e| ClientError::ConnectError(e.to_string()))?;

        let (outbound_tx, outbound_rx) = mpsc::channel::<ClientMessage>(WS_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel::<LiveEvent>(WS_CHANNEL_CAPACITY);

        let io_task = tokio::spawn(run_io_loop(ws_sink, ws_stream, outbound_rx, events_tx));

        Ok(LiveConnection::new(outbound_tx, events_rx, io_task))
    }
}

/// Endpoint URL with the API key as a query parameter.
fn build_ws_url(config: &LiveConfig) -> ClientResult<Url> {
    let endpoint = config.endpoint.as_deref().unwrap_or(LIVE_ENDPOINT);
    let mut url = Url::parse(endpoint)
        .map_err(|e| ClientError::InvalidConfiguration(format!("endpoint: {e}")))?;
    url.query_pairs_mut().append_pair("key", &config.api_key);
    Ok(url)
}

type WsSink = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<TcpStream>>,
    Message,
>;
type WsStream = futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Single task owning both socket halves until either side goes away.
async fn run_io_loop(
    mut ws_sink: WsSink,
    mut ws_stream: WsStream,
    mut outbound_rx: mpsc::Receiver<ClientMessage>,
    events_tx: mpsc::Sender<LiveEvent>,
) {
    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => {
                match outgoing {
                    Some(message) => {
                        let json = match serde_json::to_string(&message) {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::error!(error = %e, "failed to serialize client message");
                                continue;
                            }
                        };
                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            tracing::warn!(error = %e, "websocket send failed");
                            let _ = events_tx.send(LiveEvent::Error(e.to_string())).await;
                            break;
                        }
                    }
                    // All senders dropped: close politely.
                    None => {
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            incoming = ws_stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(message) => {
                                if !forward_server_message(message, &events_tx).await {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "unparseable server frame");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                            tracing::warn!(error = %e, "failed to send pong");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "server closed the session");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "websocket receive failed");
                        let _ = events_tx.send(LiveEvent::Error(e.to_string())).await;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    let _ = events_tx.send(LiveEvent::Closed).await;
    tracing::debug!("live io task finished");
}

/// Translate one server frame into zero or more events, preserving order.
/// Returns `false` once the event receiver is gone.
pub(crate) async fn forward_server_message(
    message: ServerMessage,
    events: &mpsc::Sender<LiveEvent>,
) -> bool {
    let mut queue = Vec::new();

    if message.setup_complete.is_some() {
        queue.push(LiveEvent::Opened);
    }

    if let Some(content) = message.server_content {
        // Interruption precedes any audio that rode in the same frame.
        if content.interrupted == Some(true) {
            queue.push(LiveEvent::Interrupted);
        }
        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                if let Some(inline) = part.inline_data {
                    if inline.is_pcm_audio() {
                        match from_transport_text(&inline.data) {
                            Ok(bytes) => queue.push(LiveEvent::Audio {
                                data: Bytes::from(bytes),
                                sample_rate: inline.sample_rate(),
                            }),
                            Err(e) => {
                                tracing::warn!(error = %e, "dropping undecodable audio part");
                            }
                        }
                    } else {
                        tracing::debug!(mime = %inline.mime_type, "ignoring inline part");
                    }
                }
                if let Some(text) = part.text {
                    queue.push(LiveEvent::Text(text));
                }
            }
        }
        if content.turn_complete == Some(true) {
            queue.push(LiveEvent::TurnComplete);
        }
    }

    if let Some(batch) = message.tool_call {
        queue.push(LiveEvent::ToolCalls(batch.function_calls));
    }

    for event in queue {
        if events.send(event).await.is_err() {
            return false;
        }
    }
    true
}

// =============================================================================
// Tests
// =============================================================================

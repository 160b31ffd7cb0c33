use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::{net::TcpStream, sync::Mutex, task::JoinSet};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::{
    api::SlackWebClient,
    events::{EventContext, EventDispatcher, SlackEnvelope, SlackEvent},
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("socket connect failed: {0}")]
    Connect(String),
    #[error("socket receive failed: {0}")]
    Receive(String),
    #[error("envelope ack failed: {0}")]
    Acknowledge(String),
    #[error("socket close failed: {0}")]
    Disconnect(String),
    /// Slack rotates socket connections; reconnect right away.
    #[error("server requested reconnect: {0}")]
    Disconnected(String),
}

/// Retry budget for transport failures. Server-requested rotations do not
/// spend it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retry);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// `Ok(None)` means the stream ended and the runner should stop.
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

type WsConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket Mode over a websocket opened through `apps.connections.open`.
pub struct WebSocketTransport {
    web: Arc<SlackWebClient>,
    app_token: SecretString,
    connection: Mutex<Option<WsConnection>>,
}

impl WebSocketTransport {
    pub fn new(web: Arc<SlackWebClient>, app_token: SecretString) -> Self {
        Self { web, app_token, connection: Mutex::new(None) }
    }
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self
            .web
            .open_connection(&self.app_token)
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        *self.connection.lock().await = Some(stream);
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut guard = self.connection.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Err(TransportError::Receive("socket is not connected".to_owned()));
        };

        loop {
            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Some(envelope) = envelope_from_frame(&text)? {
                        return Ok(Some(envelope));
                    }
                }
                Some(Ok(WsMessage::Ping(payload))) => {
                    stream
                        .send(WsMessage::Pong(payload))
                        .await
                        .map_err(|error| TransportError::Receive(error.to_string()))?;
                }
                Some(Ok(WsMessage::Close(_))) => {
                    *guard = None;
                    return Err(TransportError::Disconnected("closed by server".to_owned()));
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    *guard = None;
                    return Err(TransportError::Receive(error.to_string()));
                }
                None => {
                    *guard = None;
                    return Err(TransportError::Disconnected("stream ended".to_owned()));
                }
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut guard = self.connection.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Err(TransportError::Acknowledge("socket is not connected".to_owned()));
        };
        let ack = json!({ "envelope_id": envelope_id }).to_string();
        stream
            .send(WsMessage::Text(ack))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(mut stream) = self.connection.lock().await.take() else {
            return Ok(());
        };
        stream.close(None).await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}

#[derive(Deserialize)]
struct SocketFrame {
    #[serde(rename = "type")]
    frame_type: String,
    envelope_id: Option<String>,
    payload: Option<Value>,
    reason: Option<String>,
}

/// Decodes one Socket Mode text frame.
///
/// `hello` and unparseable frames yield `Ok(None)`. Any frame carrying an
/// `envelope_id` yields an envelope so it gets acknowledged, even when the
/// payload is not an Events API callback.
pub fn envelope_from_frame(text: &str) -> Result<Option<SlackEnvelope>, TransportError> {
    let frame: SocketFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(error) => {
            warn!(error = %error, "failed to parse socket mode frame");
            return Ok(None);
        }
    };

    match (frame.frame_type.as_str(), frame.envelope_id) {
        ("hello", _) => {
            debug!(event_name = "ingress.slack.hello", "socket mode connection ready");
            Ok(None)
        }
        ("disconnect", _) => Err(TransportError::Disconnected(
            frame.reason.unwrap_or_else(|| "unspecified".to_owned()),
        )),
        ("events_api", Some(envelope_id)) => {
            let event = frame
                .payload
                .as_ref()
                .and_then(|payload| payload.get("event"))
                .map(SlackEvent::from_event_json)
                .unwrap_or_else(|| SlackEvent::Unsupported { event_type: "events_api".to_owned() });
            Ok(Some(SlackEnvelope { envelope_id, event }))
        }
        (frame_type, Some(envelope_id)) => Ok(Some(SlackEnvelope {
            envelope_id,
            event: SlackEvent::Unsupported { event_type: frame_type.to_owned() },
        })),
        (frame_type, None) => {
            debug!(frame_type, "ignoring socket mode frame without envelope");
            Ok(None)
        }
    }
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: Arc<EventDispatcher>,
    policy: ReconnectPolicy,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher: Arc::new(dispatcher), policy }
    }

    /// Runs until the transport stream ends or reconnect retries are exhausted.
    /// Envelopes are acknowledged before dispatch, and each dispatch runs as its
    /// own task so a slow model call never blocks the socket.
    pub async fn start(&self) -> Result<()> {
        let mut in_flight = JoinSet::new();
        let mut retries = 0;

        loop {
            let error = match self.run_session(retries, &mut in_flight).await {
                Ok(()) => break,
                Err(error) => error,
            };

            if let TransportError::Disconnected(reason) = &error {
                info!(
                    event_name = "ingress.slack.reconnect",
                    reason = %reason,
                    "slack rotated the socket; opening a fresh one"
                );
                retries = 0;
                continue;
            }

            if retries >= self.policy.max_retries {
                error!(
                    event_name = "ingress.slack.gave_up",
                    retries,
                    error = %error,
                    "socket unavailable after all retries; staying up without ingress"
                );
                break;
            }

            let delay = self.policy.backoff(retries);
            warn!(
                event_name = "ingress.slack.retry",
                retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "socket session failed; retrying"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            retries += 1;
        }

        while let Some(finished) = in_flight.join_next().await {
            if let Err(join_error) = finished {
                error!(error = %join_error, "conversation task panicked");
            }
        }
        Ok(())
    }

    async fn run_session(
        &self,
        retries: u32,
        in_flight: &mut JoinSet<()>,
    ) -> Result<(), TransportError> {
        debug!(retries, "connecting to socket mode");
        self.transport.connect().await?;
        info!(event_name = "ingress.slack.connected", retries, "socket mode session open");

        loop {
            while in_flight.try_join_next().is_some() {}

            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(event_name = "ingress.slack.closed", "socket mode stream ended");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let channel_id = envelope.event.channel_id().unwrap_or("unknown").to_owned();
            let thread_ts = envelope.event.thread_ts().unwrap_or("unknown").to_owned();

            info!(
                event_name = "ingress.slack.envelope",
                correlation_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                channel_id = %channel_id,
                thread_ts = %thread_ts,
                "envelope received"
            );

            match self.transport.acknowledge(&envelope.envelope_id).await {
                Ok(()) => debug!(correlation_id = %envelope.envelope_id, "envelope acknowledged"),
                Err(ack_error) => warn!(
                    event_name = "ingress.slack.ack_failed",
                    correlation_id = %envelope.envelope_id,
                    error = %ack_error,
                    "envelope ack failed; dispatching anyway"
                ),
            }

            let dispatcher = self.dispatcher.clone();
            in_flight.spawn(async move {
                let context = EventContext { correlation_id: envelope.envelope_id.clone() };
                if let Err(dispatch_error) = dispatcher.dispatch(&envelope, &context).await {
                    warn!(
                        event_name = "ingress.slack.dispatch_failed",
                        correlation_id = %envelope.envelope_id,
                        channel_id = %channel_id,
                        thread_ts = %thread_ts,
                        error = %dispatch_error,
                        "conversation handler failed"
                    );
                }
            });
        }
    }
}

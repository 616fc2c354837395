//! Duplex transport seam and the WebSocket implementation.
//!
//! DESIGN
//! ======
//! A transport is a pair of channels. The session writes [`frames::Frame`]s
//! into `outbound` and reads [`Inbound`] events from `inbound`. Closure is
//! signalled by `inbound` ending; dropping every `outbound` sender asks the
//! transport to close. Tests swap [`WsConnector`] for an in-memory fake.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tracing::{debug, warn};

use crate::credential::Credential;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket connect failed: {0}")]
    WsConnect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue),
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// One event read off the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Frame(frames::Frame),
    /// Bytes arrived that do not decode as a frame.
    Malformed(String),
}

/// An open transport.
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<frames::Frame>,
    pub inbound: mpsc::UnboundedReceiver<Inbound>,
}

/// Opens transports for the connection manager.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport to `endpoint`, presenting `credential` at connect time.
    async fn open(&self, endpoint: &str, credential: &Credential) -> Result<TransportLink, TransportError>;
}

/// `host[:port]` part of an endpoint URL, for the STOMP `host` header.
pub(crate) fn endpoint_host(endpoint: &str) -> &str {
    let rest = endpoint.split_once("://").map_or(endpoint, |(_, rest)| rest);
    rest.split(['/', '?']).next().unwrap_or(rest)
}

/// STOMP-over-WebSocket connector built on `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, endpoint: &str, credential: &Credential) -> Result<TransportLink, TransportError> {
        let mut request = endpoint
            .into_client_request()
            .map_err(|error| TransportError::WsConnect(Box::new(error)))?;
        request
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_str(&credential.bearer_header())?);

        let (stream, _) = connect_async(request)
            .await
            .map_err(|error| TransportError::WsConnect(Box::new(error)))?;
        let (mut sink, mut source) = stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<frames::Frame>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Inbound>();

        // Writer: runs until every sender is dropped or the socket rejects a write.
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let text = frames::encode_frame(&frame);
                if let Err(error) = sink.send(Message::Text(text.into())).await {
                    debug!(error = %error, "transport: write failed");
                    break;
                }
            }
            if let Err(error) = sink.close().await {
                debug!(error = %error, "transport: close failed");
            }
        });

        // Reader: ends (closing `inbound`) on close frame, socket error, or receiver drop.
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text.as_str().to_owned(),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => text,
                        Err(error) => {
                            if inbound_tx.send(Inbound::Malformed(error.to_string())).is_err() {
                                break;
                            }
                            continue;
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(error) => {
                        warn!(error = %error, "transport: read failed");
                        break;
                    }
                };
                if frames::is_heartbeat(&text) {
                    continue;
                }
                let event = match frames::decode_frame(&text) {
                    Ok(frame) => Inbound::Frame(frame),
                    Err(error) => Inbound::Malformed(error.to_string()),
                };
                if inbound_tx.send(event).is_err() {
                    break;
                }
            }
        });

        Ok(TransportLink { outbound: outbound_tx, inbound: inbound_rx })
    }
}

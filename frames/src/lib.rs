//! Shared frame model and STOMP 1.2 text codec for the live board channel.
//!
//! This crate owns the wire representation used by the sync core, its test
//! brokers, and the CLI. Frame bodies stay opaque strings; the board payload
//! (a JSON element array) is parsed one layer up.
//!
//! WIRE SHAPE
//! ==========
//! ```text
//! COMMAND\n
//! name:value\n        (zero or more, escaped except on CONNECT/CONNECTED)
//! \n
//! body\0
//! ```

use serde::{Deserialize, Serialize};

pub const ACCEPT_VERSION: &str = "accept-version";
pub const AUTHORIZATION: &str = "Authorization";
pub const CONTENT_LENGTH: &str = "content-length";
pub const CONTENT_TYPE: &str = "content-type";
pub const DESTINATION: &str = "destination";
pub const HEART_BEAT: &str = "heart-beat";
pub const HOST: &str = "host";
pub const ID: &str = "id";
pub const MESSAGE: &str = "message";
pub const MESSAGE_ID: &str = "message-id";
pub const RECEIPT: &str = "receipt";
pub const RECEIPT_ID: &str = "receipt-id";
pub const SUBSCRIPTION: &str = "subscription";
pub const VERSION: &str = "version";

/// Protocol version this codec speaks.
pub const STOMP_VERSION: &str = "1.2";

/// Error returned by [`decode_frame`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Input held nothing but end-of-line padding.
    #[error("empty frame")]
    Empty,
    /// The command line is not a STOMP command this codec knows.
    #[error("unknown frame command: {0}")]
    UnknownCommand(String),
    /// A header line has no `:` separator.
    #[error("malformed header line: {0}")]
    MalformedHeader(String),
    /// A header contains a backslash escape outside the STOMP set.
    #[error("invalid header escape in: {0}")]
    InvalidEscape(String),
    /// The frame ended before the blank line closing the header block.
    #[error("frame truncated before end of headers")]
    Truncated,
    /// No NUL terminator after the body.
    #[error("frame body is missing its NUL terminator")]
    MissingNull,
    /// `content-length` is unparsable or points past the input.
    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),
    /// Non-EOL bytes follow the NUL terminator.
    #[error("unexpected data after frame terminator")]
    TrailingData,
}

/// STOMP commands used by the board channel, client and broker side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
            Self::Disconnect => "DISCONNECT",
        }
    }

    fn parse(raw: &str) -> Result<Self, CodecError> {
        match raw {
            "CONNECT" | "STOMP" => Ok(Self::Connect),
            "CONNECTED" => Ok(Self::Connected),
            "SEND" => Ok(Self::Send),
            "SUBSCRIBE" => Ok(Self::Subscribe),
            "UNSUBSCRIBE" => Ok(Self::Unsubscribe),
            "MESSAGE" => Ok(Self::Message),
            "RECEIPT" => Ok(Self::Receipt),
            "ERROR" => Ok(Self::Error),
            "DISCONNECT" => Ok(Self::Disconnect),
            other => Err(CodecError::UnknownCommand(other.to_owned())),
        }
    }

    /// CONNECT and CONNECTED headers are sent verbatim for 1.0 compatibility.
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single frame on the live channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub command: Command,
    /// Headers in wire order. Repeated names are legal; the first one wins.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self { command, headers: Vec::new(), body: String::new() }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Value of the first header named `name`.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Client handshake. `authorization` is the full header value, e.g. `Bearer abc`.
    #[must_use]
    pub fn connect(host: &str, authorization: Option<&str>) -> Self {
        let frame = Self::new(Command::Connect)
            .with_header(ACCEPT_VERSION, STOMP_VERSION)
            .with_header(HOST, host)
            .with_header(HEART_BEAT, "0,0");
        match authorization {
            Some(value) => frame.with_header(AUTHORIZATION, value),
            None => frame,
        }
    }

    #[must_use]
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .with_header(ID, id)
            .with_header(DESTINATION, destination)
    }

    #[must_use]
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).with_header(ID, id)
    }

    /// Publish a JSON body to `destination`.
    #[must_use]
    pub fn send(destination: &str, body: impl Into<String>, authorization: Option<&str>) -> Self {
        let frame = Self::new(Command::Send)
            .with_header(DESTINATION, destination)
            .with_header(CONTENT_TYPE, "application/json");
        let frame = match authorization {
            Some(value) => frame.with_header(AUTHORIZATION, value),
            None => frame,
        };
        frame.with_body(body)
    }

    #[must_use]
    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    /// Broker handshake acknowledgment.
    #[must_use]
    pub fn connected(version: &str) -> Self {
        Self::new(Command::Connected)
            .with_header(VERSION, version)
            .with_header(HEART_BEAT, "0,0")
    }

    /// Broker delivery of `body` to one subscription.
    #[must_use]
    pub fn message(destination: &str, subscription: &str, message_id: &str, body: impl Into<String>) -> Self {
        Self::new(Command::Message)
            .with_header(DESTINATION, destination)
            .with_header(SUBSCRIPTION, subscription)
            .with_header(MESSAGE_ID, message_id)
            .with_header(CONTENT_TYPE, "application/json")
            .with_body(body)
    }

    /// Broker-side error with a short `message` header and a longer body.
    #[must_use]
    pub fn error(message: &str, detail: impl Into<String>) -> Self {
        Self::new(Command::Error)
            .with_header(MESSAGE, message)
            .with_header(CONTENT_TYPE, "text/plain")
            .with_body(detail)
    }
}

/// True when `text` is a heart-beat (end-of-line padding only).
#[must_use]
pub fn is_heartbeat(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c == '\n' || c == '\r')
}

/// Encode a frame into its wire text, NUL terminator included.
#[must_use]
pub fn encode_frame(frame: &Frame) -> String {
    let escape = frame.command.escapes_headers();
    let mut out = String::with_capacity(frame.body.len() + 64);
    out.push_str(frame.command.as_str());
    out.push('\n');

    for (name, value) in &frame.headers {
        if escape {
            push_escaped(&mut out, name);
            out.push(':');
            push_escaped(&mut out, value);
        } else {
            out.push_str(name);
            out.push(':');
            out.push_str(value);
        }
        out.push('\n');
    }
    if !frame.body.is_empty() && frame.header(CONTENT_LENGTH).is_none() {
        out.push_str(CONTENT_LENGTH);
        out.push(':');
        out.push_str(&frame.body.len().to_string());
        out.push('\n');
    }

    out.push('\n');
    out.push_str(&frame.body);
    out.push('\0');
    out
}

/// Decode one frame from wire text.
///
/// # Errors
///
/// Returns a [`CodecError`] describing the first structural problem found.
pub fn decode_frame(text: &str) -> Result<Frame, CodecError> {
    let mut rest = text.trim_start_matches(['\r', '\n']);
    if rest.is_empty() {
        return Err(CodecError::Empty);
    }

    let command = Command::parse(take_line(&mut rest)?)?;
    let escape = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let line = take_line(&mut rest)?;
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(CodecError::MalformedHeader(line.to_owned()));
        };
        if escape {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_owned(), value.to_owned()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(key, _)| key == CONTENT_LENGTH)
        .map(|(_, value)| value.as_str());

    let (body, trailer) = match content_length {
        Some(raw) => {
            let len = raw
                .trim()
                .parse::<usize>()
                .map_err(|_| CodecError::InvalidContentLength(raw.to_owned()))?;
            let body = rest
                .get(..len)
                .ok_or_else(|| CodecError::InvalidContentLength(raw.to_owned()))?;
            let trailer = rest[len..]
                .strip_prefix('\0')
                .ok_or(CodecError::MissingNull)?;
            (body, trailer)
        }
        None => {
            let end = rest.find('\0').ok_or(CodecError::MissingNull)?;
            (&rest[..end], &rest[end + 1..])
        }
    };

    if !trailer.chars().all(|c| c == '\n' || c == '\r') {
        return Err(CodecError::TrailingData);
    }

    Ok(Frame { command, headers, body: body.to_owned() })
}

fn take_line<'a>(rest: &mut &'a str) -> Result<&'a str, CodecError> {
    let Some(end) = rest.find('\n') else {
        return Err(CodecError::Truncated);
    };
    let line = &rest[..end];
    *rest = &rest[end + 1..];
    Ok(line.strip_suffix('\r').unwrap_or(line))
}

fn push_escaped(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String, CodecError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(CodecError::InvalidEscape(raw.to_owned())),
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;

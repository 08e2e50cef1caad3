//! STOMP 1.2 transport
//!
//! One short-lived connection per publish:
//! CONNECT → CONNECTED → SEND (with receipt) → RECEIPT → DISCONNECT.
//! A RECEIPT means the broker has taken the message; it says nothing about
//! the worker.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::MessageTransport;
use crate::config::MessagingConfig;

#[derive(Debug, Error)]
pub enum StompError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body = body.to_vec();
        self
    }

    /// First value for `name` (repeated headers: first one wins)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    // CONNECT and CONNECTED predate header escaping
    fn escapes_headers(&self) -> bool {
        !matches!(self.command.as_str(), "CONNECT" | "CONNECTED")
    }

    pub fn encode(&self) -> Vec<u8> {
        let escape = self.escapes_headers();
        let mut out = Vec::with_capacity(64 + self.body.len());
        out.extend_from_slice(self.command.as_bytes());
        out.push(b'\n');
        for (name, value) in &self.headers {
            if escape {
                out.extend_from_slice(escape_header(name).as_bytes());
                out.push(b':');
                out.extend_from_slice(escape_header(value).as_bytes());
            } else {
                out.extend_from_slice(name.as_bytes());
                out.push(b':');
                out.extend_from_slice(value.as_bytes());
            }
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(0);
        out
    }

    /// Parse a frame without its trailing NUL
    ///
    /// Leading end-of-line bytes (heart-beats) are skipped.
    pub fn parse(bytes: &[u8]) -> Result<Frame, StompError> {
        let start = bytes
            .iter()
            .position(|b| *b != b'\n' && *b != b'\r')
            .ok_or_else(|| StompError::Protocol("empty frame".to_string()))?;
        let bytes = &bytes[start..];

        let header_end = find_blank_line(bytes)
            .ok_or_else(|| StompError::Protocol("missing header terminator".to_string()))?;
        let head = std::str::from_utf8(&bytes[..header_end.0])
            .map_err(|e| StompError::Protocol(format!("non UTF-8 headers: {}", e)))?;
        let body = &bytes[header_end.1..];

        let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
        let command = lines
            .next()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| StompError::Protocol("missing command".to_string()))?
            .to_string();

        let mut frame = Frame::new(&command);
        let unescape = frame.escapes_headers();
        for line in lines.filter(|l| !l.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| StompError::Protocol(format!("malformed header '{}'", line)))?;
            if unescape {
                frame
                    .headers
                    .push((unescape_header(name)?, unescape_header(value)?));
            } else {
                frame.headers.push((name.to_string(), value.to_string()));
            }
        }

        frame.body = match frame.get("content-length") {
            Some(len) => {
                let len: usize = len
                    .parse()
                    .map_err(|_| StompError::Protocol(format!("bad content-length '{}'", len)))?;
                if len > body.len() {
                    return Err(StompError::Protocol("body shorter than content-length".to_string()));
                }
                body[..len].to_vec()
            }
            None => body.to_vec(),
        };
        Ok(frame)
    }
}

/// Returns (end of headers, start of body)
fn find_blank_line(bytes: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\n' {
            if bytes.get(i + 1) == Some(&b'\n') {
                return Some((i, i + 2));
            }
            if bytes.get(i + 1) == Some(&b'\r') && bytes.get(i + 2) == Some(&b'\n') {
                return Some((i, i + 3));
            }
        }
        i += 1;
    }
    None
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String, StompError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
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
            other => {
                return Err(StompError::Protocol(format!(
                    "undefined escape sequence '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

/// Read one NUL-terminated frame
///
/// Frames with NUL bytes inside the body are not supported; the broker only
/// sends us bodiless control frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, StompError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut buf = Vec::new();
        let n = reader.read_until(0, &mut buf).await?;
        if n == 0 {
            return Err(StompError::Protocol("connection closed by broker".to_string()));
        }
        if buf.last() == Some(&0) {
            buf.pop();
        }
        // Bare heart-beats between frames
        if buf.iter().all(|b| *b == b'\n' || *b == b'\r') {
            continue;
        }
        return Frame::parse(&buf);
    }
}

/// Publishes over a STOMP broker
pub struct StompTransport {
    config: MessagingConfig,
    next_receipt: AtomicU64,
}

impl StompTransport {
    pub fn new(config: MessagingConfig) -> Self {
        Self {
            config,
            next_receipt: AtomicU64::new(1),
        }
    }

    fn connect_frame(&self) -> Frame {
        let host = self.config.vhost.as_deref().unwrap_or(&self.config.host);
        let mut frame = Frame::new("CONNECT")
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", "0,0");
        if let Some(login) = &self.config.login {
            frame = frame.header("login", login);
        }
        if let Some(passcode) = &self.config.passcode {
            frame = frame.header("passcode", passcode);
        }
        frame
    }

    async fn send(
        &self,
        destination: &str,
        body: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<(), StompError> {
        let limit = self.config.connect_timeout();

        let stream = timeout(limit, TcpStream::connect(self.config.address()))
            .await
            .map_err(|_| StompError::Timeout("connection"))??;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        write_half.write_all(&self.connect_frame().encode()).await?;
        let connected = reply(&mut reader, limit, "CONNECTED").await?;
        expect_command(&connected, "CONNECTED")?;

        let receipt = format!("ingest-{}", self.next_receipt.fetch_add(1, Ordering::Relaxed));
        let mut send = Frame::new("SEND")
            .header("destination", destination)
            .header("content-type", "text/plain;charset=utf-8")
            .header("content-length", &body.len().to_string())
            .header("receipt", &receipt);
        for (name, value) in headers {
            send = send.header(name, value);
        }
        write_half
            .write_all(&send.with_body(body.as_bytes()).encode())
            .await?;

        let ack = reply(&mut reader, limit, "RECEIPT").await?;
        expect_command(&ack, "RECEIPT")?;
        if ack.get("receipt-id") != Some(receipt.as_str()) {
            return Err(StompError::Protocol(format!(
                "receipt mismatch: expected {}, got {:?}",
                receipt,
                ack.get("receipt-id")
            )));
        }

        // Message is already accepted; a failed goodbye changes nothing
        if let Err(e) = write_half.write_all(&Frame::new("DISCONNECT").encode()).await {
            debug!(error = %e, "STOMP DISCONNECT failed");
        }
        let _ = write_half.shutdown().await;
        Ok(())
    }
}

async fn reply<R>(reader: &mut R, limit: Duration, waiting_for: &'static str) -> Result<Frame, StompError>
where
    R: AsyncBufRead + Unpin,
{
    timeout(limit, read_frame(reader))
        .await
        .map_err(|_| StompError::Timeout(waiting_for))?
}

fn expect_command(frame: &Frame, expected: &str) -> Result<(), StompError> {
    if frame.command == expected {
        return Ok(());
    }
    if frame.command == "ERROR" {
        return Err(StompError::Broker(
            frame.get("message").unwrap_or("unspecified").to_string(),
        ));
    }
    Err(StompError::Protocol(format!(
        "expected {}, got {}",
        expected, frame.command
    )))
}

#[async_trait]
impl MessageTransport for StompTransport {
    async fn publish(&self, topic: &str, body: &str, headers: &BTreeMap<String, String>) -> bool {
        let destination = self.config.destination(topic);
        match self.send(&destination, body, headers).await {
            Ok(()) => {
                debug!(topic, destination = %destination, "Message accepted by broker");
                true
            }
            Err(e) => {
                warn!(
                    topic,
                    destination = %destination,
                    broker = %self.config.address(),
                    error = %e,
                    "Failed to publish message"
                );
                false
            }
        }
    }
}

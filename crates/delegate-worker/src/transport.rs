//! Transport Layer for the worker session
//!
//! Abstracts the coordinator connection for testability. Provides:
//! - Transport trait: message-oriented, blocking send/receive
//! - WebSocketTransport: one JSON payload per websocket message (production)
//!
//! An in-process scripted coordinator lives in [`crate::mock`].

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use delegate_protocol::{decode_frame, encode_frame, FrameError, Message};
use tracing::{debug, info};
use tungstenite::handshake::HandshakeError;
use tungstenite::{Message as WsMessage, WebSocket};

/// How long `close()` waits for the coordinator to acknowledge.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Transport trait for coordinator communication
pub trait Transport {
    /// Send one message. Returns once the whole frame was written.
    fn send(&mut self, message: &Message) -> TransportResult<()>;

    /// Block until the next message arrives. `Ok(None)` means the peer
    /// closed the connection cleanly.
    fn recv(&mut self) -> TransportResult<Option<Message>>;

    /// Close the connection. Closing twice is a no-op.
    fn close(&mut self) -> TransportResult<()>;
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection to {endpoint} failed: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("handshake rejected: {0}")]
    Handshake(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("transport is closed")]
    Closed,
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Where and how to reach the coordinator.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Resource path requested in the websocket handshake.
    pub resource: String,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, resource: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            resource: resource.into(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `ws://host:port/resource`, bracketing IPv6 literals.
    pub fn url(&self) -> String {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let slash = if self.resource.starts_with('/') { "" } else { "/" };
        format!("ws://{}:{}{}{}", host, self.port, slash, self.resource)
    }
}

/// Websocket client connection to the coordinator.
pub struct WebSocketTransport {
    socket: WebSocket<TcpStream>,
    closed: bool,
}

impl WebSocketTransport {
    /// Connect to `endpoint`, trying each resolved address in turn, and
    /// perform the websocket handshake. Both steps are bounded by
    /// `connect_timeout`.
    pub fn connect(endpoint: &Endpoint, connect_timeout: Duration) -> TransportResult<Self> {
        let address = endpoint.address();
        let candidates = address
            .to_socket_addrs()
            .map_err(|e| TransportError::ConnectionFailed {
                endpoint: address.clone(),
                reason: e.to_string(),
            })?;

        let mut last_error = String::from("no addresses resolved");
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, connect_timeout) {
                Ok(stream) => {
                    info!(endpoint = %address, peer = %candidate, "connected to coordinator");
                    return Self::handshake(stream, endpoint, connect_timeout);
                }
                Err(e) => {
                    debug!(peer = %candidate, error = %e, "connect attempt failed");
                    last_error = e.to_string();
                }
            }
        }

        Err(TransportError::ConnectionFailed {
            endpoint: address,
            reason: last_error,
        })
    }

    fn handshake(stream: TcpStream, endpoint: &Endpoint, timeout: Duration) -> TransportResult<Self> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        let url = endpoint.url();
        let (socket, response) = tungstenite::client::client(url.as_str(), stream).map_err(|e| match e {
            HandshakeError::Failure(tungstenite::Error::Http(response)) => {
                TransportError::Handshake(format!("coordinator answered {}", response.status()))
            }
            HandshakeError::Failure(e) => TransportError::Handshake(e.to_string()),
            HandshakeError::Interrupted(_) => {
                TransportError::Handshake(format!("no handshake response within {:?}", timeout))
            }
        })?;

        // Session reads wait on the coordinator for as long as it takes.
        socket.get_ref().set_read_timeout(None)?;
        socket.get_ref().set_write_timeout(None)?;
        debug!(url = %url, status = %response.status(), "websocket handshake complete");
        Ok(Self {
            socket,
            closed: false,
        })
    }

    /// Decode one payload; empty payloads yield `None`.
    fn decode(payload: &[u8]) -> TransportResult<Option<Message>> {
        match decode_frame(payload) {
            Ok(message) => Ok(Some(message)),
            Err(FrameError::Empty) => {
                debug!("skipping empty frame");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Transport for WebSocketTransport {
    fn send(&mut self, message: &Message) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        debug!(kind = message.kind(), "sending message");
        let payload = encode_frame(message)?;
        self.socket.send(WsMessage::Binary(payload))?;
        Ok(())
    }

    fn recv(&mut self) -> TransportResult<Option<Message>> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        loop {
            let decoded = match self.socket.read() {
                Ok(WsMessage::Binary(payload)) => Self::decode(&payload)?,
                Ok(WsMessage::Text(text)) => Self::decode(text.as_bytes())?,
                Ok(WsMessage::Close(frame)) => {
                    debug!(?frame, "coordinator closed the connection");
                    return Ok(None);
                }
                // ping/pong are answered by tungstenite itself
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            if let Some(message) = decoded {
                debug!(kind = message.kind(), "received message");
                return Ok(Some(message));
            }
        }
    }

    fn close(&mut self) -> TransportResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.socket.get_ref().set_read_timeout(Some(CLOSE_TIMEOUT)).ok();

        match self.socket.close(None) {
            Ok(()) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                return Ok(())
            }
            Err(e) => return Err(e.into()),
        }

        // Drain until the coordinator acknowledges the close.
        loop {
            match self.socket.read() {
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed) => return Ok(()),
                Err(e) => {
                    debug!(error = %e, "close handshake not completed");
                    return Ok(());
                }
            }
        }
    }
}

//! WebSocket Transport Tests
//!
//! Runs worker sessions over a real websocket connection against a
//! coordinator thread.

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use delegate_protocol::{
    decode_frame, encode_frame, BootstrapCode, BootstrapRequest, BootstrapResponse, Message,
    RegistrationRequest, RegistrationResponse,
};
use delegate_worker::mock::ScriptedLauncher;
use delegate_worker::{Endpoint, SessionOutcome, WebSocketTransport, WorkerConfig, WorkerSession};
use tempfile::TempDir;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::{Message as WsMessage, WebSocket};

struct Peer {
    socket: WebSocket<TcpStream>,
    path: String,
}

impl Peer {
    fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = listener.accept().unwrap();
        let mut path = String::new();
        let record = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            path = request.uri().path().to_string();
            Ok(response)
        };
        let socket = tungstenite::accept_hdr(stream, record).unwrap();
        Self { socket, path }
    }

    /// Next data message, or `None` once the worker has closed.
    fn next(&mut self) -> Option<Message> {
        loop {
            match self.socket.read() {
                Ok(WsMessage::Binary(payload)) => return Some(decode_frame(&payload).unwrap()),
                Ok(WsMessage::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    fn send(&mut self, message: impl Into<Message>) {
        let payload = encode_frame(&message.into()).unwrap();
        self.socket.send(WsMessage::Binary(payload)).unwrap();
    }

    fn send_empty(&mut self) {
        self.socket.send(WsMessage::Binary(Vec::new())).unwrap();
    }
}

fn listen() -> (TcpListener, Endpoint) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, Endpoint::new("127.0.0.1", port, "/ws"))
}

fn worker_config(root: &std::path::Path) -> WorkerConfig {
    let mut config = WorkerConfig::default();
    config.workspace_root = root.to_path_buf();
    config
}

#[test]
fn test_rejected_registration_over_websocket() {
    let (listener, endpoint) = listen();
    let coordinator = thread::spawn(move || {
        let mut peer = Peer::accept(&listener);
        let registration = peer.next();
        peer.send(RegistrationResponse::rejected(9, "draining"));
        // worker must hang up without sending anything else
        let trailing = peer.next();
        (peer.path, registration, trailing)
    });

    let temp = TempDir::new().unwrap();
    let transport = WebSocketTransport::connect(&endpoint, Duration::from_secs(5)).unwrap();
    let mut session = WorkerSession::new(
        transport,
        Arc::new(ScriptedLauncher::new()),
        &worker_config(temp.path()),
    );
    let outcome = session.run().unwrap();
    assert_eq!(outcome, SessionOutcome::RegistrationRejected { code: 9 });

    let (path, registration, trailing) = coordinator.join().unwrap();
    assert_eq!(path, "/ws");
    assert_eq!(registration, Some(Message::from(RegistrationRequest { version: 1 })));
    assert!(trailing.is_none());
}

#[test]
fn test_bad_url_over_websocket_with_leading_empty_frames() {
    let (listener, endpoint) = listen();
    let coordinator = thread::spawn(move || {
        let mut peer = Peer::accept(&listener);
        let _registration = peer.next();
        peer.send_empty();
        peer.send_empty();
        peer.send(RegistrationResponse::accepted());
        peer.send(BootstrapRequest::new("noslasheshere", "abc123"));
        let response = peer.next();
        let trailing = peer.next();
        (response, trailing)
    });

    let temp = TempDir::new().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new());
    let transport = WebSocketTransport::connect(&endpoint, Duration::from_secs(5)).unwrap();
    let mut session = WorkerSession::new(transport, launcher.clone(), &worker_config(temp.path()));
    let outcome = session.run().unwrap();

    assert_eq!(
        outcome,
        SessionOutcome::BootstrapFailed {
            code: BootstrapCode::BadUrl
        }
    );
    let (response, trailing) = coordinator.join().unwrap();
    assert_eq!(
        response,
        Some(Message::from(BootstrapResponse::new(BootstrapCode::BadUrl)))
    );
    assert!(trailing.is_none());
    assert_eq!(launcher.spawn_count(), 0);
}

//! Loopback peer harness
//!
//! [`PeerSocket`] plays the remote application over a plain blocking
//! `TcpStream`, so tests exercise the service's real socket handling.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use datalink_core::{ChannelLayout, LinkError, LinkId, LinkResult, OpCode};
use datalink_runtime::{init_test_tracing, LinkConfig, LinkService, SceneAdapter, StartMode};
use datalink_wire::{
    Hello, JsonPayload, Message, MessageHeader, Notify, PoseRecord, TemplatePayload, HEADER_SIZE,
};

/// How long any harness wait may take before failing
pub const WAIT: Duration = Duration::from_secs(5);

/// Elapsed time fed to each harness tick
pub const TICK: Duration = Duration::from_millis(5);

/// Service config for tests: server on an ephemeral port.
///
/// Also installs the test log subscriber.
pub fn test_config() -> LinkConfig {
    init_test_tracing();
    let mut config = LinkConfig::default();
    config.listen_port = 0;
    config.start_mode = StartMode::ServerOnly;
    config.tick_interval = TICK;
    config.identity.path = "/tmp/datalink".to_string();
    config
}

/// Identity the harness peer announces
pub fn peer_hello(application: &str) -> Hello {
    Hello {
        application: application.to_string(),
        version: "4.1".to_string(),
        path: "/tmp/peer".to_string(),
        exe: "peer".to_string(),
    }
}

/// A port nothing is listening on
pub fn closed_port() -> LinkResult<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

/// Tick `service` until `done` holds. Returns false on timeout.
pub fn pump<S, F>(service: &mut LinkService<S>, mut done: F) -> bool
where
    S: SceneAdapter,
    F: FnMut(&LinkService<S>) -> bool,
{
    let deadline = Instant::now() + WAIT;
    loop {
        if done(service) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        if service.tick(TICK) > Duration::ZERO {
            thread::sleep(Duration::from_millis(1));
        }
    }
}

/// Remote end of a link under test
#[derive(Debug)]
pub struct PeerSocket {
    stream: TcpStream,
}

impl PeerSocket {
    pub fn connect(addr: SocketAddr) -> LinkResult<Self> {
        let stream = TcpStream::connect(("127.0.0.1", addr.port()))?;
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: TcpStream) -> LinkResult<Self> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(WAIT))?;
        Ok(PeerSocket { stream })
    }

    /// Write raw bytes as-is
    pub fn send_raw(&mut self, bytes: &[u8]) -> LinkResult<()> {
        self.stream.write_all(bytes)?;
        Ok(())
    }

    pub fn send(&mut self, message: &Message) -> LinkResult<()> {
        tracing::trace!(opcode = message.opcode, len = message.payload.len(), "peer send");
        self.send_raw(&message.encode())
    }

    pub fn send_op(&mut self, opcode: OpCode, payload: Vec<u8>) -> LinkResult<()> {
        self.send(&Message::new(opcode, payload))
    }

    pub fn send_json<P: JsonPayload>(&mut self, opcode: OpCode, payload: &P) -> LinkResult<()> {
        self.send_op(opcode, payload.to_payload()?)
    }

    /// Block for the next complete message
    pub fn recv(&mut self) -> LinkResult<Message> {
        let mut header = [0u8; HEADER_SIZE];
        self.stream.read_exact(&mut header)?;
        let header = MessageHeader::parse(&header)?;

        let mut payload = vec![0u8; header.length as usize];
        self.stream.read_exact(&mut payload)?;
        tracing::trace!(opcode = header.opcode, len = payload.len(), "peer recv");
        Ok(Message {
            opcode: header.opcode,
            payload,
        })
    }

    /// Next message, which must carry `opcode`
    pub fn expect(&mut self, opcode: OpCode) -> LinkResult<Message> {
        let message = self.recv()?;
        if message.opcode != opcode.to_u32() {
            return Err(LinkError::MalformedPayload(format!(
                "expected {opcode}, got opcode {}",
                message.opcode
            )));
        }
        Ok(message)
    }

    pub fn expect_json<P: JsonPayload>(&mut self, opcode: OpCode) -> LinkResult<P> {
        let message = self.expect(opcode)?;
        P::from_payload(&message.payload)
    }

    /// Next pose record, decoded against the layouts in `templates`
    pub fn expect_pose(&mut self, opcode: OpCode, templates: &TemplatePayload) -> LinkResult<PoseRecord> {
        let message = self.expect(opcode)?;
        PoseRecord::decode(&message.payload, |id: &LinkId| layout_of(templates, id))
    }

    /// True once the service has closed its end
    pub fn is_closed(&mut self) -> bool {
        let mut byte = [0u8; 1];
        matches!(self.stream.read(&mut byte), Ok(0))
    }
}

/// Layout of `link_id` within a TEMPLATE payload
pub fn layout_of(templates: &TemplatePayload, link_id: &LinkId) -> Option<ChannelLayout> {
    templates
        .actors
        .iter()
        .find(|a| a.link_id == link_id.as_str())
        .map(|a| a.template().layout())
}

/// Start `service` as a server and complete a handshake with a new peer.
///
/// Consumes the service's HELLO and its "Connected" notice.
pub fn connect_peer<S: SceneAdapter>(
    service: &mut LinkService<S>,
    hello: &Hello,
) -> LinkResult<(PeerSocket, Hello)> {
    let addr = service.start_server()?;
    let mut peer = PeerSocket::connect(addr)?;
    if !pump(service, |s| s.state().has_peer()) {
        return Err(LinkError::ConnectionFailed("service never accepted".into()));
    }

    let theirs: Hello = peer.expect_json(OpCode::Hello)?;
    peer.send_json(OpCode::Hello, hello)?;
    if !pump(service, |s| s.is_connected()) {
        return Err(LinkError::ConnectionFailed("service never saw hello".into()));
    }

    let notice: Notify = peer.expect_json(OpCode::Notify)?;
    tracing::debug!(message = %notice.message, "peer connected");
    Ok((peer, theirs))
}

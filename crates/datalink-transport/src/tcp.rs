//! TCP link implementation
//!
//! A `TcpLink` owns at most one listening socket and at most one peer
//! socket. All polling is non-blocking so a scheduler tick never waits on
//! the network; sends switch the socket to blocking with a write timeout so a
//! full message always goes out in one piece or the link is dropped.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::BytesMut;

use datalink_core::{LinkError, LinkResult, OpCode, MAX_CHUNK_SIZE};
use datalink_wire::{Message, MessageHeader, HEADER_SIZE};

use crate::{Keepalive, KeepaliveAction, KeepaliveConfig};

/// Chunks read per receive call before yielding back to the scheduler
const MAX_READS_PER_POLL: usize = 64;

/// Default receive buffer size past which reads pause
const MAX_BUFFERED: usize = 1 << 20;

/// Which side opened the current peer socket
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// We accepted the peer on our listening socket
    Server,
    /// We connected out to the peer
    Client,
}

/// Connection lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Idle,
    Listening,
    Connecting,
    Connected,
    /// Peer socket gone; waiting for the owner to clean up
    Closed,
}

impl LinkState {
    /// A peer socket exists and may be written to
    pub fn has_peer(self) -> bool {
        matches!(self, LinkState::Connecting | LinkState::Connected)
    }
}

/// Socket level configuration
#[derive(Clone, Debug)]
pub struct TcpLinkConfig {
    /// Connect and write timeout
    pub socket_timeout: Duration,
    /// Largest single read
    pub max_chunk_size: usize,
    /// Reads pause once this many bytes are buffered and at least one
    /// message is complete. A single larger message still arrives whole.
    pub max_buffered: usize,
    pub keepalive: KeepaliveConfig,
}

impl Default for TcpLinkConfig {
    fn default() -> Self {
        TcpLinkConfig {
            socket_timeout: Duration::from_secs(5),
            max_chunk_size: MAX_CHUNK_SIZE,
            max_buffered: MAX_BUFFERED,
            keepalive: KeepaliveConfig::default(),
        }
    }
}

/// Transport statistics
#[derive(Clone, Copy, Debug, Default)]
pub struct TransportStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub connections_accepted: u64,
    pub connections_lost: u64,
}

/// Result of one receive poll
#[derive(Debug, Default)]
pub struct ReceiveBatch {
    /// Complete messages in arrival order
    pub messages: Vec<Message>,
    /// More work is waiting (buffered messages, unread socket data, or a
    /// pending close)
    pub more_pending: bool,
}

/// Split up to `max` complete messages off the front of `buf`.
///
/// Stops right after an urgent (NOTIFY) message so it can be surfaced
/// before anything queued behind it.
pub fn take_messages(buf: &mut BytesMut, max: usize) -> LinkResult<Vec<Message>> {
    let mut messages = Vec::new();
    while messages.len() < max {
        let Some(message) = Message::split_from(buf)? else {
            break;
        };
        let urgent = message.op().map_or(false, OpCode::is_urgent);
        messages.push(message);
        if urgent {
            break;
        }
    }
    Ok(messages)
}

/// True if `buf` holds at least one complete message
fn has_complete_message(buf: &BytesMut) -> bool {
    if buf.len() < HEADER_SIZE {
        return false;
    }
    let length = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
    buf.len() >= HEADER_SIZE + length
}

/// Single-peer TCP link
pub struct TcpLink {
    config: TcpLinkConfig,
    state: LinkState,
    listener: Option<TcpListener>,
    peer: Option<TcpStream>,
    peer_addr: Option<SocketAddr>,
    role: Option<Role>,
    /// Greeting sent on every new peer socket
    hello: Message,
    recv_buf: BytesMut,
    chunk: Vec<u8>,
    peer_eof: bool,
    keepalive: Keepalive,
    stats: TransportStats,
}

impl TcpLink {
    pub fn new(config: TcpLinkConfig, hello: Message) -> Self {
        TcpLink {
            keepalive: Keepalive::new(config.keepalive.clone()),
            chunk: vec![0u8; config.max_chunk_size.max(HEADER_SIZE)],
            config,
            state: LinkState::Idle,
            listener: None,
            peer: None,
            peer_addr: None,
            role: None,
            hello,
            recv_buf: BytesMut::with_capacity(MAX_CHUNK_SIZE),
            peer_eof: false,
            stats: TransportStats::default(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    pub fn has_peer(&self) -> bool {
        self.peer.is_some() && self.state.has_peer()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Address of the listening socket
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    pub fn keepalive(&self) -> &Keepalive {
        &self.keepalive
    }

    /// Greeting sent to new peers
    pub fn hello(&self) -> &Message {
        &self.hello
    }

    /// Replace the greeting sent to new peers
    pub fn set_hello(&mut self, hello: Message) {
        self.hello = hello;
    }

    /// Bind and listen on all interfaces
    pub fn start_server(&mut self, port: u16) -> LinkResult<SocketAddr> {
        if let Some(addr) = self.local_addr() {
            return Ok(addr);
        }

        let listener = TcpListener::bind(("0.0.0.0", port)).map_err(|e| {
            tracing::error!(port, error = %e, "unable to start server");
            LinkError::ConnectionFailed(format!("bind *:{port}: {e}"))
        })?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        self.listener = Some(listener);
        if !self.state.has_peer() {
            self.state = LinkState::Listening;
        }
        self.keepalive.arm_handshake();
        tracing::info!(%addr, "listening");
        Ok(addr)
    }

    /// Close the listening socket; an existing peer is unaffected
    pub fn stop_server(&mut self) {
        if self.listener.take().is_some() {
            tracing::info!("closing server socket");
        }
        if self.state == LinkState::Listening {
            self.state = LinkState::Idle;
        }
    }

    /// Connect out to a listening peer and send the greeting.
    ///
    /// An error means no peer could be reached and the caller may fall back
    /// to hosting instead.
    pub fn start_client(&mut self, host: &str, port: u16) -> LinkResult<SocketAddr> {
        if let (true, Some(addr)) = (self.has_peer(), self.peer_addr) {
            tracing::info!(%addr, "client already connected");
            return Ok(addr);
        }

        tracing::info!(host, port, "attempting to connect");
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| LinkError::ConnectionFailed(format!("resolve {host}:{port}: {e}")))?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.config.socket_timeout) {
                Ok(stream) => {
                    self.attach_peer(stream, addr, Role::Client)?;
                    tracing::info!(%addr, "connecting with data link server");
                    return Ok(addr);
                }
                Err(e) => last_err = Some(e),
            }
        }

        let reason = last_err.map_or_else(|| "no address".to_string(), |e| e.to_string());
        tracing::info!(host, port, reason = %reason, "client socket connect failed");
        Err(LinkError::ConnectionFailed(format!("{host}:{port}: {reason}")))
    }

    /// Accept one pending inbound connection, if any.
    ///
    /// A new peer replaces the current one.
    pub fn poll_accept(&mut self) -> LinkResult<Option<SocketAddr>> {
        let Some(listener) = self.listener.as_ref() else {
            return Ok(None);
        };

        match listener.accept() {
            Ok((stream, addr)) => {
                if self.peer.is_some() {
                    tracing::info!(old = ?self.peer_addr, new = %addr, "replacing peer connection");
                    self.drop_peer();
                }
                self.attach_peer(stream, addr, Role::Server)?;
                self.stats.connections_accepted += 1;
                tracing::info!(%addr, "incoming connection received");
                Ok(Some(addr))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => {
                tracing::error!(error = %e, "server socket accept failed");
                Err(LinkError::ConnectionLost(format!("accept: {e}")))
            }
        }
    }

    fn attach_peer(&mut self, stream: TcpStream, addr: SocketAddr, role: Role) -> LinkResult<()> {
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;

        self.peer = Some(stream);
        self.peer_addr = Some(addr);
        self.role = Some(role);
        self.state = LinkState::Connecting;
        self.recv_buf.clear();
        self.peer_eof = false;
        self.keepalive.arm_peer();

        let hello = self.hello.clone();
        self.send(&hello)
    }

    /// Handshake finished: Connecting -> Connected
    pub fn mark_connected(&mut self) -> bool {
        if self.state == LinkState::Connecting {
            self.state = LinkState::Connected;
            return true;
        }
        false
    }

    /// Restart the keepalive countdown
    #[inline]
    pub fn touch(&mut self) {
        self.keepalive.on_receive();
    }

    /// Advance keepalive and ping countdowns
    pub fn update_timers(&mut self, elapsed: Duration) -> KeepaliveAction {
        match self.state {
            LinkState::Connected => self.keepalive.advance(elapsed, true),
            LinkState::Connecting | LinkState::Listening => self.keepalive.advance(elapsed, false),
            _ => KeepaliveAction::None,
        }
    }

    /// Read whatever the socket has and return up to `max_messages`
    /// complete messages.
    ///
    /// An orderly close is reported once every complete message received
    /// before it has been handed out.
    pub fn receive_available(&mut self, max_messages: usize) -> LinkResult<ReceiveBatch> {
        if !self.has_peer() {
            return Ok(ReceiveBatch::default());
        }

        let mut more_on_socket = false;
        if !self.peer_eof {
            more_on_socket = self.fill()?;
        }

        if self.peer_eof && !has_complete_message(&self.recv_buf) {
            let leftover = self.recv_buf.len();
            let err = if leftover > 0 {
                let expected = MessageHeader::parse(&self.recv_buf)
                    .map_or(HEADER_SIZE, |header| header.message_len());
                tracing::warn!(leftover, expected, "peer closed mid-message");
                LinkError::TruncatedData {
                    expected,
                    actual: leftover,
                }
            } else {
                LinkError::ConnectionLost("socket closed by peer".into())
            };
            return Err(self.fail(err));
        }

        let messages = match take_messages(&mut self.recv_buf, max_messages) {
            Ok(messages) => messages,
            Err(e) => return Err(self.fail(e)),
        };
        self.stats.messages_received += messages.len() as u64;

        Ok(ReceiveBatch {
            more_pending: more_on_socket || self.peer_eof || has_complete_message(&self.recv_buf),
            messages,
        })
    }

    /// Pull bytes off the socket. Returns true if the read budget or the
    /// buffer bound stopped reading before the socket drained.
    fn fill(&mut self) -> LinkResult<bool> {
        for _ in 0..MAX_READS_PER_POLL {
            if self.recv_buf.len() >= self.config.max_buffered
                && has_complete_message(&self.recv_buf)
            {
                return Ok(true);
            }
            let Some(stream) = self.peer.as_mut() else {
                return Ok(false);
            };
            match stream.read(&mut self.chunk) {
                Ok(0) => {
                    self.peer_eof = true;
                    return Ok(false);
                }
                Ok(n) => {
                    self.recv_buf.extend_from_slice(&self.chunk[..n]);
                    self.stats.bytes_received += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!(error = %e, "client socket receive failed");
                    return Err(self.fail(LinkError::ConnectionLost(format!("recv: {e}"))));
                }
            }
        }
        Ok(true)
    }

    /// Write a complete message
    pub fn send(&mut self, message: &Message) -> LinkResult<()> {
        if !self.has_peer() {
            return Err(LinkError::NotConnected);
        }

        let bytes = message.encode();
        let timeout = self.config.socket_timeout;
        let result = match self.peer.as_mut() {
            Some(stream) => write_blocking(stream, &bytes, timeout),
            None => return Err(LinkError::NotConnected),
        };

        match result {
            Ok(()) => {
                self.keepalive.on_send();
                self.stats.messages_sent += 1;
                self.stats.bytes_sent += bytes.len() as u64;
                tracing::trace!(opcode = message.opcode, len = message.payload.len(), "sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "client socket send failed");
                Err(self.fail(LinkError::ConnectionLost(format!("send: {e}"))))
            }
        }
    }

    /// Shorthand for an opcode with a payload
    pub fn send_op(&mut self, opcode: OpCode, payload: Vec<u8>) -> LinkResult<()> {
        self.send(&Message::new(opcode, payload))
    }

    /// Drop the peer socket after an error and enter `Closed`
    fn fail(&mut self, err: LinkError) -> LinkError {
        let err = match err {
            LinkError::ConnectionLost(_) => err,
            other => LinkError::ConnectionLost(other.to_string()),
        };
        self.stats.connections_lost += 1;
        self.drop_peer();
        self.state = LinkState::Closed;
        err
    }

    fn drop_peer(&mut self) {
        if let Some(stream) = self.peer.take() {
            tracing::info!(addr = ?self.peer_addr, "closing client socket");
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.peer_addr = None;
        self.role = None;
        self.recv_buf.clear();
        self.peer_eof = false;
    }

    /// Close the peer socket, keeping any listener; enters `Closed`
    pub fn close_peer(&mut self) {
        self.drop_peer();
        self.state = LinkState::Closed;
    }

    /// Leave `Closed` once the owner has released session state
    pub fn cleanup(&mut self) {
        if self.state != LinkState::Closed {
            return;
        }
        if self.listener.is_some() {
            self.keepalive.arm_handshake();
            self.state = LinkState::Listening;
        } else {
            self.state = LinkState::Idle;
        }
    }

    /// Close everything
    pub fn shutdown(&mut self) {
        self.drop_peer();
        self.stop_server();
        self.state = LinkState::Idle;
    }
}

impl Drop for TcpLink {
    fn drop(&mut self) {
        self.drop_peer();
    }
}

fn write_blocking(stream: &mut TcpStream, bytes: &[u8], timeout: Duration) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_write_timeout(Some(timeout))?;
    let result = stream.write_all(bytes).and_then(|_| stream.flush());
    stream.set_nonblocking(true)?;
    result
}

//! Link service - the session context and scheduler tick

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use datalink_core::{LinkError, LinkId, LinkResult, OpCode};
use datalink_transport::{KeepaliveAction, LinkState, TcpLink};
use datalink_wire::{
    ActorRef, ActorTemplate, CharacterPayload, Hello, JsonPayload, Message, MorphPayload, Notify,
    PoseRecord, SequenceEndPayload, SequencePayload, TemplatePayload, HEADER_SIZE,
};

use crate::{
    conform_pose, ActorRegistry, EventBus, EventKind, LinkConfig, LinkEvent, RouteTable,
    SceneAdapter, SequenceEngine, StartMode, SubscriptionId,
};

/// Application name a Character Creator peer announces
pub const CHARACTER_CREATOR: &str = "Character Creator";
/// Application name an iClone peer announces
pub const ICLONE: &str = "iClone";

/// Service counters
#[derive(Clone, Debug, Default)]
pub struct LinkStats {
    pub ticks: u64,
    pub messages_in: u64,
    pub messages_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub handler_errors: u64,
    pub unknown_opcodes: u64,
    pub sequence_frames_sent: u64,
    pub sequence_frames_received: u64,
    pub connections_lost: u64,
    pub last_tick_duration: Duration,
}

/// One data link session: connection, actors, sequences and the scene they
/// act on.
pub struct LinkService<S: SceneAdapter> {
    pub(crate) config: LinkConfig,
    pub(crate) link: TcpLink,
    pub(crate) scene: S,
    pub(crate) registry: ActorRegistry,
    pub(crate) sequence: SequenceEngine,
    pub(crate) routes: RouteTable,
    pub(crate) events: EventBus,
    pub(crate) stats: LinkStats,
    pub(crate) remote: Option<Hello>,
    /// Scheduler should keep ticking
    pub(crate) running: bool,
}

impl<S: SceneAdapter> LinkService<S> {
    pub fn new(config: LinkConfig, scene: S) -> LinkResult<Self> {
        let hello = Message::new(OpCode::Hello, config.identity.hello().to_payload()?);
        Ok(LinkService {
            link: TcpLink::new(config.transport.clone(), hello),
            config,
            scene,
            registry: ActorRegistry::new(),
            sequence: SequenceEngine::new(),
            routes: RouteTable::new(),
            events: EventBus::new(),
            stats: LinkStats::default(),
            remote: None,
            running: false,
        })
    }

    // Accessors

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn state(&self) -> LinkState {
        self.link.state()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_connected(&self) -> bool {
        self.link.state() == LinkState::Connected
    }

    pub fn is_listening(&self) -> bool {
        self.link.is_listening()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.link.local_addr()
    }

    /// Identity the peer sent in its HELLO
    pub fn remote(&self) -> Option<&Hello> {
        self.remote.as_ref()
    }

    pub fn is_character_creator(&self) -> bool {
        self.remote
            .as_ref()
            .map_or(false, |r| r.application == CHARACTER_CREATOR)
    }

    pub fn is_iclone(&self) -> bool {
        self.remote.as_ref().map_or(false, |r| r.application == ICLONE)
    }

    /// Where the peer should find an exported file called `name`
    pub fn remote_export_path(&self, name: &str) -> PathBuf {
        let folder = match self.remote.as_ref() {
            Some(remote) if !remote.path.is_empty() => remote.path.as_str(),
            _ => self.config.identity.path.as_str(),
        };
        PathBuf::from(folder).join(name)
    }

    pub fn registry(&self) -> &ActorRegistry {
        &self.registry
    }

    pub fn sequence(&self) -> &SequenceEngine {
        &self.sequence
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn events(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Shorthand for `events().subscribe`
    pub fn subscribe<F>(&mut self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: FnMut(&LinkEvent) + 'static,
    {
        self.events.subscribe(kind, callback)
    }

    pub(crate) fn emit(&mut self, event: LinkEvent) {
        self.events.emit(&event);
    }

    /// Surface a status line to the scene and subscribers
    pub(crate) fn status(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::info!(status = %text);
        self.scene.status(&text);
        self.emit(LinkEvent::Status(text));
    }

    // Lifecycle

    /// Bring the link up according to the configured start mode.
    ///
    /// Auto mode tries to reach a listening peer first and hosts a server if
    /// nobody answers.
    pub fn service_start(&mut self) -> LinkResult<()> {
        if self.link.is_listening() || self.link.has_peer() {
            return Ok(());
        }

        let host = self.config.host.clone();
        let port = self.config.port;
        match self.config.start_mode {
            StartMode::ServerOnly => self.start_server().map(|_| ()),
            StartMode::ClientOnly => self.start_client(&host, port).map(|_| ()),
            StartMode::Auto => match self.start_client(&host, port) {
                Ok(_) => Ok(()),
                Err(e) => {
                    tracing::info!(error = %e, "no peer listening, hosting instead");
                    self.start_server().map(|_| ())
                }
            },
        }
    }

    /// Listen on the configured port
    pub fn start_server(&mut self) -> LinkResult<SocketAddr> {
        let addr = self.link.start_server(self.config.listen_port)?;
        self.running = true;
        self.emit(LinkEvent::Listening { addr });
        self.emit(LinkEvent::Changed);
        Ok(addr)
    }

    /// Connect out to a listening peer
    pub fn start_client(&mut self, host: &str, port: u16) -> LinkResult<SocketAddr> {
        let addr = self.link.start_client(host, port)?;
        self.running = true;
        self.note_hello_sent();
        self.emit(LinkEvent::Connecting { addr });
        self.emit(LinkEvent::Changed);
        Ok(addr)
    }

    /// Tell the peer we are shutting down, then close everything
    pub fn stop(&mut self) {
        if self.link.has_peer() {
            let _ = self.send(OpCode::Stop, Vec::new());
        }
        self.running = false;
        self.close_client();
        self.close_server();
        tracing::info!("service stopped");
    }

    /// Drop the current peer; a listening server keeps accepting
    pub fn disconnect(&mut self) {
        if self.link.has_peer() {
            let _ = self.send(OpCode::Disconnect, Vec::new());
        }
        if self.config.start_mode == StartMode::ClientOnly {
            self.running = false;
        }
        self.close_client();
    }

    /// Unrecoverable socket failure: close everything
    pub(crate) fn handle_lost(&mut self, reason: String) {
        tracing::warn!(reason = %reason, "connection lost");
        self.stats.connections_lost += 1;
        self.emit(LinkEvent::ConnectionLost { reason });
        self.running = false;
        self.close_client();
        self.close_server();
        self.status("Connection lost");
    }

    /// Abandon everything negotiated with the current peer
    pub(crate) fn reset_session(&mut self) {
        self.sequence.abort(&self.registry, &mut self.scene);
        self.registry.reset();
        self.remote = None;
    }

    pub(crate) fn close_client(&mut self) {
        let had_peer = self.link.has_peer() || self.link.state() == LinkState::Closed;
        self.reset_session();
        if !had_peer {
            return;
        }
        self.link.close_peer();
        self.link.cleanup();
        self.emit(LinkEvent::ClientStopped);
        self.emit(LinkEvent::Changed);
    }

    pub(crate) fn close_server(&mut self) {
        if !self.link.is_listening() {
            return;
        }
        self.link.stop_server();
        self.emit(LinkEvent::ServerStopped);
        self.emit(LinkEvent::Changed);
    }

    // Scheduler

    /// Run one scheduler tick and return the delay until the next one.
    ///
    /// The delay is zero while received data or a sequence step is pending.
    pub fn tick(&mut self, elapsed: Duration) -> Duration {
        let start = Instant::now();
        self.stats.ticks += 1;
        let interval = self.config.tick_interval;

        if !self.running {
            return interval;
        }

        // 1: countdowns
        match self.link.update_timers(elapsed) {
            KeepaliveAction::SendPing => {
                let _ = self.send(OpCode::Ping, Vec::new());
            }
            KeepaliveAction::Stale => {
                if self.link.state() == LinkState::Listening {
                    tracing::info!("no connection within time limit");
                } else {
                    tracing::info!("keepalive expired");
                }
                self.stop();
                return interval;
            }
            KeepaliveAction::None => {}
        }

        // 2: accept
        self.accept();

        // 3-4: receive and dispatch
        let more_data = self.receive();

        // 5: sequence
        if self.sequence.is_sending() {
            self.send_sequence_step();
        }

        self.stats.last_tick_duration = start.elapsed();
        if more_data || self.sequence.is_active() {
            Duration::ZERO
        } else {
            interval
        }
    }

    /// Tick until the service stops, sleeping between ticks
    pub fn run(&mut self) {
        let mut last = Instant::now();
        while self.running {
            let now = Instant::now();
            let delay = self.tick(now - last);
            last = now;
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
    }

    fn accept(&mut self) {
        match self.link.poll_accept() {
            Ok(Some(addr)) => {
                self.reset_session();
                self.note_hello_sent();
                self.emit(LinkEvent::Accepted { addr });
                self.emit(LinkEvent::Changed);
            }
            Ok(None) => {}
            Err(e) => self.handle_lost(e.to_string()),
        }
    }

    /// Drain and dispatch; true if more data is waiting
    fn receive(&mut self) -> bool {
        if !self.link.has_peer() {
            return false;
        }

        match self.link.receive_available(self.config.max_receive) {
            Ok(batch) => {
                for message in batch.messages {
                    self.dispatch(message);
                    // STOP or DISCONNECT may have closed the peer
                    if !self.link.has_peer() {
                        return false;
                    }
                }
                batch.more_pending
            }
            Err(e) => {
                self.handle_lost(e.to_string());
                false
            }
        }
    }

    /// Account for the HELLO the transport sends on every new peer
    fn note_hello_sent(&mut self) {
        let len = self.link.hello().payload.len();
        self.stats.messages_out += 1;
        self.stats.bytes_out += (HEADER_SIZE + len) as u64;
        self.emit(LinkEvent::Sent {
            opcode: OpCode::Hello.to_u32(),
            len,
        });
    }

    // Sending

    /// Send one message; a failed write closes the link
    pub fn send(&mut self, opcode: OpCode, payload: Vec<u8>) -> LinkResult<()> {
        let len = payload.len();
        match self.link.send(&Message::new(opcode, payload)) {
            Ok(()) => {
                self.stats.messages_out += 1;
                self.stats.bytes_out += (HEADER_SIZE + len) as u64;
                self.emit(LinkEvent::Sent {
                    opcode: opcode.to_u32(),
                    len,
                });
                Ok(())
            }
            Err(LinkError::ConnectionLost(reason)) => {
                self.handle_lost(reason.clone());
                Err(LinkError::ConnectionLost(reason))
            }
            Err(e) => Err(e),
        }
    }

    fn send_json<P: JsonPayload>(&mut self, opcode: OpCode, payload: &P) -> LinkResult<()> {
        let bytes = payload.to_payload()?;
        self.send(opcode, bytes)
    }

    pub fn send_notify(&mut self, message: impl Into<String>) -> LinkResult<()> {
        let notify = Notify {
            message: message.into(),
        };
        self.send_json(OpCode::Notify, &notify)
    }

    /// Registered actors for `link_ids`, refreshing each local template
    fn resolve_actors(&mut self, link_ids: &[LinkId]) -> Vec<LinkId> {
        let mut resolved = Vec::with_capacity(link_ids.len());
        for link_id in link_ids {
            let Some(actor) = self.registry.get_or_create(link_id, &self.scene) else {
                tracing::warn!(error = %LinkError::UnknownActor(link_id.clone()), "actor not sent");
                continue;
            };
            let template = self.scene.local_template(actor);
            self.registry.set_template(link_id, template);
            resolved.push(link_id.clone());
        }
        resolved
    }

    fn send_templates(&mut self, link_ids: &[LinkId]) -> LinkResult<()> {
        let actors: Vec<ActorTemplate> = link_ids
            .iter()
            .filter_map(|id| {
                let actor = self.registry.get(id)?;
                let template = actor.template()?;
                Some(ActorTemplate::new(actor.name.clone(), id.as_str(), template))
            })
            .collect();
        self.send_json(OpCode::Template, &TemplatePayload::new(actors))
    }

    fn actor_refs(&self, link_ids: &[LinkId]) -> Vec<ActorRef> {
        link_ids
            .iter()
            .filter_map(|id| self.registry.get(id))
            .map(|a| ActorRef::new(a.name.clone(), a.link_id.as_str()))
            .collect()
    }

    /// Sample every actor at the scene's current frame
    fn sample_pose(&mut self, link_ids: &[LinkId]) -> PoseRecord {
        let mut record = PoseRecord::new(self.scene.current_frame());
        for id in link_ids {
            let Some(actor) = self.registry.get(id) else {
                continue;
            };
            let mut pose = self.scene.sample_current_pose(actor);
            if let Some(template) = actor.template() {
                conform_pose(&mut pose, template);
            }
            record.actors.push(pose);
        }
        record
    }

    fn require_connected(&self) -> LinkResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(LinkError::NotConnected)
        }
    }

    /// Send the current pose of `link_ids`: TEMPLATE, then a binary POSE
    pub fn send_pose(&mut self, link_ids: &[LinkId]) -> LinkResult<usize> {
        self.require_connected()?;
        let actors = self.resolve_actors(link_ids);
        if actors.is_empty() {
            return Ok(0);
        }

        self.status("Sending Current Pose Set");
        self.send_notify("Pose Set")?;
        self.send_templates(&actors)?;
        let record = self.sample_pose(&actors);
        self.send(OpCode::Pose, record.encode())?;
        Ok(actors.len())
    }

    /// Start streaming the scene's frame range for `link_ids`.
    ///
    /// Sends SEQUENCE and TEMPLATE now; frames follow one per tick.
    pub fn start_sequence(&mut self, link_ids: &[LinkId]) -> LinkResult<usize> {
        self.require_connected()?;
        if self.sequence.is_active() {
            return Err(LinkError::SequenceActive);
        }
        let actors = self.resolve_actors(link_ids);
        let Some(first) = link_ids.first() else {
            return Ok(0);
        };
        if actors.is_empty() {
            return Err(LinkError::UnknownActor(first.clone()));
        }

        let (start, end) = self.scene.frame_range();
        let fps = self.scene.fps();
        self.sequence.begin_send(start, end, actors.clone())?;
        self.scene.set_current_frame(start);

        self.status("Sending Animation Sequence");
        let payload = SequencePayload::new(fps, start, end, self.actor_refs(&actors));
        let sent = self
            .send_notify("Animation Sequence")
            .and_then(|_| self.send_json(OpCode::Sequence, &payload))
            .and_then(|_| self.send_templates(&actors));
        if let Err(e) = sent {
            self.sequence.cancel_send();
            return Err(e);
        }
        Ok(actors.len())
    }

    /// One outbound sequence frame, plus SEQUENCE_END after the last
    fn send_sequence_step(&mut self) {
        let actors = self.sequence.sending_actors().to_vec();
        let frames = self.sequence.frame_count().unwrap_or(0);
        let Some(step) = self.sequence.next_send_step() else {
            return;
        };

        self.scene.set_current_frame(step.frame);
        let record = self.sample_pose(&actors);
        if self.send(OpCode::SequenceFrame, record.encode()).is_err() {
            return;
        }
        self.stats.sequence_frames_sent += 1;
        tracing::trace!(frame = step.frame, "sequence frame sent");

        if step.last {
            let end = SequenceEndPayload {
                actors: self.actor_refs(&actors),
            };
            if self.send_json(OpCode::SequenceEnd, &end).is_ok() {
                self.status(format!("Sequence sent: {frames} frames"));
            }
        }
    }

    /// Announce an exported character file to the peer
    pub fn send_character(&mut self, link_id: &LinkId, file_name: &str) -> LinkResult<PathBuf> {
        self.require_connected()?;
        let name = self
            .registry
            .get_or_create(link_id, &self.scene)
            .map(|a| a.name.clone())
            .ok_or_else(|| LinkError::UnknownActor(link_id.clone()))?;

        let path = self.remote_export_path(file_name);
        let payload = CharacterPayload {
            path: path.to_string_lossy().into_owned(),
            name: name.clone(),
            link_id: link_id.as_str().to_string(),
        };
        self.send_notify(format!("Exporting: {name}"))?;
        self.send_json(OpCode::Character, &payload)?;
        self.status(format!("Sent: {name}"));
        Ok(path)
    }

    /// Announce an exported morph mesh and its key file
    pub fn send_morph(
        &mut self,
        link_id: &LinkId,
        morph_name: &str,
        morph_path: &str,
        update: bool,
    ) -> LinkResult<PathBuf> {
        self.require_connected()?;
        let name = self
            .registry
            .get_or_create(link_id, &self.scene)
            .map(|a| a.name.clone())
            .ok_or_else(|| LinkError::UnknownActor(link_id.clone()))?;

        let path = self.remote_export_path(&format!("{name}_morph.obj"));
        let key_path = self.remote_export_path(&format!("{name}_morph.ObjKey"));
        let payload = MorphPayload {
            path: path.to_string_lossy().into_owned(),
            key_path: key_path.to_string_lossy().into_owned(),
            name: name.clone(),
            link_id: link_id.as_str().to_string(),
            morph_name: morph_name.to_string(),
            morph_path: morph_path.to_string(),
        };
        let opcode = if update {
            OpCode::MorphUpdate
        } else {
            OpCode::Morph
        };
        self.send_json(opcode, &payload)?;
        self.status(format!("Sent: {name}"));
        Ok(path)
    }

    /// Send the viewport camera; false if the scene has none
    pub fn send_camera_sync(&mut self) -> LinkResult<bool> {
        self.require_connected()?;
        let Some(payload) = self.scene.view_camera() else {
            return Ok(false);
        };
        self.send_json(OpCode::CameraSync, &payload)?;
        Ok(true)
    }
}

impl<S: SceneAdapter + std::fmt::Debug> std::fmt::Debug for LinkService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkService")
            .field("state", &self.link.state())
            .field("running", &self.running)
            .field("remote", &self.remote)
            .field("actors", &self.registry.len())
            .field("sequence", &self.sequence.phase())
            .finish()
    }
}

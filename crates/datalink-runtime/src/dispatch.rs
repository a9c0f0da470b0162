//! Opcode dispatch
//!
//! Every received message resets the keepalive countdown, then goes through
//! a route table built once at service construction. Handler failures are
//! logged and reported as status; they never close the connection.

use std::collections::HashMap;

use datalink_core::{LinkError, LinkId, LinkResult, OpCode};
use datalink_wire::{
    decode_json, CameraSyncPayload, CharacterPayload, CharacterUpdatePayload, Hello, JsonPayload,
    Message, MorphPayload, Notify, PosePayload, PoseRecord, RigifyPayload, SequenceEndPayload,
    SequencePayload, TemplatePayload, HEADER_SIZE,
};

use crate::{LinkEvent, LinkService, SceneAdapter, StartMode};

/// Handler selected for an opcode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Hello,
    Ping,
    Stop,
    Disconnect,
    Notify,
    Morph { update: bool },
    Character,
    CharacterUpdate,
    Prop { update: bool },
    Rigify,
    Template,
    Pose,
    PoseFrame,
    Sequence,
    SequenceFrame,
    SequenceEnd,
    Lights,
    CameraSync,
}

impl Route {
    pub fn for_opcode(op: OpCode) -> Route {
        match op {
            OpCode::Hello => Route::Hello,
            OpCode::Ping => Route::Ping,
            OpCode::Stop => Route::Stop,
            OpCode::Disconnect => Route::Disconnect,
            OpCode::Notify => Route::Notify,
            OpCode::Morph => Route::Morph { update: false },
            OpCode::MorphUpdate => Route::Morph { update: true },
            OpCode::Character => Route::Character,
            OpCode::CharacterUpdate => Route::CharacterUpdate,
            OpCode::Prop => Route::Prop { update: false },
            OpCode::PropUpdate => Route::Prop { update: true },
            OpCode::Rigify => Route::Rigify,
            OpCode::Template => Route::Template,
            OpCode::Pose => Route::Pose,
            OpCode::PoseFrame => Route::PoseFrame,
            OpCode::Sequence => Route::Sequence,
            OpCode::SequenceFrame => Route::SequenceFrame,
            OpCode::SequenceEnd => Route::SequenceEnd,
            OpCode::Lights => Route::Lights,
            OpCode::CameraSync => Route::CameraSync,
        }
    }
}

/// Raw opcode -> route
#[derive(Clone, Debug)]
pub struct RouteTable {
    routes: HashMap<u32, Route>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable {
    pub fn new() -> Self {
        let routes = OpCode::ALL
            .iter()
            .map(|op| (op.to_u32(), Route::for_opcode(*op)))
            .collect();
        RouteTable { routes }
    }

    #[inline]
    pub fn route(&self, opcode: u32) -> Option<Route> {
        self.routes.get(&opcode).copied()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<S: SceneAdapter> LinkService<S> {
    /// Handle one received message
    pub(crate) fn dispatch(&mut self, message: Message) {
        self.link.touch();

        let len = message.payload.len();
        self.stats.messages_in += 1;
        self.stats.bytes_in += (HEADER_SIZE + len) as u64;

        match self.routes.route(message.opcode) {
            Some(route) => {
                tracing::debug!(?route, len, "dispatch");
                if let Err(e) = self.handle(route, &message.payload) {
                    self.stats.handler_errors += 1;
                    tracing::warn!(?route, error = %e, "message handler failed");
                    self.status(format!("{route:?} failed: {e}"));
                }
            }
            None => {
                self.stats.unknown_opcodes += 1;
                tracing::debug!(opcode = message.opcode, len, "ignoring unknown opcode");
            }
        }

        self.emit(LinkEvent::Received {
            opcode: message.opcode,
            len,
        });
    }

    fn handle(&mut self, route: Route, payload: &[u8]) -> LinkResult<()> {
        match route {
            Route::Hello => self.on_hello(payload),
            Route::Ping => {
                tracing::debug!("ping received");
                Ok(())
            }
            Route::Stop => {
                tracing::info!("termination received");
                self.running = false;
                self.close_client();
                self.close_server();
                Ok(())
            }
            Route::Disconnect => {
                tracing::info!("disconnection received");
                if self.config.start_mode == StartMode::ClientOnly {
                    self.running = false;
                }
                self.close_client();
                Ok(())
            }
            Route::Notify => {
                let notify = Notify::from_payload(payload)?;
                self.status(notify.message);
                Ok(())
            }
            Route::Template => self.on_template(payload),
            Route::Pose => self.on_pose(payload),
            Route::PoseFrame => self.on_pose_frame(payload),
            Route::Sequence => self.on_sequence(payload),
            Route::SequenceFrame => self.on_sequence_frame(payload),
            Route::SequenceEnd => self.on_sequence_end(payload),
            Route::Character => self.on_character(payload),
            Route::Prop { update } => {
                let prop = CharacterPayload::from_payload(payload)?;
                self.scene.import_prop(&prop, update)?;
                self.status(format!("Prop: {}", prop.name));
                Ok(())
            }
            Route::CharacterUpdate => self.on_character_update(payload),
            Route::Morph { update } => {
                let morph = MorphPayload::from_payload(payload)?;
                self.scene.import_morph(&morph, update)?;
                self.status(format!("Morph: {}", morph.name));
                Ok(())
            }
            Route::Rigify => {
                let request = RigifyPayload::from_payload(payload)?;
                self.status(format!("Rigifying: {}", request.name));
                self.scene.rigify(&request)
            }
            Route::Lights => {
                let lights: serde_json::Value = decode_json(payload)?;
                self.scene.apply_lights(&lights)
            }
            Route::CameraSync => {
                let camera = CameraSyncPayload::from_payload(payload)?;
                self.scene.apply_camera_sync(&camera)
            }
        }
    }

    fn on_hello(&mut self, payload: &[u8]) -> LinkResult<()> {
        let hello = if payload.is_empty() {
            Hello::default()
        } else {
            Hello::from_payload(payload)?
        };

        tracing::info!(
            application = %hello.application,
            version = %hello.version,
            path = %hello.path,
            exe = %hello.exe,
            "hello received"
        );
        self.remote = Some(hello.clone());

        if self.link.mark_connected() {
            self.emit(LinkEvent::Connected { remote: hello });
            self.emit(LinkEvent::Changed);
            self.send_notify("Connected")?;
        }
        Ok(())
    }

    fn on_template(&mut self, payload: &[u8]) -> LinkResult<()> {
        let templates = TemplatePayload::from_payload(payload)?;
        if templates.count != templates.actors.len() {
            tracing::debug!(
                count = templates.count,
                actors = templates.actors.len(),
                "template count mismatch"
            );
        }

        for entry in &templates.actors {
            let link_id = LinkId::new(entry.link_id.as_str());
            self.registry.set_template(&link_id, entry.template());
            if self.registry.get_or_create(&link_id, &self.scene).is_none() {
                tracing::debug!(link_id = %link_id, name = %entry.name, "template for actor with no entity");
            }
        }
        Ok(())
    }

    fn decode_pose(&self, payload: &[u8]) -> LinkResult<PoseRecord> {
        PoseRecord::decode(payload, |id| self.registry.layout(id))
    }

    /// POSE carries a binary record; a JSON object is taken as an
    /// announcement that a POSE_FRAME follows
    fn on_pose(&mut self, payload: &[u8]) -> LinkResult<()> {
        if payload.first() == Some(&b'{') {
            let pose = PosePayload::from_payload(payload)?;
            self.status("Receiving Pose...");
            self.sequence
                .begin_pose(&pose, &mut self.registry, &mut self.scene);
            return Ok(());
        }

        let record = self.decode_pose(payload)?;
        let applied = self
            .sequence
            .receive_pose_frame(&record, &mut self.registry, &mut self.scene);
        self.status(format!("Pose: {} ({applied} actors)", record.frame));
        Ok(())
    }

    fn on_pose_frame(&mut self, payload: &[u8]) -> LinkResult<()> {
        let record = self.decode_pose(payload)?;
        let applied = self
            .sequence
            .receive_pose_frame(&record, &mut self.registry, &mut self.scene);
        self.status(format!("Pose Frame: {} ({applied} actors)", record.frame));
        Ok(())
    }

    fn on_sequence(&mut self, payload: &[u8]) -> LinkResult<()> {
        let sequence = SequencePayload::from_payload(payload)?;
        self.sequence
            .begin_receive(&sequence, &mut self.registry, &mut self.scene)?;
        self.status("Receiving Live Sequence...");
        Ok(())
    }

    fn on_sequence_frame(&mut self, payload: &[u8]) -> LinkResult<()> {
        let record = self.decode_pose(payload)?;
        self.sequence
            .receive_frame(&record, &mut self.registry, &mut self.scene)?;
        self.stats.sequence_frames_received += 1;
        Ok(())
    }

    fn on_sequence_end(&mut self, payload: &[u8]) -> LinkResult<()> {
        let end = if payload.is_empty() {
            SequenceEndPayload::default()
        } else {
            SequenceEndPayload::from_payload(payload)?
        };
        let frames = self.sequence.frame_count().unwrap_or(0);

        let actors = self.sequence.finish_receive(&self.registry, &mut self.scene)?;
        tracing::debug!(listed = end.actors.len(), materialized = actors, "sequence end");
        self.status(format!("Live Sequence Complete: {frames} frames"));
        Ok(())
    }

    fn on_character(&mut self, payload: &[u8]) -> LinkResult<()> {
        let character = CharacterPayload::from_payload(payload)?;
        let link_id = LinkId::new(character.link_id.as_str());
        if self.registry.get_or_create(&link_id, &self.scene).is_some() {
            self.status(format!("Character: {} exists!", character.name));
            return Ok(());
        }

        self.status(format!("Receiving Character Import: {}", character.name));
        self.scene.import_character(&character)?;
        self.status(format!("Character Imported: {}", character.name));
        Ok(())
    }

    fn on_character_update(&mut self, payload: &[u8]) -> LinkResult<()> {
        let update = CharacterUpdatePayload::from_payload(payload)?;
        let old = LinkId::new(update.old_link_id.as_str());
        let new = LinkId::new(update.new_link_id.as_str());

        // The old id may only be known to the scene so far
        self.registry.get_or_create(&old, &self.scene);
        self.scene.update_character(&update)?;
        if !self.registry.rename(&old, &update.new_name, &new) {
            return Err(LinkError::UnknownActor(old));
        }
        Ok(())
    }
}

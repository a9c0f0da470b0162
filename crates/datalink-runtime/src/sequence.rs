//! Sequence engine
//!
//! Streams multi-frame animation between the peers. The sending side emits
//! one SEQUENCE_FRAME per tick across the scene's frame range. The receiving
//! side applies every frame live, caches it per actor, and writes the caches
//! into the scene when the sequence ends. Aborted sequences are discarded
//! without writing anything.

use std::collections::BTreeMap;

use datalink_core::{LinkError, LinkId, LinkResult, Template, MAX_SEQUENCE_FRAMES};
use datalink_wire::{ActorPose, PosePayload, PoseRecord, SequencePayload};

use crate::{Actor, ActorRegistry, ActorSampleCache, SceneAdapter};

/// Lifecycle of a sequence session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SequencePhase {
    #[default]
    Idle,
    Streaming,
    /// Caches are being written into the scene
    Finalizing,
}

/// One outbound step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendStep {
    pub frame: u32,
    /// The sequence ends after this frame
    pub last: bool,
}

#[derive(Debug)]
struct SendSession {
    start: u32,
    end: u32,
    frames: u32,
    current: u32,
    actors: Vec<LinkId>,
}

#[derive(Debug)]
struct ReceiveSession {
    start: u32,
    end: u32,
    frames: u32,
    actors: Vec<LinkId>,
    caches: BTreeMap<LinkId, ActorSampleCache>,
    phase: SequencePhase,
}

#[derive(Debug)]
struct PendingPose {
    frame: u32,
    actors: Vec<LinkId>,
}

/// At most one sequence per connection, in either direction
#[derive(Debug, Default)]
pub struct SequenceEngine {
    sending: Option<SendSession>,
    receiving: Option<ReceiveSession>,
    pending_pose: Option<PendingPose>,
}

/// Apply one actor's pose to the scene.
///
/// Channels are matched to the template by position; a bone count that
/// disagrees with the template applies the common prefix only.
pub fn apply_actor_pose<S>(scene: &mut S, actor: &Actor, template: &Template, pose: &ActorPose)
where
    S: SceneAdapter + ?Sized,
{
    if pose.bones.len() != template.bones.len() {
        tracing::warn!(
            link_id = %actor.link_id,
            received = pose.bones.len(),
            expected = template.bones.len(),
            "bone count differs from template"
        );
    }

    scene.apply_root_transform(actor.entity, &pose.root);
    for (name, t) in template.bones.iter().zip(&pose.bones) {
        scene.apply_bone_transform(actor.entity, name, t);
    }
    for (name, w) in template.expressions.iter().zip(&pose.expressions) {
        scene.set_expression_weight(actor.entity, name, *w);
    }
    for (name, w) in template.visemes.iter().zip(&pose.visemes) {
        scene.set_viseme_weight(actor.entity, name, *w);
    }
}

/// Frame count of the inclusive range `start..=end`.
///
/// Empty ranges and ranges longer than [`MAX_SEQUENCE_FRAMES`] are rejected.
pub fn frame_span(start: u32, end: u32) -> LinkResult<u32> {
    if end < start {
        return Err(LinkError::MalformedPayload(format!(
            "sequence range {start}..={end} is empty"
        )));
    }
    let frames = u64::from(end) - u64::from(start) + 1;
    match u32::try_from(frames) {
        Ok(frames) if frames <= MAX_SEQUENCE_FRAMES => Ok(frames),
        _ => Err(LinkError::MalformedPayload(format!(
            "sequence range {start}..={end} spans {frames} frames, limit is {MAX_SEQUENCE_FRAMES}"
        ))),
    }
}

/// Fit sampled weights to the template so the record stays decodable
pub fn conform_pose(pose: &mut ActorPose, template: &Template) {
    pose.expressions.resize(template.expressions.len(), 0.0);
    pose.visemes.resize(template.visemes.len(), 0.0);
}

impl SequenceEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SequencePhase {
        if let Some(session) = &self.receiving {
            return session.phase;
        }
        if self.sending.is_some() {
            return SequencePhase::Streaming;
        }
        SequencePhase::Idle
    }

    pub fn is_active(&self) -> bool {
        self.sending.is_some() || self.receiving.is_some()
    }

    pub fn is_sending(&self) -> bool {
        self.sending.is_some()
    }

    pub fn is_receiving(&self) -> bool {
        self.receiving.is_some()
    }

    /// Inclusive frame range of the active session
    pub fn range(&self) -> Option<(u32, u32)> {
        self.sending
            .as_ref()
            .map(|s| (s.start, s.end))
            .or_else(|| self.receiving.as_ref().map(|r| (r.start, r.end)))
    }

    /// Number of frames in the active session
    pub fn frame_count(&self) -> Option<u32> {
        self.sending
            .as_ref()
            .map(|s| s.frames)
            .or_else(|| self.receiving.as_ref().map(|r| r.frames))
    }

    /// Receive cache for one actor of the active session
    pub fn cache(&self, link_id: &LinkId) -> Option<&ActorSampleCache> {
        self.receiving.as_ref()?.caches.get(link_id)
    }

    // Sending

    /// Open an outbound session over `start..=end`
    pub fn begin_send(&mut self, start: u32, end: u32, actors: Vec<LinkId>) -> LinkResult<()> {
        if self.is_active() {
            return Err(LinkError::SequenceActive);
        }
        let frames = frame_span(start, end)?;
        tracing::info!(start, end, actors = actors.len(), "sequence send started");
        self.sending = Some(SendSession {
            start,
            end,
            frames,
            current: start,
            actors,
        });
        Ok(())
    }

    pub fn sending_actors(&self) -> &[LinkId] {
        self.sending.as_ref().map(|s| s.actors.as_slice()).unwrap_or(&[])
    }

    /// Next frame to send; the session closes after the last one
    pub fn next_send_step(&mut self) -> Option<SendStep> {
        let session = self.sending.as_mut()?;
        let frame = session.current.min(session.end);
        let last = frame >= session.end;
        if last {
            tracing::info!(start = session.start, end = session.end, "sequence send finished");
            self.sending = None;
        } else {
            session.current = frame + 1;
        }
        Some(SendStep { frame, last })
    }

    pub fn cancel_send(&mut self) -> bool {
        self.sending.take().is_some()
    }

    // Receiving

    /// Open an inbound session from a SEQUENCE payload.
    ///
    /// Returns the number of actors with a local entity.
    pub fn begin_receive<S>(
        &mut self,
        payload: &SequencePayload,
        registry: &mut ActorRegistry,
        scene: &mut S,
    ) -> LinkResult<usize>
    where
        S: SceneAdapter + ?Sized,
    {
        if self.sending.is_some() {
            return Err(LinkError::SequenceActive);
        }
        let frames = frame_span(payload.start_frame, payload.end_frame)?;
        if self.receiving.is_some() {
            tracing::warn!("new sequence replaces unfinished one");
            self.abort(registry, scene);
        }

        let mut session = ReceiveSession {
            start: payload.start_frame,
            end: payload.end_frame,
            frames,
            actors: Vec::with_capacity(payload.actors.len()),
            caches: BTreeMap::new(),
            phase: SequencePhase::Streaming,
        };

        for entry in &payload.actors {
            let link_id = LinkId::new(entry.link_id.as_str());
            let Some(actor) = registry.get_or_create(&link_id, &*scene) else {
                tracing::warn!(error = %LinkError::UnknownActor(link_id), "skipping sequence actor");
                continue;
            };
            scene.prepare_sample_cache(actor, frames);
            if let Some(template) = actor.template() {
                session.caches.insert(
                    link_id.clone(),
                    ActorSampleCache::new(link_id.clone(), template, session.start, frames),
                );
            }
            session.actors.push(link_id);
        }

        scene.set_frame_range(session.start, session.end);
        scene.set_current_frame(session.start);
        tracing::info!(
            start = session.start,
            end = session.end,
            actors = session.actors.len(),
            "sequence receive started"
        );

        let count = session.actors.len();
        self.receiving = Some(session);
        Ok(count)
    }

    /// Apply and cache one SEQUENCE_FRAME record.
    ///
    /// Returns the number of actors applied.
    pub fn receive_frame<S>(
        &mut self,
        record: &PoseRecord,
        registry: &mut ActorRegistry,
        scene: &mut S,
    ) -> LinkResult<usize>
    where
        S: SceneAdapter + ?Sized,
    {
        let session = self.receiving.as_mut().ok_or(LinkError::NoSequence)?;
        let frame = record.frame;
        if frame < session.start || frame > session.end {
            return Err(LinkError::FrameOutOfRange {
                frame,
                start: session.start,
                end: session.end,
            });
        }

        scene.set_current_frame(frame);
        let frames = session.frames;
        let mut applied = 0;

        for pose in &record.actors {
            let Some(actor) = registry.get_or_create(&pose.link_id, &*scene) else {
                tracing::warn!(error = %LinkError::UnknownActor(pose.link_id.clone()), frame, "skipping actor");
                continue;
            };
            let Some(template) = actor.template() else {
                tracing::warn!(error = %LinkError::MissingTemplate(pose.link_id.clone()), frame, "skipping actor");
                continue;
            };

            apply_actor_pose(scene, actor, template, pose);

            let start = session.start;
            let cache = session
                .caches
                .entry(pose.link_id.clone())
                .or_insert_with(|| ActorSampleCache::new(pose.link_id.clone(), template, start, frames));
            cache.write(frame, pose);
            if !session.actors.contains(&pose.link_id) {
                session.actors.push(pose.link_id.clone());
            }
            applied += 1;
        }

        tracing::trace!(frame, applied, "sequence frame");
        Ok(applied)
    }

    /// Write every cache into the scene and close the session.
    ///
    /// Returns the number of actors materialized.
    pub fn finish_receive<S>(&mut self, registry: &ActorRegistry, scene: &mut S) -> LinkResult<usize>
    where
        S: SceneAdapter + ?Sized,
    {
        let session = self.receiving.as_mut().ok_or(LinkError::NoSequence)?;
        session.phase = SequencePhase::Finalizing;

        let mut materialized = 0;
        for link_id in &session.actors {
            let Some(actor) = registry.get(link_id) else {
                continue;
            };
            let cache = match session.caches.get(link_id) {
                Some(cache) => cache.clone(),
                None => match actor.template() {
                    Some(template) => {
                        ActorSampleCache::new(link_id.clone(), template, session.start, session.frames)
                    }
                    None => {
                        tracing::warn!(link_id = %link_id, "no template by sequence end, discarding");
                        scene.discard_cache(actor);
                        continue;
                    }
                },
            };

            let missing = cache.frame_count() as usize - cache.written_count();
            if missing > 0 {
                tracing::warn!(link_id = %link_id, missing, "sequence ended with missing frames");
            }
            scene.materialize_cache(actor, &cache);
            materialized += 1;
        }

        let (start, end) = (session.start, session.end);
        self.receiving = None;
        scene.set_current_frame(start);
        tracing::info!(start, end, actors = materialized, "sequence receive complete");
        Ok(materialized)
    }

    /// Drop any session without writing to the scene
    pub fn abort<S>(&mut self, registry: &ActorRegistry, scene: &mut S)
    where
        S: SceneAdapter + ?Sized,
    {
        if self.cancel_send() {
            tracing::info!("sequence send aborted");
        }

        let mut discard: Vec<LinkId> = Vec::new();
        if let Some(session) = self.receiving.take() {
            tracing::info!(
                start = session.start,
                end = session.end,
                "sequence receive aborted"
            );
            discard.extend(session.actors);
        }
        if let Some(pose) = self.pending_pose.take() {
            discard.extend(pose.actors);
        }

        for link_id in &discard {
            if let Some(actor) = registry.get(link_id) {
                scene.discard_cache(actor);
            }
        }
    }

    // Single pose

    /// POSE announcement: prepare one-frame caches for the listed actors
    pub fn begin_pose<S>(
        &mut self,
        payload: &PosePayload,
        registry: &mut ActorRegistry,
        scene: &mut S,
    ) -> usize
    where
        S: SceneAdapter + ?Sized,
    {
        let mut actors = Vec::with_capacity(payload.actors.len());
        for entry in &payload.actors {
            let link_id = LinkId::new(entry.link_id.as_str());
            if let Some(actor) = registry.get_or_create(&link_id, &*scene) {
                scene.prepare_sample_cache(actor, 1);
                actors.push(link_id);
            }
        }
        scene.set_current_frame(payload.frame);

        let count = actors.len();
        self.pending_pose = Some(PendingPose {
            frame: payload.frame,
            actors,
        });
        count
    }

    /// POSE_FRAME: apply and materialize a single frame at once
    pub fn receive_pose_frame<S>(
        &mut self,
        record: &PoseRecord,
        registry: &mut ActorRegistry,
        scene: &mut S,
    ) -> usize
    where
        S: SceneAdapter + ?Sized,
    {
        if let Some(pending) = self.pending_pose.take() {
            if pending.frame != record.frame {
                tracing::debug!(announced = pending.frame, received = record.frame, "pose frame differs");
            }
        }

        let mut applied = 0;
        for pose in &record.actors {
            let Some(actor) = registry.get_or_create(&pose.link_id, &*scene) else {
                tracing::warn!(error = %LinkError::UnknownActor(pose.link_id.clone()), "skipping pose");
                continue;
            };
            let Some(template) = actor.template() else {
                continue;
            };

            apply_actor_pose(scene, actor, template, pose);
            let mut cache = ActorSampleCache::new(pose.link_id.clone(), template, record.frame, 1);
            cache.write(record.frame, pose);
            scene.materialize_cache(actor, &cache);
            applied += 1;
        }

        scene.set_current_frame(record.frame);
        applied
    }
}

//! Per-actor sample caches
//!
//! Samples are stored per channel, one slot per frame of the session range,
//! and indexed by `frame - start_frame`. Unwritten slots hold identity
//! transforms and zero weights.

use datalink_core::{LinkId, Template, Transform};
use datalink_wire::ActorPose;

/// Cached samples for one actor across a frame range
#[derive(Clone, Debug, PartialEq)]
pub struct ActorSampleCache {
    pub link_id: LinkId,
    start_frame: u32,
    roots: Vec<Transform>,
    /// `[bone][frame]`
    bones: Vec<Vec<Transform>>,
    /// `[expression][frame]`
    expressions: Vec<Vec<f32>>,
    /// `[viseme][frame]`
    visemes: Vec<Vec<f32>>,
    written: Vec<bool>,
}

impl ActorSampleCache {
    pub fn new(link_id: LinkId, template: &Template, start_frame: u32, frames: u32) -> Self {
        let frames = frames as usize;
        let layout = template.layout();
        ActorSampleCache {
            link_id,
            start_frame,
            roots: vec![Transform::IDENTITY; frames],
            bones: vec![vec![Transform::IDENTITY; frames]; layout.bones],
            expressions: vec![vec![0.0; frames]; layout.expressions],
            visemes: vec![vec![0.0; frames]; layout.visemes],
            written: vec![false; frames],
        }
    }

    pub fn start_frame(&self) -> u32 {
        self.start_frame
    }

    /// Last frame covered, inclusive
    pub fn end_frame(&self) -> u32 {
        self.start_frame + self.frame_count().saturating_sub(1)
    }

    pub fn frame_count(&self) -> u32 {
        self.written.len() as u32
    }

    fn slot(&self, frame: u32) -> Option<usize> {
        let index = frame.checked_sub(self.start_frame)? as usize;
        (index < self.written.len()).then_some(index)
    }

    /// Store one sample, overwriting any earlier sample for `frame`.
    ///
    /// Channels beyond the template layout are ignored. Returns false if
    /// `frame` is outside the cached range.
    pub fn write(&mut self, frame: u32, pose: &ActorPose) -> bool {
        let Some(i) = self.slot(frame) else {
            return false;
        };

        self.roots[i] = pose.root;
        for (track, t) in self.bones.iter_mut().zip(&pose.bones) {
            track[i] = *t;
        }
        for (track, w) in self.expressions.iter_mut().zip(&pose.expressions) {
            track[i] = *w;
        }
        for (track, w) in self.visemes.iter_mut().zip(&pose.visemes) {
            track[i] = *w;
        }
        self.written[i] = true;
        true
    }

    pub fn is_written(&self, frame: u32) -> bool {
        self.slot(frame).map_or(false, |i| self.written[i])
    }

    pub fn written_count(&self) -> usize {
        self.written.iter().filter(|w| **w).count()
    }

    /// Every frame in range has a sample
    pub fn is_complete(&self) -> bool {
        self.written.iter().all(|w| *w)
    }

    /// Frames still holding placeholders
    pub fn missing_frames(&self) -> Vec<u32> {
        self.written
            .iter()
            .enumerate()
            .filter(|(_, w)| !**w)
            .map(|(i, _)| self.start_frame + i as u32)
            .collect()
    }

    pub fn root_track(&self) -> &[Transform] {
        &self.roots
    }

    pub fn bone_track(&self, bone: usize) -> Option<&[Transform]> {
        self.bones.get(bone).map(Vec::as_slice)
    }

    pub fn expression_track(&self, expression: usize) -> Option<&[f32]> {
        self.expressions.get(expression).map(Vec::as_slice)
    }

    pub fn viseme_track(&self, viseme: usize) -> Option<&[f32]> {
        self.visemes.get(viseme).map(Vec::as_slice)
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn expression_count(&self) -> usize {
        self.expressions.len()
    }

    pub fn viseme_count(&self) -> usize {
        self.visemes.len()
    }
}

//! Scene adapter boundary
//!
//! The link never touches the host application's scene directly. Everything
//! it needs to read or change goes through [`SceneAdapter`]: entity lookup,
//! live pose application, pose sampling, sample cache lifecycle, and the
//! asset delegates behind the import and sync opcodes.

use datalink_core::{EntityId, LinkId, LinkResult, Template, Transform};
use datalink_wire::{
    ActorPose, CameraSyncPayload, CharacterPayload, CharacterUpdatePayload, MorphPayload,
    RigifyPayload,
};

use crate::{Actor, ActorSampleCache};

/// Local scene entity bound to a link id
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityInfo {
    pub entity: EntityId,
    pub name: String,
}

impl EntityInfo {
    pub fn new(entity: EntityId, name: impl Into<String>) -> Self {
        EntityInfo {
            entity,
            name: name.into(),
        }
    }
}

/// Host scene operations used by the link
pub trait SceneAdapter {
    /// Local entity carrying `link_id`, if any
    fn find_entity(&self, link_id: &LinkId) -> Option<EntityInfo>;

    /// Channel layout of a local actor, used when sending its template
    fn local_template(&self, actor: &Actor) -> Template;

    fn apply_root_transform(&mut self, entity: EntityId, transform: &Transform);

    fn apply_bone_transform(&mut self, entity: EntityId, bone: &str, transform: &Transform);

    fn set_expression_weight(&mut self, entity: EntityId, expression: &str, weight: f32);

    fn set_viseme_weight(&mut self, entity: EntityId, viseme: &str, weight: f32);

    /// Pose of `actor` at the current frame, channels in template order
    fn sample_current_pose(&mut self, actor: &Actor) -> ActorPose;

    /// Get ready to receive `frames` samples for `actor`
    fn prepare_sample_cache(&mut self, actor: &Actor, frames: u32);

    /// Write cached samples into the scene's animation data
    fn materialize_cache(&mut self, actor: &Actor, cache: &ActorSampleCache);

    /// Drop anything set up by `prepare_sample_cache`
    fn discard_cache(&mut self, actor: &Actor);

    /// Inclusive playback range
    fn frame_range(&self) -> (u32, u32);

    fn set_frame_range(&mut self, start: u32, end: u32);

    fn fps(&self) -> f64;

    fn current_frame(&self) -> u32;

    fn set_current_frame(&mut self, frame: u32);

    // Asset and scene-sync delegates

    fn import_character(&mut self, _payload: &CharacterPayload) -> LinkResult<()> {
        Ok(())
    }

    fn import_prop(&mut self, _payload: &CharacterPayload, _update: bool) -> LinkResult<()> {
        Ok(())
    }

    fn update_character(&mut self, _payload: &CharacterUpdatePayload) -> LinkResult<()> {
        Ok(())
    }

    fn import_morph(&mut self, _payload: &MorphPayload, _update: bool) -> LinkResult<()> {
        Ok(())
    }

    fn rigify(&mut self, _payload: &RigifyPayload) -> LinkResult<()> {
        Ok(())
    }

    fn apply_lights(&mut self, _lights: &serde_json::Value) -> LinkResult<()> {
        Ok(())
    }

    fn apply_camera_sync(&mut self, _payload: &CameraSyncPayload) -> LinkResult<()> {
        Ok(())
    }

    /// Current viewport camera, if the scene has one
    fn view_camera(&self) -> Option<CameraSyncPayload> {
        None
    }

    /// Status line for the user
    fn status(&mut self, _text: &str) {}
}

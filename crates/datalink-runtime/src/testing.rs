//! In-crate scene stub for unit tests
//!
//! Records only what the runtime's own tests inspect. The full recording
//! scene with asset delegates lives in `datalink-test`.

use std::collections::HashMap;

use datalink_core::{EntityId, LinkId, Template, Transform};
use datalink_wire::ActorPose;

use crate::{Actor, ActorSampleCache, EntityInfo, SceneAdapter};

#[derive(Debug, Default)]
pub struct StubScene {
    pub entities: HashMap<LinkId, EntityInfo>,
    pub roots: usize,
    pub bones: usize,
    pub expressions: Vec<(String, f32)>,
    pub visemes: Vec<(String, f32)>,
    pub prepared: Vec<(LinkId, u32)>,
    pub materialized: Vec<ActorSampleCache>,
    pub discarded: Vec<LinkId>,
    pub range: (u32, u32),
    pub frame: u32,
}

impl StubScene {
    pub fn with_actor(link_id: &str, name: &str) -> Self {
        let mut scene = StubScene::default();
        let entity = EntityId::new(1);
        scene
            .entities
            .insert(LinkId::from(link_id), EntityInfo::new(entity, name));
        scene
    }
}

impl SceneAdapter for StubScene {
    fn find_entity(&self, link_id: &LinkId) -> Option<EntityInfo> {
        self.entities.get(link_id).cloned()
    }

    fn local_template(&self, _actor: &Actor) -> Template {
        Template::default()
    }

    fn apply_root_transform(&mut self, _entity: EntityId, _transform: &Transform) {
        self.roots += 1;
    }

    fn apply_bone_transform(&mut self, _entity: EntityId, _bone: &str, _transform: &Transform) {
        self.bones += 1;
    }

    fn set_expression_weight(&mut self, _entity: EntityId, expression: &str, weight: f32) {
        self.expressions.push((expression.to_string(), weight));
    }

    fn set_viseme_weight(&mut self, _entity: EntityId, viseme: &str, weight: f32) {
        self.visemes.push((viseme.to_string(), weight));
    }

    fn sample_current_pose(&mut self, actor: &Actor) -> ActorPose {
        ActorPose::new(actor.name.clone(), actor.link_id.clone())
    }

    fn prepare_sample_cache(&mut self, actor: &Actor, frames: u32) {
        self.prepared.push((actor.link_id.clone(), frames));
    }

    fn materialize_cache(&mut self, _actor: &Actor, cache: &ActorSampleCache) {
        self.materialized.push(cache.clone());
    }

    fn discard_cache(&mut self, actor: &Actor) {
        self.discarded.push(actor.link_id.clone());
    }

    fn frame_range(&self) -> (u32, u32) {
        self.range
    }

    fn set_frame_range(&mut self, start: u32, end: u32) {
        self.range = (start, end);
    }

    fn fps(&self) -> f64 {
        30.0
    }

    fn current_frame(&self) -> u32 {
        self.frame
    }

    fn set_current_frame(&mut self, frame: u32) {
        self.frame = frame;
    }
}

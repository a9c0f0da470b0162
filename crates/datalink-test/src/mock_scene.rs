//! Recording scene adapter

use std::collections::HashMap;

use datalink_core::{EntityId, LinkId, LinkResult, Template, Transform, Vec3};
use datalink_runtime::{Actor, ActorSampleCache, EntityInfo, SceneAdapter};
use datalink_wire::{
    ActorPose, CameraSyncPayload, CharacterPayload, CharacterUpdatePayload, MorphPayload,
    RigifyPayload,
};

/// In-memory scene that records every call the link makes.
///
/// Sampled poses are derived from the current frame so a receiver can tell
/// frames apart: root x is the frame number, expression weights are
/// `frame / 100` and viseme weights `frame / 200`.
#[derive(Debug)]
pub struct MockScene {
    pub entities: HashMap<LinkId, EntityInfo>,
    pub templates: HashMap<LinkId, Template>,
    next_entity: u64,

    pub roots: Vec<(EntityId, Transform)>,
    pub bones: Vec<(EntityId, String, Transform)>,
    pub expressions: Vec<(EntityId, String, f32)>,
    pub visemes: Vec<(EntityId, String, f32)>,

    pub prepared: Vec<(LinkId, u32)>,
    pub materialized: Vec<(LinkId, ActorSampleCache)>,
    pub discarded: Vec<LinkId>,

    pub characters: Vec<CharacterPayload>,
    pub props: Vec<(CharacterPayload, bool)>,
    pub updates: Vec<CharacterUpdatePayload>,
    pub morphs: Vec<(MorphPayload, bool)>,
    pub rigified: Vec<RigifyPayload>,
    pub lights: Vec<serde_json::Value>,
    pub camera_syncs: Vec<CameraSyncPayload>,
    pub camera: Option<CameraSyncPayload>,
    pub statuses: Vec<String>,

    pub range: (u32, u32),
    pub frame: u32,
    pub fps: f64,
}

impl Default for MockScene {
    fn default() -> Self {
        MockScene {
            entities: HashMap::new(),
            templates: HashMap::new(),
            next_entity: 1,
            roots: Vec::new(),
            bones: Vec::new(),
            expressions: Vec::new(),
            visemes: Vec::new(),
            prepared: Vec::new(),
            materialized: Vec::new(),
            discarded: Vec::new(),
            characters: Vec::new(),
            props: Vec::new(),
            updates: Vec::new(),
            morphs: Vec::new(),
            rigified: Vec::new(),
            lights: Vec::new(),
            camera_syncs: Vec::new(),
            camera: None,
            statuses: Vec::new(),
            range: (1, 250),
            frame: 1,
            fps: 30.0,
        }
    }
}

impl MockScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity carrying `link_id` with the given channel layout
    pub fn with_actor(mut self, link_id: &str, name: &str, template: Template) -> Self {
        self.add_actor(link_id, name, template);
        self
    }

    pub fn add_actor(&mut self, link_id: &str, name: &str, template: Template) -> EntityId {
        let entity = EntityId::new(self.next_entity);
        self.next_entity += 1;
        self.entities
            .insert(LinkId::from(link_id), EntityInfo::new(entity, name));
        self.templates.insert(LinkId::from(link_id), template);
        entity
    }

    pub fn entity(&self, link_id: &str) -> Option<EntityId> {
        self.entities.get(&LinkId::from(link_id)).map(|e| e.entity)
    }

    /// Materialized cache for `link_id`, most recent first
    pub fn materialized_cache(&self, link_id: &str) -> Option<&ActorSampleCache> {
        let id = LinkId::from(link_id);
        self.materialized
            .iter()
            .rev()
            .find(|(l, _)| *l == id)
            .map(|(_, cache)| cache)
    }

    /// Viseme weights set on `entity`, in call order
    pub fn visemes_for(&self, entity: EntityId) -> Vec<(String, f32)> {
        self.visemes
            .iter()
            .filter(|(e, _, _)| *e == entity)
            .map(|(_, name, w)| (name.clone(), *w))
            .collect()
    }

    pub fn expressions_for(&self, entity: EntityId) -> Vec<(String, f32)> {
        self.expressions
            .iter()
            .filter(|(e, _, _)| *e == entity)
            .map(|(_, name, w)| (name.clone(), *w))
            .collect()
    }

    pub fn has_status(&self, text: &str) -> bool {
        self.statuses.iter().any(|s| s == text)
    }
}

/// Template with numbered channels
pub fn numbered_template(bones: usize, expressions: &[&str], visemes: &[&str]) -> Template {
    Template::new(
        (0..bones).map(|i| format!("bone_{i:02}")).collect(),
        expressions.iter().map(|s| s.to_string()).collect(),
        visemes.iter().map(|s| s.to_string()).collect(),
        Vec::new(),
    )
}

impl SceneAdapter for MockScene {
    fn find_entity(&self, link_id: &LinkId) -> Option<EntityInfo> {
        self.entities.get(link_id).cloned()
    }

    fn local_template(&self, actor: &Actor) -> Template {
        self.templates
            .get(&actor.link_id)
            .cloned()
            .unwrap_or_default()
    }

    fn apply_root_transform(&mut self, entity: EntityId, transform: &Transform) {
        self.roots.push((entity, *transform));
    }

    fn apply_bone_transform(&mut self, entity: EntityId, bone: &str, transform: &Transform) {
        self.bones.push((entity, bone.to_string(), *transform));
    }

    fn set_expression_weight(&mut self, entity: EntityId, expression: &str, weight: f32) {
        self.expressions
            .push((entity, expression.to_string(), weight));
    }

    fn set_viseme_weight(&mut self, entity: EntityId, viseme: &str, weight: f32) {
        self.visemes.push((entity, viseme.to_string(), weight));
    }

    fn sample_current_pose(&mut self, actor: &Actor) -> ActorPose {
        let template = self.local_template(actor);
        let f = self.frame as f32;

        let mut pose = ActorPose::new(actor.name.clone(), actor.link_id.clone());
        pose.root.translation = Vec3::new(f, 0.0, 0.0);
        pose.bones = vec![Transform::IDENTITY; template.bones.len()];
        pose.expressions = vec![f / 100.0; template.expressions.len()];
        pose.visemes = vec![f / 200.0; template.visemes.len()];
        pose
    }

    fn prepare_sample_cache(&mut self, actor: &Actor, frames: u32) {
        self.prepared.push((actor.link_id.clone(), frames));
    }

    fn materialize_cache(&mut self, actor: &Actor, cache: &ActorSampleCache) {
        self.materialized
            .push((actor.link_id.clone(), cache.clone()));
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
        self.fps
    }

    fn current_frame(&self) -> u32 {
        self.frame
    }

    fn set_current_frame(&mut self, frame: u32) {
        self.frame = frame;
    }

    fn import_character(&mut self, payload: &CharacterPayload) -> LinkResult<()> {
        self.characters.push(payload.clone());
        Ok(())
    }

    fn import_prop(&mut self, payload: &CharacterPayload, update: bool) -> LinkResult<()> {
        self.props.push((payload.clone(), update));
        Ok(())
    }

    fn update_character(&mut self, payload: &CharacterUpdatePayload) -> LinkResult<()> {
        let old = LinkId::new(payload.old_link_id.as_str());
        if let Some(mut info) = self.entities.remove(&old) {
            info.name = payload.new_name.clone();
            self.entities
                .insert(LinkId::new(payload.new_link_id.as_str()), info);
        }
        if let Some(template) = self.templates.remove(&old) {
            self.templates
                .insert(LinkId::new(payload.new_link_id.as_str()), template);
        }
        self.updates.push(payload.clone());
        Ok(())
    }

    fn import_morph(&mut self, payload: &MorphPayload, update: bool) -> LinkResult<()> {
        self.morphs.push((payload.clone(), update));
        Ok(())
    }

    fn rigify(&mut self, payload: &RigifyPayload) -> LinkResult<()> {
        self.rigified.push(payload.clone());
        Ok(())
    }

    fn apply_lights(&mut self, lights: &serde_json::Value) -> LinkResult<()> {
        self.lights.push(lights.clone());
        Ok(())
    }

    fn apply_camera_sync(&mut self, payload: &CameraSyncPayload) -> LinkResult<()> {
        self.camera_syncs.push(payload.clone());
        Ok(())
    }

    fn view_camera(&self) -> Option<CameraSyncPayload> {
        self.camera.clone()
    }

    fn status(&mut self, text: &str) {
        self.statuses.push(text.to_string());
    }
}

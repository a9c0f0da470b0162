//! Actor registry
//!
//! Maps link ids to local actors for the lifetime of one connection.
//! Templates are kept by link id on their own so a peer's pose records stay
//! decodable even for actors this side has no entity for.

use std::collections::HashMap;

use datalink_core::{ChannelLayout, EntityId, LinkId, Template};

use crate::SceneAdapter;

/// Character shared with the peer
#[derive(Clone, Debug, PartialEq)]
pub struct Actor {
    pub name: String,
    pub link_id: LinkId,
    /// Local scene entity
    pub entity: EntityId,
    template: Option<Template>,
}

impl Actor {
    pub fn new(name: impl Into<String>, link_id: LinkId, entity: EntityId) -> Self {
        Actor {
            name: name.into(),
            link_id,
            entity,
            template: None,
        }
    }

    pub fn template(&self) -> Option<&Template> {
        self.template.as_ref()
    }

    pub fn has_template(&self) -> bool {
        self.template.is_some()
    }

    pub fn layout(&self) -> Option<ChannelLayout> {
        self.template.as_ref().map(Template::layout)
    }
}

/// Link id -> actor table
#[derive(Debug, Default)]
pub struct ActorRegistry {
    actors: HashMap<LinkId, Actor>,
    templates: HashMap<LinkId, Template>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, link_id: &LinkId) -> Option<&Actor> {
        self.actors.get(link_id)
    }

    /// Registered actor for `link_id`, registering it first if the scene has
    /// an entity with that id.
    pub fn get_or_create<S>(&mut self, link_id: &LinkId, scene: &S) -> Option<&Actor>
    where
        S: SceneAdapter + ?Sized,
    {
        if !self.actors.contains_key(link_id) {
            let info = scene.find_entity(link_id)?;
            let mut actor = Actor::new(info.name, link_id.clone(), info.entity);
            actor.template = self.templates.get(link_id).cloned();
            tracing::debug!(link_id = %link_id, name = %actor.name, "actor registered");
            self.actors.insert(link_id.clone(), actor);
        }
        self.actors.get(link_id)
    }

    /// Record the channel layout negotiated for `link_id`.
    ///
    /// Returns false if the same template was already recorded.
    pub fn set_template(&mut self, link_id: &LinkId, template: Template) -> bool {
        if self.templates.get(link_id) == Some(&template) {
            return false;
        }
        if let Some(actor) = self.actors.get_mut(link_id) {
            actor.template = Some(template.clone());
        }
        tracing::debug!(
            link_id = %link_id,
            bones = template.bones.len(),
            expressions = template.expressions.len(),
            visemes = template.visemes.len(),
            "template recorded"
        );
        self.templates.insert(link_id.clone(), template);
        true
    }

    pub fn template(&self, link_id: &LinkId) -> Option<&Template> {
        self.templates.get(link_id)
    }

    /// Layout lookup for pose decoding
    pub fn layout(&self, link_id: &LinkId) -> Option<ChannelLayout> {
        self.templates.get(link_id).map(Template::layout)
    }

    /// Move an actor to a new name and link id, keeping its template
    pub fn rename(&mut self, old_link_id: &LinkId, new_name: &str, new_link_id: &LinkId) -> bool {
        let template = self.templates.remove(old_link_id);
        let actor = self.actors.remove(old_link_id);
        let found = template.is_some() || actor.is_some();

        if let Some(template) = template {
            self.templates.insert(new_link_id.clone(), template);
        }
        if let Some(mut actor) = actor {
            actor.name = new_name.to_string();
            actor.link_id = new_link_id.clone();
            self.actors.insert(new_link_id.clone(), actor);
        }

        if found {
            tracing::info!(old = %old_link_id, new = %new_link_id, name = new_name, "actor renamed");
        }
        found
    }

    pub fn remove(&mut self, link_id: &LinkId) -> Option<Actor> {
        self.templates.remove(link_id);
        self.actors.remove(link_id)
    }

    /// Forget everything negotiated with the current peer
    pub fn reset(&mut self) {
        self.actors.clear();
        self.templates.clear();
    }

    pub fn actors(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values()
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}

//! JSON payload schemas
//!
//! Field names follow the wire exactly, including the capitalized HELLO keys.

use serde::{Deserialize, Serialize};

use datalink_core::{LinkResult, Template};

use crate::{decode_json, encode_json};

/// Typed JSON payload helpers
pub trait JsonPayload: Serialize + for<'de> Deserialize<'de> + Sized {
    fn to_payload(&self) -> LinkResult<Vec<u8>> {
        encode_json(self)
    }

    fn from_payload(bytes: &[u8]) -> LinkResult<Self> {
        decode_json(bytes)
    }
}

/// HELLO: identity of the application on each end
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Hello {
    #[serde(rename = "Application")]
    pub application: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Path", default)]
    pub path: String,
    #[serde(rename = "Exe", default)]
    pub exe: String,
}

/// NOTIFY: human readable status text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notify {
    pub message: String,
}

/// Name and link id pair used by several payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRef {
    pub name: String,
    pub link_id: String,
}

impl ActorRef {
    pub fn new(name: impl Into<String>, link_id: impl Into<String>) -> Self {
        ActorRef {
            name: name.into(),
            link_id: link_id.into(),
        }
    }
}

/// One actor entry of a TEMPLATE payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorTemplate {
    pub name: String,
    pub link_id: String,
    #[serde(default)]
    pub bones: Vec<String>,
    #[serde(default)]
    pub expressions: Vec<String>,
    #[serde(default)]
    pub visemes: Vec<String>,
    #[serde(default)]
    pub morphs: Vec<String>,
}

impl ActorTemplate {
    pub fn new(name: impl Into<String>, link_id: impl Into<String>, template: &Template) -> Self {
        ActorTemplate {
            name: name.into(),
            link_id: link_id.into(),
            bones: template.bones.clone(),
            expressions: template.expressions.clone(),
            visemes: template.visemes.clone(),
            morphs: template.morphs.clone(),
        }
    }

    pub fn template(&self) -> Template {
        Template::new(
            self.bones.clone(),
            self.expressions.clone(),
            self.visemes.clone(),
            self.morphs.clone(),
        )
    }
}

/// TEMPLATE: channel layouts for the actors about to be posed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatePayload {
    pub count: usize,
    pub actors: Vec<ActorTemplate>,
}

impl TemplatePayload {
    pub fn new(actors: Vec<ActorTemplate>) -> Self {
        TemplatePayload {
            count: actors.len(),
            actors,
        }
    }
}

/// SEQUENCE: start of a multi-frame stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencePayload {
    pub fps: f64,
    pub start_time: f64,
    pub end_time: f64,
    pub start_frame: u32,
    pub end_frame: u32,
    pub actors: Vec<ActorRef>,
}

impl SequencePayload {
    /// Build from a frame range; times derive from the frame rate
    pub fn new(fps: f64, start_frame: u32, end_frame: u32, actors: Vec<ActorRef>) -> Self {
        let rate = if fps > 0.0 { fps } else { 1.0 };
        SequencePayload {
            fps,
            start_time: f64::from(start_frame) / rate,
            end_time: f64::from(end_frame) / rate,
            start_frame,
            end_frame,
            actors,
        }
    }

    /// Inclusive frame count, saturating at `u32::MAX`
    pub fn frame_count(&self) -> u32 {
        self.end_frame
            .saturating_sub(self.start_frame)
            .saturating_add(1)
    }
}

/// POSE: single-frame pose announcement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosePayload {
    pub frame: u32,
    pub actors: Vec<ActorRef>,
}

/// SEQUENCE_END: stream finished
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SequenceEndPayload {
    #[serde(default)]
    pub actors: Vec<ActorRef>,
}

/// CHARACTER / PROP: an exported asset ready for import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterPayload {
    pub path: String,
    pub name: String,
    pub link_id: String,
}

/// CHARACTER_UPDATE: rename and/or re-id an actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterUpdatePayload {
    pub old_name: String,
    pub new_name: String,
    pub old_link_id: String,
    pub new_link_id: String,
}

/// MORPH / MORPH_UPDATE: an exported morph mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphPayload {
    pub path: String,
    #[serde(default)]
    pub key_path: String,
    pub name: String,
    pub link_id: String,
    #[serde(default)]
    pub morph_name: String,
    #[serde(default)]
    pub morph_path: String,
}

/// RIGIFY: request to build a control rig for an actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigifyPayload {
    pub name: String,
    pub link_id: String,
}

/// Viewport camera description used by CAMERA_SYNC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewCamera {
    pub link_id: String,
    pub name: String,
    pub loc: [f32; 3],
    pub rot: [f32; 4],
    pub sca: [f32; 3],
    pub focal_length: f32,
}

/// CAMERA_SYNC: align the viewport with the peer's camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSyncPayload {
    pub view_camera: ViewCamera,
    pub pivot: [f32; 3],
}

impl JsonPayload for Hello {}
impl JsonPayload for Notify {}
impl JsonPayload for TemplatePayload {}
impl JsonPayload for SequencePayload {}
impl JsonPayload for PosePayload {}
impl JsonPayload for SequenceEndPayload {}
impl JsonPayload for CharacterPayload {}
impl JsonPayload for CharacterUpdatePayload {}
impl JsonPayload for MorphPayload {}
impl JsonPayload for RigifyPayload {}
impl JsonPayload for CameraSyncPayload {}

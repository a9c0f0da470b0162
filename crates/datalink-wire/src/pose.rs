//! Binary pose record
//!
//! Layout (all big-endian):
//! - actor_count: u32, frame: u32
//! - per actor:
//!   - name: packed string, link_id: packed string
//!   - root transform: 10 x f32
//!   - bone_count: u32, then bone_count x 10 x f32 in template bone order
//!   - one f32 per template expression
//!   - one f32 per template viseme
//!
//! Translations travel in centimeters: multiplied by 100 on encode and
//! divided by 100 on decode.

use datalink_core::{ChannelLayout, LinkError, LinkId, LinkResult, Transform, Vec3};

use crate::{put_floats, put_string, unpack_floats, unpack_string, unpack_u32};

/// Scene units to wire units
pub const TRANSLATION_SCALE: f32 = 100.0;

/// Pose of one actor at one frame
#[derive(Debug, Clone, PartialEq)]
pub struct ActorPose {
    pub name: String,
    pub link_id: LinkId,
    pub root: Transform,
    /// Bone transforms in template order
    pub bones: Vec<Transform>,
    /// Expression weights in template order
    pub expressions: Vec<f32>,
    /// Viseme weights in template order
    pub visemes: Vec<f32>,
}

impl ActorPose {
    pub fn new(name: impl Into<String>, link_id: LinkId) -> Self {
        ActorPose {
            name: name.into(),
            link_id,
            root: Transform::IDENTITY,
            bones: Vec::new(),
            expressions: Vec::new(),
            visemes: Vec::new(),
        }
    }

    pub fn layout(&self) -> ChannelLayout {
        ChannelLayout {
            bones: self.bones.len(),
            expressions: self.expressions.len(),
            visemes: self.visemes.len(),
        }
    }
}

/// One frame of poses for any number of actors
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PoseRecord {
    pub frame: u32,
    pub actors: Vec<ActorPose>,
}

fn put_transform(buf: &mut Vec<u8>, t: &Transform) {
    let wire = Transform {
        translation: t.translation.scaled(TRANSLATION_SCALE),
        ..*t
    };
    put_floats(buf, &wire.to_floats());
}

fn read_transform(buf: &[u8], offset: usize) -> LinkResult<(usize, Transform)> {
    let (offset, values) = unpack_floats(buf, offset, Transform::FLOATS)?;
    let mut floats = [0f32; Transform::FLOATS];
    floats.copy_from_slice(&values);
    let mut t = Transform::from_floats(&floats);
    t.translation = Vec3::new(
        t.translation.x / TRANSLATION_SCALE,
        t.translation.y / TRANSLATION_SCALE,
        t.translation.z / TRANSLATION_SCALE,
    );
    Ok((offset, t))
}

impl PoseRecord {
    pub fn new(frame: u32) -> Self {
        PoseRecord {
            frame,
            actors: Vec::new(),
        }
    }

    /// Serialize to the binary record
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        buf.extend_from_slice(&(self.actors.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.frame.to_be_bytes());

        for actor in &self.actors {
            put_string(&mut buf, &actor.name);
            put_string(&mut buf, actor.link_id.as_str());
            put_transform(&mut buf, &actor.root);
            buf.extend_from_slice(&(actor.bones.len() as u32).to_be_bytes());
            for bone in &actor.bones {
                put_transform(&mut buf, bone);
            }
            put_floats(&mut buf, &actor.expressions);
            put_floats(&mut buf, &actor.visemes);
        }

        buf
    }

    /// Exact size of the encoded record
    pub fn encoded_size(&self) -> usize {
        8 + self
            .actors
            .iter()
            .map(|a| 8 + a.name.len() + a.link_id.as_str().len() + 40 + a.layout().channel_bytes())
            .sum::<usize>()
    }

    /// Read only the frame number
    pub fn peek_frame(buf: &[u8]) -> LinkResult<u32> {
        let (_, frame) = unpack_u32(buf, 4)?;
        Ok(frame)
    }

    /// Parse a binary record.
    ///
    /// Expression and viseme counts are not on the wire, so `layout` must
    /// supply the negotiated template layout for every actor in the record.
    pub fn decode<F>(buf: &[u8], layout: F) -> LinkResult<Self>
    where
        F: Fn(&LinkId) -> Option<ChannelLayout>,
    {
        let (offset, count) = unpack_u32(buf, 0)?;
        let (mut offset, frame) = unpack_u32(buf, offset)?;

        let mut actors = Vec::with_capacity(count.min(64) as usize);
        for _ in 0..count {
            let (next, name) = unpack_string(buf, offset)?;
            let (next, link_id) = unpack_string(buf, next)?;
            let link_id = LinkId::new(link_id);
            let (next, root) = read_transform(buf, next)?;

            let channels = layout(&link_id).ok_or_else(|| LinkError::MissingTemplate(link_id.clone()))?;

            let (mut next, bone_count) = unpack_u32(buf, next)?;
            let mut bones = Vec::with_capacity((bone_count as usize).min(1024));
            for _ in 0..bone_count {
                let (after, t) = read_transform(buf, next)?;
                bones.push(t);
                next = after;
            }

            let (next, expressions) = unpack_floats(buf, next, channels.expressions)?;
            let (next, visemes) = unpack_floats(buf, next, channels.visemes)?;
            offset = next;

            actors.push(ActorPose {
                name,
                link_id,
                root,
                bones,
                expressions,
                visemes,
            });
        }

        Ok(PoseRecord { frame, actors })
    }
}

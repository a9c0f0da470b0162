//! Actor templates
//!
//! A template is the ordered channel layout of one character. Pose records
//! carry values only, so both ends must agree on the template before any pose
//! for that actor can be read.

/// Ordered channel names for one actor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    pub bones: Vec<String>,
    pub expressions: Vec<String>,
    pub visemes: Vec<String>,
    pub morphs: Vec<String>,
}

impl Template {
    pub fn new(
        bones: Vec<String>,
        expressions: Vec<String>,
        visemes: Vec<String>,
        morphs: Vec<String>,
    ) -> Self {
        Self {
            bones,
            expressions,
            visemes,
            morphs,
        }
    }

    /// Channel counts that shape the binary pose record
    pub fn layout(&self) -> ChannelLayout {
        ChannelLayout {
            bones: self.bones.len(),
            expressions: self.expressions.len(),
            visemes: self.visemes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
            && self.expressions.is_empty()
            && self.visemes.is_empty()
            && self.morphs.is_empty()
    }
}

/// Channel counts of a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelLayout {
    pub bones: usize,
    pub expressions: usize,
    pub visemes: usize,
}

impl ChannelLayout {
    /// Bytes one actor block takes after its name, link id and root transform
    pub fn channel_bytes(&self) -> usize {
        4 + self.bones * 40 + (self.expressions + self.visemes) * 4
    }
}

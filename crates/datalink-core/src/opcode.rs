//! Opcode definitions and protocol constants
//!
//! Every message on the link starts with an opcode that fixes the payload
//! schema. Opcodes are grouped by range:
//! - 0..=49: connection control (hello, ping, stop, disconnect)
//! - 50..=99: status and morph exchange
//! - 100..=199: asset lifecycle (characters, props, rigging)
//! - 200..=229: templates, poses and sequences
//! - 230..: scene synchronization (lights, camera)

/// Port used when the character creator hosts the link
pub const CREATOR_PORT: u16 = 9333;

/// Port used when this application hosts the link
pub const LINK_PORT: u16 = 9334;

/// Port used when a game engine hosts the link
pub const ENGINE_PORT: u16 = 9335;

/// Largest single socket read
pub const MAX_CHUNK_SIZE: usize = 32768;

/// Default number of messages drained per tick
pub const MAX_RECEIVE: usize = 24;

/// Longest frame range a received SEQUENCE may announce.
///
/// Caches are sized by the range, so a peer cannot ask for more.
pub const MAX_SEQUENCE_FRAMES: u32 = 65_536;

/// Message opcode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum OpCode {
    Hello = 1,
    Ping = 2,
    Stop = 10,
    Disconnect = 11,
    Notify = 50,
    Morph = 90,
    MorphUpdate = 91,
    Character = 100,
    CharacterUpdate = 101,
    Prop = 102,
    PropUpdate = 103,
    Rigify = 110,
    Template = 200,
    Pose = 210,
    PoseFrame = 211,
    Sequence = 220,
    SequenceFrame = 221,
    SequenceEnd = 222,
    Lights = 230,
    CameraSync = 231,
}

impl OpCode {
    /// Every opcode this protocol version understands
    pub const ALL: [OpCode; 20] = [
        OpCode::Hello,
        OpCode::Ping,
        OpCode::Stop,
        OpCode::Disconnect,
        OpCode::Notify,
        OpCode::Morph,
        OpCode::MorphUpdate,
        OpCode::Character,
        OpCode::CharacterUpdate,
        OpCode::Prop,
        OpCode::PropUpdate,
        OpCode::Rigify,
        OpCode::Template,
        OpCode::Pose,
        OpCode::PoseFrame,
        OpCode::Sequence,
        OpCode::SequenceFrame,
        OpCode::SequenceEnd,
        OpCode::Lights,
        OpCode::CameraSync,
    ];

    /// Parse from wire value
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(OpCode::Hello),
            2 => Some(OpCode::Ping),
            10 => Some(OpCode::Stop),
            11 => Some(OpCode::Disconnect),
            50 => Some(OpCode::Notify),
            90 => Some(OpCode::Morph),
            91 => Some(OpCode::MorphUpdate),
            100 => Some(OpCode::Character),
            101 => Some(OpCode::CharacterUpdate),
            102 => Some(OpCode::Prop),
            103 => Some(OpCode::PropUpdate),
            110 => Some(OpCode::Rigify),
            200 => Some(OpCode::Template),
            210 => Some(OpCode::Pose),
            211 => Some(OpCode::PoseFrame),
            220 => Some(OpCode::Sequence),
            221 => Some(OpCode::SequenceFrame),
            222 => Some(OpCode::SequenceEnd),
            230 => Some(OpCode::Lights),
            231 => Some(OpCode::CameraSync),
            _ => None,
        }
    }

    /// Convert to wire value
    #[inline]
    pub fn to_u32(self) -> u32 {
        self as u32
    }

    /// Connection control messages, handled by the link itself
    pub fn is_control(self) -> bool {
        matches!(
            self,
            OpCode::Hello | OpCode::Ping | OpCode::Stop | OpCode::Disconnect
        )
    }

    /// Messages that end a drain early so they surface right away
    pub fn is_urgent(self) -> bool {
        self == OpCode::Notify
    }

    /// Messages carrying a binary pose record rather than JSON
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            OpCode::Pose | OpCode::PoseFrame | OpCode::SequenceFrame
        )
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, self.to_u32())
    }
}

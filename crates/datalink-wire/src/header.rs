//! Message header and framing
//!
//! Header is 8 bytes:
//! - Bytes 0-3: Opcode (BE)
//! - Bytes 4-7: Payload length (BE)

use bytes::{Buf, BufMut, BytesMut};
use datalink_core::{LinkError, LinkResult, OpCode};

/// Fixed header size in bytes
pub const HEADER_SIZE: usize = 8;

/// Largest payload accepted before the stream is considered corrupt
pub const MAX_PAYLOAD_SIZE: usize = 256 * 1024 * 1024;

/// Fixed message header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    /// Raw opcode, kept as-is so unknown opcodes can still be skipped
    pub opcode: u32,
    /// Payload length in bytes
    pub length: u32,
}

impl MessageHeader {
    pub fn new(opcode: OpCode, length: u32) -> Self {
        MessageHeader {
            opcode: opcode.to_u32(),
            length,
        }
    }

    /// Parse header from bytes
    pub fn parse(buf: &[u8]) -> LinkResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(LinkError::TruncatedData {
                expected: HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let mut cursor = &buf[..HEADER_SIZE];
        let opcode = cursor.get_u32();
        let length = cursor.get_u32();

        Ok(MessageHeader { opcode, length })
    }

    /// Serialize header into a buffer
    pub fn serialize(&self, buf: &mut [u8]) -> LinkResult<()> {
        if buf.len() < HEADER_SIZE {
            return Err(LinkError::TruncatedData {
                expected: HEADER_SIZE,
                actual: buf.len(),
            });
        }

        buf[0..4].copy_from_slice(&self.opcode.to_be_bytes());
        buf[4..8].copy_from_slice(&self.length.to_be_bytes());

        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.opcode.to_be_bytes());
        buf[4..8].copy_from_slice(&self.length.to_be_bytes());
        buf
    }

    /// Known opcode, if any
    pub fn op(&self) -> Option<OpCode> {
        OpCode::from_u32(self.opcode)
    }

    /// Total message size including the header
    pub fn message_len(&self) -> usize {
        HEADER_SIZE + self.length as usize
    }
}

/// Complete link message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Raw opcode
    pub opcode: u32,
    /// Payload bytes (possibly empty)
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(opcode: OpCode, payload: Vec<u8>) -> Self {
        Message {
            opcode: opcode.to_u32(),
            payload,
        }
    }

    /// Message with no payload
    pub fn empty(opcode: OpCode) -> Self {
        Self::new(opcode, Vec::new())
    }

    pub fn op(&self) -> Option<OpCode> {
        OpCode::from_u32(self.opcode)
    }

    pub fn header(&self) -> MessageHeader {
        MessageHeader {
            opcode: self.opcode,
            length: self.payload.len() as u32,
        }
    }

    /// Serialize header + payload into one contiguous buffer
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_slice(&self.header().to_bytes());
        buf.put_slice(&self.payload);
        buf
    }

    /// Parse one message from the start of `buf`, returning bytes consumed
    pub fn parse(buf: &[u8]) -> LinkResult<(Self, usize)> {
        let header = MessageHeader::parse(buf)?;
        let total = header.message_len();
        if buf.len() < total {
            return Err(LinkError::TruncatedData {
                expected: total,
                actual: buf.len(),
            });
        }

        let payload = buf[HEADER_SIZE..total].to_vec();
        Ok((
            Message {
                opcode: header.opcode,
                payload,
            },
            total,
        ))
    }

    /// Split one complete message off the front of a receive buffer.
    ///
    /// Returns `Ok(None)` while the message is still incomplete. A length
    /// beyond [`MAX_PAYLOAD_SIZE`] means framing is lost.
    pub fn split_from(buf: &mut BytesMut) -> LinkResult<Option<Self>> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = MessageHeader::parse(&buf[..])?;
        if header.length as usize > MAX_PAYLOAD_SIZE {
            return Err(LinkError::MalformedPayload(format!(
                "payload length {} exceeds limit",
                header.length
            )));
        }
        if buf.len() < header.message_len() {
            return Ok(None);
        }

        buf.advance(HEADER_SIZE);
        let payload = buf.split_to(header.length as usize).to_vec();

        Ok(Some(Message {
            opcode: header.opcode,
            payload,
        }))
    }
}

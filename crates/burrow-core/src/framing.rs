//! Handshake TLV record assembly and parsing.
//!
//! A handshake datagram is the outer packet header (`[1][0][0]`) followed
//! by a stream of records: one-byte type, two-byte little-endian length,
//! value. Parsing is zero-copy over the inbound datagram; unknown record
//! types are skipped for forward compatibility, duplicate known types are
//! rejected.

use thiserror::Error;

use crate::buffer::Buffer;
use crate::packet::{PacketType, PACKET_OVERHEAD};

/// Handshake record types.
///
/// `SenderKey` through `Tag` are the protocol-specific slots bound by
/// EC25519-FHMQVC: sender long-term key, recipient long-term key, sender
/// handshake key, recipient handshake key, authenticator tag T.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Handshake message type (1 = init, 2 = respond, 3 = finish)
    HandshakeType = 0,
    /// Reply code
    ReplyCode = 1,
    /// Detail for a non-success reply code
    ErrorDetail = 2,
    /// Flags bitmap
    Flags = 3,
    /// Tunnel mode (TAP or TUN)
    Mode = 4,
    /// Session protocol name
    ProtocolName = 5,
    /// Sender long-term public key
    SenderKey = 6,
    /// Recipient long-term public key
    RecipientKey = 7,
    /// Sender handshake (ephemeral) public key
    SenderHandshakeKey = 8,
    /// Recipient handshake (ephemeral) public key
    RecipientHandshakeKey = 9,
    /// Authenticator tag T
    Tag = 10,
}

/// Number of assigned record types.
pub const RECORD_COUNT: usize = 11;

const ALL_RECORD_TYPES: [RecordType; RECORD_COUNT] = [
    RecordType::HandshakeType,
    RecordType::ReplyCode,
    RecordType::ErrorDetail,
    RecordType::Flags,
    RecordType::Mode,
    RecordType::ProtocolName,
    RecordType::SenderKey,
    RecordType::RecipientKey,
    RecordType::SenderHandshakeKey,
    RecordType::RecipientHandshakeKey,
    RecordType::Tag,
];

/// TLV parse errors. All of them end in a silent drop of the datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// Datagram shorter than the outer packet header
    #[error("packet too short for header")]
    TooShort,

    /// A record's declared length runs past the end of the datagram
    #[error("truncated record")]
    Truncated,

    /// The same record type appeared twice
    #[error("duplicate record type {0}")]
    DuplicateRecord(u8),

    /// Missing or malformed handshake-type record
    #[error("missing handshake type")]
    MissingType,
}

/// Assembles a handshake message.
pub struct HandshakeBuilder {
    data: Vec<u8>,
}

impl HandshakeBuilder {
    /// Start a message of the given handshake type.
    #[must_use]
    pub fn new(handshake_type: u8) -> Self {
        let mut builder = Self {
            data: vec![PacketType::Handshake as u8, 0, 0],
        };
        builder.add(RecordType::HandshakeType, &[handshake_type]);
        builder
    }

    /// Append a record.
    ///
    /// # Panics
    ///
    /// Panics if `value` exceeds a record's 16-bit length field; all
    /// protocol records are at most 32 bytes.
    pub fn add(&mut self, record_type: RecordType, value: &[u8]) {
        let len = u16::try_from(value.len()).expect("record value fits u16");
        self.data.push(record_type as u8);
        self.data.extend_from_slice(&len.to_le_bytes());
        self.data.extend_from_slice(value);
    }

    /// Finish into a sendable buffer.
    #[must_use]
    pub fn finish(self) -> Buffer {
        Buffer::from_slice(&self.data, 0)
    }
}

/// A parsed handshake message, borrowing the inbound datagram.
#[derive(Debug)]
pub struct Handshake<'a> {
    handshake_type: u8,
    records: [Option<&'a [u8]>; RECORD_COUNT],
}

impl<'a> Handshake<'a> {
    /// Parse a full handshake datagram (including the outer header).
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] for truncated streams, duplicate record
    /// types, or a missing handshake-type record.
    pub fn parse(datagram: &'a [u8]) -> Result<Self, FramingError> {
        if datagram.len() < PACKET_OVERHEAD {
            return Err(FramingError::TooShort);
        }

        let mut records: [Option<&'a [u8]>; RECORD_COUNT] = [None; RECORD_COUNT];
        let mut rest = &datagram[PACKET_OVERHEAD..];

        while !rest.is_empty() {
            if rest.len() < 3 {
                return Err(FramingError::Truncated);
            }
            let record_type = rest[0];
            let len = u16::from_le_bytes([rest[1], rest[2]]) as usize;
            if rest.len() < 3 + len {
                return Err(FramingError::Truncated);
            }
            let value = &rest[3..3 + len];
            rest = &rest[3 + len..];

            if let Some(slot) = records.get_mut(record_type as usize) {
                if slot.is_some() {
                    return Err(FramingError::DuplicateRecord(record_type));
                }
                *slot = Some(value);
            }
            // types beyond RECORD_COUNT are skipped
        }

        let handshake_type = match records[RecordType::HandshakeType as usize] {
            Some([t]) => *t,
            _ => return Err(FramingError::MissingType),
        };

        Ok(Self {
            handshake_type,
            records,
        })
    }

    /// The handshake message type (1 = init, 2 = respond, 3 = finish).
    #[must_use]
    pub fn handshake_type(&self) -> u8 {
        self.handshake_type
    }

    /// The value of a record, if present.
    #[must_use]
    pub fn field(&self, record_type: RecordType) -> Option<&'a [u8]> {
        self.records[record_type as usize]
    }

    /// Whether a record is present with exactly the given length.
    #[must_use]
    pub fn has_field(&self, record_type: RecordType, len: usize) -> bool {
        self.field(record_type).map(<[u8]>::len) == Some(len)
    }

    /// Iterate over the present records in type order.
    pub fn fields(&self) -> impl Iterator<Item = (RecordType, &'a [u8])> + '_ {
        ALL_RECORD_TYPES
            .iter()
            .filter_map(|&rt| self.records[rt as usize].map(|v| (rt, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_parse_roundtrip() {
        let mut builder = HandshakeBuilder::new(2);
        builder.add(RecordType::SenderKey, &[0xaa; 32]);
        builder.add(RecordType::RecipientKey, &[0xbb; 32]);
        builder.add(RecordType::Tag, &[0xcc; 32]);
        let buf = builder.finish();

        let hs = Handshake::parse(buf.as_slice()).unwrap();
        assert_eq!(hs.handshake_type(), 2);
        assert_eq!(hs.field(RecordType::SenderKey), Some(&[0xaa; 32][..]));
        assert_eq!(hs.field(RecordType::RecipientKey), Some(&[0xbb; 32][..]));
        assert_eq!(hs.field(RecordType::Tag), Some(&[0xcc; 32][..]));
        assert_eq!(hs.field(RecordType::SenderHandshakeKey), None);
        assert!(hs.has_field(RecordType::SenderKey, 32));
        assert!(!hs.has_field(RecordType::SenderKey, 16));
    }

    #[test]
    fn rejects_duplicates() {
        let mut builder = HandshakeBuilder::new(1);
        builder.add(RecordType::SenderKey, &[1; 32]);
        builder.add(RecordType::SenderKey, &[2; 32]);
        let buf = builder.finish();

        assert_eq!(
            Handshake::parse(buf.as_slice()).unwrap_err(),
            FramingError::DuplicateRecord(RecordType::SenderKey as u8)
        );
    }

    #[test]
    fn rejects_truncated_record() {
        let mut builder = HandshakeBuilder::new(1);
        builder.add(RecordType::SenderKey, &[1; 32]);
        let buf = builder.finish();
        let data = buf.as_slice();

        // cut into the middle of the record value
        assert_eq!(
            Handshake::parse(&data[..data.len() - 5]).unwrap_err(),
            FramingError::Truncated
        );
        // cut into the middle of a record header
        assert_eq!(
            Handshake::parse(&data[..PACKET_OVERHEAD + 2]).unwrap_err(),
            FramingError::Truncated
        );
    }

    #[test]
    fn rejects_missing_type() {
        // header only, no records at all
        assert_eq!(
            Handshake::parse(&[1, 0, 0]).unwrap_err(),
            FramingError::MissingType
        );
        // too short for the header
        assert_eq!(Handshake::parse(&[1]).unwrap_err(), FramingError::TooShort);
    }

    #[test]
    fn skips_unknown_record_types() {
        let mut builder = HandshakeBuilder::new(1);
        builder.add(RecordType::SenderKey, &[7; 32]);
        let mut raw = builder.finish();
        // append a record with an unassigned type
        let mut data = raw.as_slice().to_vec();
        data.extend_from_slice(&[0x42, 2, 0, 0xde, 0xad]);
        raw = Buffer::from_slice(&data, 0);

        let hs = Handshake::parse(raw.as_slice()).unwrap();
        assert_eq!(hs.field(RecordType::SenderKey), Some(&[7; 32][..]));
        assert_eq!(hs.fields().count(), 2); // handshake type + sender key
    }

    #[test]
    fn zero_length_records_are_valid() {
        let mut builder = HandshakeBuilder::new(1);
        builder.add(RecordType::Flags, &[]);
        let buf = builder.finish();
        let hs = Handshake::parse(buf.as_slice()).unwrap();
        assert_eq!(hs.field(RecordType::Flags), Some(&[][..]));
        assert!(hs.has_field(RecordType::Flags, 0));
    }
}

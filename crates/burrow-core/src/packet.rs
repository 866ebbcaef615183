//! Outermost wire dispatch.
//!
//! Every datagram starts with a one-byte packet-type tag followed by two
//! reserved bytes (zero on send for handshakes; method-defined for data).

/// Size of the outer packet header: type tag plus two reserved bytes.
pub const PACKET_OVERHEAD: usize = 3;

/// Packet-type tag carried in byte 0 of every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Handshake TLV stream
    Handshake = 1,
    /// Method-encrypted payload
    Data = 2,
}

impl PacketType {
    /// Parse the tag byte. `0` is reserved and everything above `2` is
    /// unassigned; both yield `None` and the caller drops the datagram.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Handshake),
            2 => Some(Self::Data),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tags() {
        assert_eq!(PacketType::from_byte(1), Some(PacketType::Handshake));
        assert_eq!(PacketType::from_byte(2), Some(PacketType::Data));
    }

    #[test]
    fn reserved_and_unknown_tags() {
        assert_eq!(PacketType::from_byte(0), None);
        assert_eq!(PacketType::from_byte(3), None);
        assert_eq!(PacketType::from_byte(0x7f), None);
        assert_eq!(PacketType::from_byte(0xff), None);
    }
}

//! RTP packet structures (RFC 3550)

use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    #[error("rtp header too short")]
    ShortHeader,
}

/// RTP header structure (12 bytes minimum)
///
/// RFC 3550 Section 5.1:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       sequence number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           synchronization source (SSRC) identifier            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone)]
pub struct RtpHeader {
    /// RTP version (always 2)
    pub version: u8,

    /// Padding flag
    pub padding: bool,

    /// Extension flag
    pub extension: bool,

    /// CSRC count
    pub csrc_count: u8,

    /// Marker bit (set on last packet of frame)
    pub marker: bool,

    /// Payload type (26 for JPEG)
    pub payload_type: u8,

    /// Sequence number (16 bits, wraps around)
    pub sequence_number: u16,

    /// Timestamp (90kHz clock for video)
    pub timestamp: u32,

    /// Synchronization source identifier
    pub ssrc: u32,
}

impl RtpHeader {
    /// Parses RTP header from byte slice.
    ///
    /// Rejects input shorter than 12 bytes with [`PacketError::ShortHeader`].
    /// Returns the header along with the total number of bytes it occupies
    /// on the wire: 12, or 16 when the extension bit is set (the 4-byte
    /// extension body that follows is not interpreted here and must be
    /// skipped by the caller using the returned size).
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), PacketError> {
        if data.len() < 12 {
            return Err(PacketError::ShortHeader);
        }

        let version = (data[0] >> 6) & 0x03;
        let padding = (data[0] & 0x20) != 0;
        let extension = (data[0] & 0x10) != 0;
        let csrc_count = data[0] & 0x0F;

        let marker = (data[1] & 0x80) != 0;
        let payload_type = data[1] & 0x7F;

        let sequence_number = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let header_size = if extension { 16 } else { 12 };
        if data.len() < header_size {
            return Err(PacketError::ShortHeader);
        }

        Ok((
            Self {
                version,
                padding,
                extension,
                csrc_count,
                marker,
                payload_type,
                sequence_number,
                timestamp,
                ssrc,
            },
            header_size,
        ))
    }

    /// Serializes RTP header to bytes
    pub fn to_bytes(&self) -> [u8; 12] {
        let mut bytes = [0u8; 12];

        bytes[0] = (self.version << 6)
            | (if self.padding { 0x20 } else { 0 })
            | (if self.extension { 0x10 } else { 0 })
            | (self.csrc_count & 0x0F);

        bytes[1] = (if self.marker { 0x80 } else { 0 }) | (self.payload_type & 0x7F);

        bytes[2..4].copy_from_slice(&self.sequence_number.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        bytes
    }
}

/// Complete RTP packet with header and payload
#[derive(Debug, Clone)]
pub struct RtpPacket {
    pub header: RtpHeader,
    pub payload: Bytes,
}

impl RtpPacket {
    /// Creates a new RTP packet
    pub fn new(header: RtpHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Parses RTP packet from bytes
    pub fn from_bytes(data: Bytes) -> Result<Self, PacketError> {
        let (header, header_size) = RtpHeader::from_bytes(&data)?;
        let payload = data.slice(header_size..);

        Ok(Self { header, payload })
    }

    /// Serializes packet to bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut bytes = Vec::with_capacity(12 + self.payload.len());
        bytes.extend_from_slice(&self.header.to_bytes());
        bytes.extend_from_slice(&self.payload);
        Bytes::from(bytes)
    }
}

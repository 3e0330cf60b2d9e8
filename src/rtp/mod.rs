//! RTP/JPEG packetisation according to RFC 2435.
//!
//! Composes the plain RFC 3550 packet structures in [`packet`] and the
//! RFC 2435 payload headers in [`jpeg_header`] into the fragmenting
//! [`packetizer::Packetizer`].

pub mod jpeg_header;
pub mod packet;
pub mod packetizer;

pub use jpeg_header::{JpegHeader, QuantTableHeader, RestartMarkerHeader};
pub use packet::{PacketError, RtpHeader, RtpPacket};
pub use packetizer::{Packetizer, PacketizerError, DEFAULT_MTU, DEFAULT_Q};

/// Standard 90kHz clock rate for RTP video timestamps (RFC 2435 §3).
pub const RTP_CLOCK_RATE: u32 = 90_000;

/// Converts an elapsed duration since a stream's epoch into a 90kHz RTP
/// timestamp, matching the still-image source's
/// `int((stamp - start) * 90000)` timing.
pub fn to_90khz(elapsed: std::time::Duration) -> u32 {
    (elapsed.as_secs_f64() * RTP_CLOCK_RATE as f64) as u32
}

//! RTSP server that streams still/pre-encoded JPEG content as RTP/MJPEG.
//!
//! Implements RFC 2326 (RTSP) control and RFC 2435 (RTP/MJPEG) media
//! delivery for pre-encoded still images: a client issues
//! OPTIONS/DESCRIBE/SETUP/PLAY against a file served from a configured
//! directory, and receives that file fragmented into RTP datagrams over
//! UDP for as long as the session stays in the `PLAYING` state.
//!
//! - [`jpeg`]: JFIF marker dissection (dimensions, quant/Huffman tables,
//!   the entropy-coded scan slice).
//! - [`rtp`]: RFC 3550 packet structures and the RFC 2435 fragmenting
//!   packetiser built on top of them.
//! - [`publisher`]: the periodic tick/fan-out loop and the still-JPEG
//!   frame source.
//! - [`rtsp`]: request/response framing, the per-session state machine,
//!   SDP generation, and the TCP server.

pub mod config;
pub mod jpeg;
pub mod publisher;
pub mod rtp;
pub mod rtsp;

pub use config::Config;
pub use publisher::{Publisher, PublisherHandle, StillJpegSource};
pub use rtp::{Packetizer, RtpHeader, RtpPacket};
pub use rtsp::{RtspServer, ServerConfig};

//! RTP/MJPEG fragmentation (RFC 2435 §3).
//!
//! Splits a dissected JPEG frame's entropy-coded scan into a sequence of
//! RTP packets, each carrying an 8-byte MJPEG header and, on the first
//! fragment, an optional restart-marker header and quantisation-table
//! header. Sequence numbers increase monotonically across calls; the
//! timestamp is supplied by the caller per frame.

use crate::jpeg::JpegInfo;
use crate::rtp::jpeg_header::{JpegHeader, QuantTableHeader, RestartMarkerHeader};
use crate::rtp::packet::{RtpHeader, RtpPacket};
use bytes::Bytes;
use std::sync::atomic::{AtomicU16, Ordering};
use thiserror::Error;

pub const RTP_VERSION: u8 = 2;
pub const RTP_PAYLOAD_TYPE_JPEG: u8 = 26;
pub const RTP_HEADER_SIZE: usize = 12;
pub const JPEG_HEADER_SIZE: usize = 8;
pub const DEFAULT_MTU: usize = 1400;
pub const DEFAULT_Q: u8 = 255;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketizerError {
    #[error("jpeg geometry {width}x{height} is not a multiple of 8")]
    BadGeometry { width: u16, height: u16 },

    #[error("mtu {0} too small to carry any payload")]
    MtuTooSmall(usize),
}

/// Fragments a single dissected JPEG frame into RTP packets.
///
/// Sequence numbers are drawn from a shared, monotonically wrapping
/// counter so that successive frames (and successive calls from a
/// restarted source) form one continuous RTP stream. Timestamps are
/// supplied by the caller (see [`crate::rtp::now_90khz`]) rather than
/// tracked here, since the publisher — not the packetiser — owns the
/// stream clock.
pub struct Packetizer {
    ssrc: u32,
    mtu: usize,
    q: u8,
    sequence_number: AtomicU16,
}

impl Packetizer {
    pub fn new(ssrc: u32, mtu: usize, q: u8) -> Self {
        let mtu = if mtu == 0 { DEFAULT_MTU } else { mtu };
        Self {
            ssrc,
            mtu,
            q,
            sequence_number: AtomicU16::new(0),
        }
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Encodes one frame into an ordered sequence of RTP packets.
    ///
    /// Builds one RTP packet per fragment of the scan data:
    /// - an 8-byte MJPEG header (type-specific byte, 24-bit fragment
    ///   offset, type, Q, width/8, height/8);
    /// - a 4-byte restart-marker header when the frame declares a
    ///   restart interval (RFC 2435 §3.1.7);
    /// - on the first fragment only, when `Q >= 128`, a 4-byte
    ///   quant-table header followed by the luminance table (64 bytes)
    ///   then the chrominance table (64 bytes) — destination 0 before
    ///   destination 1, with no swap;
    /// - a slice of the frame's entropy-coded scan.
    ///
    /// The marker bit is set on the last fragment only.
    pub fn encode(
        &self,
        timestamp: u32,
        jpeg: &JpegInfo,
        mtu_override: Option<usize>,
    ) -> Result<Vec<Bytes>, PacketizerError> {
        if jpeg.width % 8 != 0 || jpeg.height % 8 != 0 {
            return Err(PacketizerError::BadGeometry {
                width: jpeg.width,
                height: jpeg.height,
            });
        }

        let mtu = mtu_override.unwrap_or(self.mtu);

        let restart_header = jpeg
            .restart_interval
            .map(RestartMarkerHeader::for_interval);

        let luma = jpeg.quant_tables_raw.get(&0).copied();
        let chroma = jpeg.quant_tables_raw.get(&1).copied();
        let quant_header_bytes: Option<Vec<u8>> = if self.q >= 128 {
            let mut tables = Vec::new();
            if let Some(l) = luma {
                tables.extend_from_slice(&l);
            }
            if let Some(c) = chroma {
                tables.extend_from_slice(&c);
            }
            if tables.is_empty() {
                None
            } else {
                let mut out = QuantTableHeader::for_tables(tables.len() as u16).to_bytes().to_vec();
                out.extend_from_slice(&tables);
                Some(out)
            }
        } else {
            None
        };

        let base_type = jpeg.jpeg_type;
        let scan = &jpeg.scan;
        let total = scan.len();
        let steady_state_budget = mtu.saturating_sub(JPEG_HEADER_SIZE);
        let mut packets = Vec::with_capacity((total / steady_state_budget.max(1)) + 1);
        let mut offset = 0usize;

        while offset < total || (total == 0 && offset == 0) {
            let is_first = offset == 0;

            // The scan-data budget for this fragment: the MTU (the RTP
            // *payload* budget, not counting the 12-byte RTP header) minus
            // the 8-byte MJPEG header, the 4-byte restart header when
            // present, and — on the first fragment only — the quant-table
            // header and tables, recomputed per fragment per spec §4.3(d).
            let mut header_bytes = JPEG_HEADER_SIZE;
            if restart_header.is_some() {
                header_bytes += 4;
            }
            if is_first {
                if let Some(qt) = &quant_header_bytes {
                    header_bytes += qt.len();
                }
            }
            if mtu <= header_bytes {
                return Err(PacketizerError::MtuTooSmall(mtu));
            }
            let fragment_budget = mtu - header_bytes;

            let remaining = total - offset;
            let chunk_len = remaining.min(fragment_budget);
            let is_last = offset + chunk_len >= total;

            let mut type_byte = base_type;
            if restart_header.is_some() {
                type_byte |= crate::rtp::jpeg_header::RESTART_MARKER_FLAG;
            }

            let jpeg_header = JpegHeader::new(
                offset as u32,
                type_byte,
                self.q,
                jpeg.width_blocks(),
                jpeg.height_blocks(),
            );

            let mut payload = Vec::with_capacity(JPEG_HEADER_SIZE + chunk_len + 8);
            payload.extend_from_slice(&jpeg_header.to_bytes());
            if let Some(rst) = &restart_header {
                payload.extend_from_slice(&rst.to_bytes());
            }
            if is_first {
                if let Some(qt) = &quant_header_bytes {
                    payload.extend_from_slice(qt);
                }
            }
            payload.extend_from_slice(&scan[offset..offset + chunk_len]);

            let seq = self.sequence_number.fetch_add(1, Ordering::Relaxed);
            let header = RtpHeader {
                version: RTP_VERSION,
                padding: false,
                extension: false,
                csrc_count: 0,
                marker: is_last,
                payload_type: RTP_PAYLOAD_TYPE_JPEG,
                sequence_number: seq,
                timestamp,
                ssrc: self.ssrc,
            };

            packets.push(RtpPacket::new(header, Bytes::from(payload)).to_bytes());

            offset += chunk_len;
            if total == 0 {
                break;
            }
        }

        Ok(packets)
    }

    pub fn current_sequence_number(&self) -> u16 {
        self.sequence_number.load(Ordering::Relaxed)
    }
}

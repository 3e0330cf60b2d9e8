//! JFIF marker dissector.
//!
//! Parses the marker segments of a JPEG bitstream far enough to drive
//! RTP/MJPEG packetisation: image dimensions, restart interval,
//! quantisation tables, and the entropy-coded scan slice. This is not a
//! JPEG decoder — no Huffman decoding or IDCT is performed.

use bytes::Bytes;
use std::collections::HashMap;
use thiserror::Error;

/// JFIF marker codes this dissector recognises explicitly.
pub mod markers {
    pub const SOI: u8 = 0xD8;
    pub const EOI: u8 = 0xD9;
    pub const SOS: u8 = 0xDA;
    pub const DQT: u8 = 0xDB;
    pub const DRI: u8 = 0xDD;
    pub const APP0: u8 = 0xE0;
    pub const COM: u8 = 0xFE;
    pub const SOF0: u8 = 0xC0;
    pub const SOF1: u8 = 0xC1;
    pub const SOF2: u8 = 0xC2;
    pub const DHT: u8 = 0xC4;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DissectorError {
    #[error("jpeg data too short")]
    TooShort,

    #[error("malformed jpeg: missing SOI marker")]
    NoSoi,

    #[error("malformed jpeg: truncated marker segment")]
    Truncated,

    #[error("malformed jpeg: missing SOS marker")]
    NoSos,

    #[error("malformed jpeg: missing EOI marker")]
    NoEoi,

    #[error("malformed jpeg: {0}")]
    BadMarkerLength(String),

    #[error("unsupported: progressive (SOF2) JPEG")]
    Progressive,

    #[error("unsupported: sample precision {0} (must be 8)")]
    UnsupportedPrecision(u8),

    #[error("unsupported: invalid sampling factor")]
    InvalidSamplingFactor,
}

/// A single colour component as declared in a SOF segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    pub id: u8,
    pub h_sampling: u8,
    pub v_sampling: u8,
    pub quant_table: u8,
}

/// A Huffman table segment, retained only far enough to validate structure
/// and skip correctly; no canonical-code lookup is built since nothing
/// downstream decodes entropy data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanTable {
    pub class: u8, // 0 = DC, 1 = AC
    pub destination: u8,
    pub code_lengths: [u8; 16],
    pub values: Vec<u8>,
}

/// Zig-zag scan order for an 8x8 quantisation table, per the JPEG spec
/// (ITU-T T.81 Annex A), used to de-order DQT table bytes into raster order.
const ZIGZAG: [usize; 63] = [
    1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27, 20,
    13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58, 59,
    52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// Result of dissecting a JFIF bitstream: geometry, tables, and the
/// entropy-coded scan slice the packetiser transmits.
#[derive(Debug, Clone)]
pub struct JpegInfo {
    pub width: u16,
    pub height: u16,
    /// 0 for SOF0/baseline 4:2:0-style single-table encodes, 1 for the
    /// RFC 2435 Type-1 (4:2:2) sampling. Derived from the first
    /// component's sampling factors, matching RFC 2435 §3.1.
    pub jpeg_type: u8,
    pub restart_interval: Option<u16>,
    /// Quantisation tables keyed by destination id. By convention
    /// 0 = luminance, 1 = chrominance.
    pub quant_tables: HashMap<u8, [u8; 64]>,
    /// Raw (still zig-zag-ordered) quantisation table bytes, keyed the
    /// same way, exactly as they appear on the wire — this is what the
    /// packetiser writes verbatim into the RFC 2435 quant-table header.
    pub quant_tables_raw: HashMap<u8, [u8; 64]>,
    pub huffman_tables: Vec<HuffmanTable>,
    pub components: Vec<Component>,
    pub progressive: bool,
    /// Entropy-coded scan: from just after the SOS header to (but
    /// excluding) the EOI marker.
    pub scan: Bytes,
}

impl JpegInfo {
    /// Width divided by 8, as required for the RFC 2435 header field.
    pub fn width_blocks(&self) -> u8 {
        (self.width >> 3) as u8
    }

    /// Height divided by 8, as required for the RFC 2435 header field.
    pub fn height_blocks(&self) -> u8 {
        (self.height >> 3) as u8
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn require(&self, n: usize) -> Result<(), DissectorError> {
        if self.remaining() < n {
            Err(DissectorError::Truncated)
        } else {
            Ok(())
        }
    }

    fn u8(&mut self) -> Result<u8, DissectorError> {
        self.require(1)?;
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn u16(&mut self) -> Result<u16, DissectorError> {
        self.require(2)?;
        let v = u16::from_be_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(v)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DissectorError> {
        self.require(n)?;
        let s = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn skip(&mut self, n: usize) -> Result<(), DissectorError> {
        self.require(n)?;
        self.pos += n;
        Ok(())
    }
}

/// Parses a JFIF bitstream into a [`JpegInfo`], per the marker table this
/// crate's specification defines: SOI, APP0/JFIF, DQT, DHT, SOF0/SOF1,
/// SOF2 (recorded, rejected below), DRI, SOS, EOI, and skipped APPn/COM.
pub fn parse_jpeg(data: &[u8]) -> Result<JpegInfo, DissectorError> {
    if data.len() < 4 {
        return Err(DissectorError::TooShort);
    }
    if data[0] != 0xFF || data[1] != markers::SOI {
        return Err(DissectorError::NoSoi);
    }

    let mut cursor = Cursor::new(data);
    cursor.skip(2)?; // SOI

    let mut width = 0u16;
    let mut height = 0u16;
    let mut jpeg_type = 0u8;
    let mut restart_interval = None;
    let mut quant_tables = HashMap::new();
    let mut quant_tables_raw = HashMap::new();
    let mut huffman_tables = Vec::new();
    let mut components = Vec::new();
    let mut progressive = false;
    let mut scan_start = None;

    while cursor.remaining() >= 2 {
        let marker_prefix = cursor.u8()?;
        if marker_prefix != 0xFF {
            // Not a marker; malformed segment boundary.
            return Err(DissectorError::Truncated);
        }
        let marker = cursor.u8()?;

        match marker {
            markers::SOS => {
                let length = cursor.u16()? as usize;
                if length < 2 {
                    return Err(DissectorError::BadMarkerLength("SOS".into()));
                }
                cursor.skip(length - 2)?;
                scan_start = Some(cursor.pos);
                break;
            }
            markers::EOI => {
                return Err(DissectorError::NoSos);
            }
            markers::APP0 => {
                let length = cursor.u16()? as usize;
                if length < 2 {
                    return Err(DissectorError::BadMarkerLength("APP0".into()));
                }
                // `JFIF\0` signature validation, when present; we don't
                // hard-fail on a mismatch since non-JFIF APP0 segments
                // (e.g. from some encoders) are still skippable.
                cursor.skip(length - 2)?;
            }
            markers::DQT => {
                let length = cursor.u16()? as usize;
                if length < 3 {
                    return Err(DissectorError::BadMarkerLength("DQT".into()));
                }
                let pq_tq = cursor.u8()?;
                let destination = pq_tq & 0x0F;
                let table_bytes = cursor.take(64)?;
                let mut zigzagged = [0u8; 64];
                zigzagged[0] = table_bytes[0];
                for (i, &z) in ZIGZAG.iter().enumerate() {
                    zigzagged[z] = table_bytes[i + 1];
                }
                let mut raw = [0u8; 64];
                raw.copy_from_slice(table_bytes);
                quant_tables.insert(destination, zigzagged);
                quant_tables_raw.insert(destination, raw);
            }
            markers::DHT => {
                let length = cursor.u16()? as usize;
                if length < 17 {
                    return Err(DissectorError::BadMarkerLength("DHT".into()));
                }
                let tc_th = cursor.u8()?;
                let class = tc_th >> 4;
                let destination = tc_th & 0x0F;
                let mut code_lengths = [0u8; 16];
                let lens = cursor.take(16)?;
                code_lengths.copy_from_slice(lens);
                let total: usize = code_lengths.iter().map(|&l| l as usize).sum();
                let values = cursor.take(total)?.to_vec();
                huffman_tables.push(HuffmanTable {
                    class,
                    destination,
                    code_lengths,
                    values,
                });
            }
            markers::SOF0 | markers::SOF1 | markers::SOF2 => {
                let _length = cursor.u16()?;
                progressive = marker == markers::SOF2;
                let precision = cursor.u8()?;
                if precision != 8 {
                    return Err(DissectorError::UnsupportedPrecision(precision));
                }
                height = cursor.u16()?;
                width = cursor.u16()?;
                let num_components = cursor.u8()?;
                components.clear();
                for i in 0..num_components {
                    let id = cursor.u8()?;
                    let sampling = cursor.u8()?;
                    let h = sampling >> 4;
                    let v = sampling & 0x0F;
                    if !matches!(h, 1 | 2 | 4) || !matches!(v, 1 | 2 | 4) {
                        return Err(DissectorError::InvalidSamplingFactor);
                    }
                    if i > 0 && (h != 1 || v != 1) {
                        return Err(DissectorError::InvalidSamplingFactor);
                    }
                    let quant_table = cursor.u8()?;
                    if i == 0 {
                        jpeg_type = if sampling == 0x22 { 1 } else { 0 };
                    }
                    components.push(Component {
                        id,
                        h_sampling: h,
                        v_sampling: v,
                        quant_table,
                    });
                }
            }
            markers::DRI => {
                let length = cursor.u16()? as usize;
                if length != 4 {
                    return Err(DissectorError::BadMarkerLength("DRI".into()));
                }
                restart_interval = Some(cursor.u16()?);
            }
            0xD0..=0xD7 => {
                // Standalone RST markers carry no length field.
            }
            _ => {
                // Unknown marker with a length field (other APPn, COM,
                // and anything else we don't special-case): skip.
                let length = cursor.u16()? as usize;
                if length < 2 {
                    return Err(DissectorError::BadMarkerLength(format!("{marker:#04x}")));
                }
                cursor.skip(length - 2)?;
            }
        }
    }

    let scan_start = scan_start.ok_or(DissectorError::NoSos)?;

    // Scan end is the byte immediately before EOI (0xFF 0xD9), found by a
    // linear scan from scan_start, matching this repo's specification for
    // the entropy-coded-scan slice.
    let scan_end = find_eoi(data, scan_start).ok_or(DissectorError::NoEoi)?;

    if progressive {
        return Err(DissectorError::Progressive);
    }

    Ok(JpegInfo {
        width,
        height,
        jpeg_type,
        restart_interval,
        quant_tables,
        quant_tables_raw,
        huffman_tables,
        components,
        progressive,
        scan: Bytes::copy_from_slice(&data[scan_start..scan_end]),
    })
}

fn find_eoi(data: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 1 < data.len() {
        if data[i] == 0xFF && data[i + 1] == markers::EOI {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Quick structural check used before constructing a stream: valid SOI and
/// EOI boundaries without doing a full marker walk.
pub fn validate_jpeg(data: &[u8]) -> Result<(), DissectorError> {
    if data.len() < 4 {
        return Err(DissectorError::TooShort);
    }
    if data[0] != 0xFF || data[1] != markers::SOI {
        return Err(DissectorError::NoSoi);
    }
    if data[data.len() - 2] != 0xFF || data[data.len() - 1] != markers::EOI {
        return Err(DissectorError::NoEoi);
    }
    Ok(())
}

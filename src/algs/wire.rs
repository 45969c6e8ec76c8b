//! Fixed, versioned, little-endian wire types for face-flux messages.
//!
//! A flux message is one [`FluxChunkHeader`] followed by `count` `f64`
//! values, each stored as its little-endian bit pattern. No face indices
//! travel on the wire: sender and receiver agree on the value order when the
//! dependency graph is built.

use bytemuck::{Pod, Zeroable};
use std::mem::size_of;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Message kinds carried in [`WireHdr::kind`].
pub const KIND_FLUX_CHUNK: u16 = 1;
pub const KIND_REDUCE_F64: u16 = 2;
pub const KIND_GATHER_U32: u16 = 3;
pub const KIND_GATHER_U64: u16 = 4;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,
    pub kind_le: u16,
    pub reserved_le: u32, // keep zero
}

impl WireHdr {
    pub fn new(kind: u16) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            reserved_le: 0,
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
}

/// Header of a partial face-flux buffer for one angle set.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct FluxChunkHeader {
    pub hdr: WireHdr,
    pub angle_set_le: u32,
    pub _pad: u32,
    /// Position of the first value within the full per-neighbour buffer.
    pub offset_le: u64,
    pub count_le: u64,
}

impl FluxChunkHeader {
    pub const SIZE: usize = 32;

    pub fn new(angle_set: usize, offset: usize, count: usize) -> Self {
        Self {
            hdr: WireHdr::new(KIND_FLUX_CHUNK),
            angle_set_le: (angle_set as u32).to_le(),
            _pad: 0,
            offset_le: (offset as u64).to_le(),
            count_le: (count as u64).to_le(),
        }
    }
    pub fn angle_set(&self) -> usize {
        u32::from_le(self.angle_set_le) as usize
    }
    pub fn offset(&self) -> usize {
        u64::from_le(self.offset_le) as usize
    }
    pub fn count(&self) -> usize {
        u64::from_le(self.count_le) as usize
    }
}

/// Encode a chunk header plus values into one contiguous message.
pub fn encode_flux_chunk(angle_set: usize, offset: usize, values: &[f64]) -> Vec<u8> {
    let hdr = FluxChunkHeader::new(angle_set, offset, values.len());
    let mut out = Vec::with_capacity(FluxChunkHeader::SIZE + values.len() * size_of::<u64>());
    out.extend_from_slice(cast_slice(std::slice::from_ref(&hdr)));
    for v in values {
        out.extend_from_slice(&v.to_bits().to_le_bytes());
    }
    out
}

/// Decode a chunk produced by [`encode_flux_chunk`].
///
/// Received byte buffers carry no alignment guarantee, so the header and the
/// values are read unaligned.
pub fn decode_flux_chunk(bytes: &[u8]) -> Result<(FluxChunkHeader, Vec<f64>), String> {
    if bytes.len() < FluxChunkHeader::SIZE {
        return Err(format!(
            "flux chunk shorter than its header: {} bytes",
            bytes.len()
        ));
    }
    let hdr: FluxChunkHeader = bytemuck::pod_read_unaligned(&bytes[..FluxChunkHeader::SIZE]);
    if hdr.hdr.version() != WIRE_VERSION || hdr.hdr.kind() != KIND_FLUX_CHUNK {
        return Err(format!(
            "unexpected header version {} kind {}",
            hdr.hdr.version(),
            hdr.hdr.kind()
        ));
    }
    let body = &bytes[FluxChunkHeader::SIZE..];
    expect_exact_len(body.len(), hdr.count() * size_of::<u64>())?;
    let values = body
        .chunks_exact(size_of::<u64>())
        .map(|c| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(c);
            f64::from_bits(u64::from_le_bytes(raw))
        })
        .collect();
    Ok((hdr, values))
}

/// Encode a header-tagged list of scalars for the collectives.
pub fn encode_scalars<T: Copy>(kind: u16, values: &[T], to_le: impl Fn(T) -> [u8; 8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(size_of::<WireHdr>() + values.len() * 8);
    out.extend_from_slice(cast_slice(std::slice::from_ref(&WireHdr::new(kind))));
    for &v in values {
        out.extend_from_slice(&to_le(v));
    }
    out
}

/// Inverse of [`encode_scalars`]; returns the raw 8-byte words.
pub fn decode_scalars(kind: u16, bytes: &[u8]) -> Result<Vec<[u8; 8]>, String> {
    let h = size_of::<WireHdr>();
    if bytes.len() < h || (bytes.len() - h) % 8 != 0 {
        return Err(format!("malformed scalar message of {} bytes", bytes.len()));
    }
    let hdr: WireHdr = bytemuck::pod_read_unaligned(&bytes[..h]);
    if hdr.version() != WIRE_VERSION || hdr.kind() != kind {
        return Err(format!(
            "expected kind {kind}, got version {} kind {}",
            hdr.version(),
            hdr.kind()
        ));
    }
    Ok(bytes[h..]
        .chunks_exact(8)
        .map(|c| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(c);
            raw
        })
        .collect())
}

// ===== Compile-time sanity checks =========================================

static_assertions::const_assert_eq!(size_of::<WireHdr>(), 8);
static_assertions::const_assert_eq!(size_of::<FluxChunkHeader>(), FluxChunkHeader::SIZE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flux_chunk_survives_misaligned_buffer() {
        let msg = encode_flux_chunk(3, 12, &[1.5, -2.0, 0.25]);
        // Shift by one byte to break 8-byte alignment.
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&msg);
        let (hdr, vals) = decode_flux_chunk(&shifted[1..]).unwrap();
        assert_eq!((hdr.angle_set(), hdr.offset(), hdr.count()), (3, 12, 3));
        assert_eq!(vals, vec![1.5, -2.0, 0.25]);
    }

    #[test]
    fn truncated_chunk_is_rejected() {
        let msg = encode_flux_chunk(0, 0, &[1.0, 2.0]);
        assert!(decode_flux_chunk(&msg[..msg.len() - 4]).is_err());
        assert!(decode_flux_chunk(&msg[..10]).is_err());
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let msg = encode_scalars(KIND_REDUCE_F64, &[1.0f64], |v| v.to_bits().to_le_bytes());
        assert!(decode_scalars(KIND_GATHER_U32, &msg).is_err());
        assert_eq!(decode_scalars(KIND_REDUCE_F64, &msg).unwrap().len(), 1);
    }

    #[test]
    fn version_guard() {
        let hdr = WireHdr::new(KIND_FLUX_CHUNK);
        assert_eq!(hdr.version(), WIRE_VERSION);
    }
}

//! On-wire codec for property maps (EPC 0x9B..0x9F payloads).
//!
//! Below 16 entries the map is a count byte followed by the raw EPC list.
//! At 16 entries and above it is the count byte followed by a 16 byte
//! bitmap: bit `7 - bit_index` of byte `byte_index` marks EPC
//! `0xF0 + byte_index - 0x10 * bit_index`.

use crate::error::CodecError;

const BITMAP_THRESHOLD: usize = 16;
const BITMAP_BYTES: usize = 16;

/// Encode an EPC set, selecting the short or bitmap form by entry count.
pub fn encode(epcs: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + epcs.len().min(BITMAP_BYTES));
    out.push(epcs.len() as u8);

    if epcs.len() < BITMAP_THRESHOLD {
        out.extend_from_slice(epcs);
        return out;
    }

    let mut bitmap = [0u8; BITMAP_BYTES];
    for &epc in epcs {
        let byte_index = (epc & 0x0F) as usize;
        let bit_index = 0x0F - (epc >> 4);
        bitmap[byte_index] |= 1 << (7 - bit_index);
    }
    out.extend_from_slice(&bitmap);

    out
}

/// Decode either map form into the sorted EPC list.
pub fn decode(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    if data.is_empty() {
        return Err(CodecError::Length { expected: 1, got: 0 });
    }

    let count = data[0] as usize;
    let mut epcs;

    if count < BITMAP_THRESHOLD {
        if data.len() != 1 + count {
            return Err(CodecError::Length { expected: 1 + count, got: data.len() });
        }
        epcs = data[1..].to_vec();
    } else {
        if data.len() != 1 + BITMAP_BYTES {
            return Err(CodecError::Length { expected: 1 + BITMAP_BYTES, got: data.len() });
        }
        epcs = Vec::with_capacity(count);
        for (byte_index, &byte) in data[1..].iter().enumerate() {
            for bit_index in 0..8u8 {
                if (byte >> (7 - bit_index)) & 1 != 0 {
                    epcs.push(0xF0 + byte_index as u8 - bit_index * 0x10);
                }
            }
        }
    }

    epcs.sort_unstable();
    Ok(epcs)
}

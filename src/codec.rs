//! The volca sends each program as 7 bit safe groups: one byte carrying the
//! high bits of the next seven, bit `k` belonging to byte `k`.

use crate::error::CodecError;

pub const PROGRAM_SIZE_IN_BYTES: usize = 128;

const PACKED_GROUP_SIZE_IN_BYTES: usize = 8;
const UNPACKED_GROUP_SIZE_IN_BYTES: usize = 7;
const LOW_SEVEN_BITS_MASK: u8 = 0x7F;

/// Unpacks a program dump payload into the 128 parameter bytes of one voice.
///
/// Only whole 8 byte groups are accepted, and they must produce at least a full
/// program. Extra unpacked bytes past 128 are dropped.
pub fn unpack_program(packed: &[u8]) -> Result<[u8; PROGRAM_SIZE_IN_BYTES], CodecError> {
    if packed.len() % PACKED_GROUP_SIZE_IN_BYTES != 0 {
        return Err(CodecError::MisalignedLength(packed.len()))
    }

    let unpacked_len = packed.len() / PACKED_GROUP_SIZE_IN_BYTES * UNPACKED_GROUP_SIZE_IN_BYTES;
    if unpacked_len < PROGRAM_SIZE_IN_BYTES {
        return Err(CodecError::TooShort { unpacked: unpacked_len, expected: PROGRAM_SIZE_IN_BYTES })
    }

    let mut program = [0u8; PROGRAM_SIZE_IN_BYTES];
    let unpacked = packed.chunks_exact(PACKED_GROUP_SIZE_IN_BYTES).flat_map(|group| {
        let high_bits = group[0];
        group[1..].iter().enumerate().map(move |(k, low_bits)| low_bits | (((high_bits >> k) & 1) << 7))
    });

    for (parameter, value) in program.iter_mut().zip(unpacked) {
        *parameter = value;
    }

    Ok(program)
}

/// Packs 8 bit data the way the volca does before sending it. A trailing
/// partial group is padded with zeros.
pub fn pack_program(data: &[u8]) -> Vec<u8> {
    let groups = (data.len() + UNPACKED_GROUP_SIZE_IN_BYTES - 1) / UNPACKED_GROUP_SIZE_IN_BYTES;
    let mut packed = Vec::with_capacity(groups * PACKED_GROUP_SIZE_IN_BYTES);

    for group in data.chunks(UNPACKED_GROUP_SIZE_IN_BYTES) {
        let mut high_bits = 0u8;
        for (k, value) in group.iter().enumerate() {
            high_bits |= (value >> 7) << k;
        }

        packed.push(high_bits);
        packed.extend(group.iter().map(|value| value & LOW_SEVEN_BITS_MASK));
        packed.resize(packed.len() + UNPACKED_GROUP_SIZE_IN_BYTES - group.len(), 0);
    }

    packed
}

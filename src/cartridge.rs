use std::{
    fs,
    ops::Range,
    path::{Path, PathBuf},
};

use log::*;

use crate::{codec::PROGRAM_SIZE_IN_BYTES, error::ExportError, sysex::EOX};

/// Yamaha DX7 32 voice bulk dump header: manufacturer, channel 1, format 9, byte count 0x2000.
pub const DX7_CARTRIDGE_HEADER: [u8; 6] = [0xF0, 0x43, 0x00, 0x09, 0x20, 0x00];
pub const VOICES_PER_CARTRIDGE: usize = 32;
pub const CARTRIDGE_DATA_SIZE_IN_BYTES: usize = VOICES_PER_CARTRIDGE * PROGRAM_SIZE_IN_BYTES;
pub const CARTRIDGE_SIZE_IN_BYTES: usize = DX7_CARTRIDGE_HEADER.len() + CARTRIDGE_DATA_SIZE_IN_BYTES + 2;

/// One half of the volca bank, exported as its own DX7 cartridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cartridge {
    First,
    Second,
}

impl Cartridge {
    pub const ALL: [Cartridge; 2] = [Cartridge::First, Cartridge::Second];

    pub fn number(&self) -> u8 {
        match self {
            Cartridge::First => 1,
            Cartridge::Second => 2,
        }
    }

    pub fn slots(&self) -> Range<usize> {
        match self {
            Cartridge::First => 0..VOICES_PER_CARTRIDGE,
            Cartridge::Second => VOICES_PER_CARTRIDGE..2 * VOICES_PER_CARTRIDGE,
        }
    }

    pub fn file_name(&self) -> String {
        format!("volca_fm2_dx7_cartridge_{}.syx", self.number())
    }
}

/// DX7 bulk checksum: two's complement of the 8 bit data sum, kept to 7 bits.
pub fn cartridge_checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |sum, value| sum.wrapping_add(*value));
    ((0x100 - sum as u16) & 0x7F) as u8
}

/// Lays 32 voices out as a DX7 cartridge sysex message.
pub fn build_cartridge<'a, I>(voices: I) -> Result<Vec<u8>, ExportError>
where
    I: IntoIterator<Item = &'a [u8; PROGRAM_SIZE_IN_BYTES]>,
{
    let mut data = Vec::with_capacity(CARTRIDGE_DATA_SIZE_IN_BYTES);
    let mut voice_count = 0;
    for voice in voices {
        data.extend_from_slice(voice);
        voice_count += 1;
    }

    if voice_count != VOICES_PER_CARTRIDGE {
        return Err(ExportError::VoiceCount { expected: VOICES_PER_CARTRIDGE, actual: voice_count })
    }

    let mut message = Vec::with_capacity(CARTRIDGE_SIZE_IN_BYTES);
    message.extend_from_slice(&DX7_CARTRIDGE_HEADER);
    message.extend_from_slice(&data);
    message.push(cartridge_checksum(&data));
    message.push(EOX);

    Ok(message)
}

/// Writes an exported cartridge into `dir` under its standard file name.
pub fn write_cartridge(dir: &Path, cartridge: Cartridge, message: &[u8]) -> Result<PathBuf, ExportError> {
    let path = dir.join(cartridge.file_name());
    fs::write(&path, message).map_err(|source| ExportError::Io { path: path.clone(), source })?;
    info!("Wrote cartridge {} to {}", cartridge.number(), path.display());
    Ok(path)
}

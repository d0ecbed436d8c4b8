use crate::{
    cartridge::{build_cartridge, Cartridge},
    codec::PROGRAM_SIZE_IN_BYTES,
    error::ExportError,
};

pub const BANK_SIZE: usize = 64;
pub const LAST_SLOT: usize = BANK_SIZE - 1;

const PROGRAM_NAME_OFFSET: usize = 118;
const PROGRAM_NAME_SIZE_IN_BYTES: usize = 9;

/// A decoded program and the name shown for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceRecord {
    name: String,
    data: [u8; PROGRAM_SIZE_IN_BYTES],
}

impl VoiceRecord {
    pub fn from_program(data: [u8; PROGRAM_SIZE_IN_BYTES]) -> Self {
        let name = convert_program_name(&data[PROGRAM_NAME_OFFSET..PROGRAM_NAME_OFFSET + PROGRAM_NAME_SIZE_IN_BYTES]);
        Self { name, data }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8; PROGRAM_SIZE_IN_BYTES] {
        &self.data
    }
}

fn convert_program_name(name_bytes: &[u8]) -> String {
    let name: String = name_bytes.iter().map(|letter| char::from(*letter)).collect();

    name.trim_end_matches(|letter| letter == ' ' || letter == '\0').to_string()
}

/// The 64 program slots of a volca fm, filled in as dump replies arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bank {
    slots: Vec<Option<VoiceRecord>>,
}

impl Default for Bank {
    fn default() -> Self {
        Self::new()
    }
}

impl Bank {
    pub fn new() -> Self {
        Self {
            slots: vec![None; BANK_SIZE],
        }
    }

    /// Stores a record, returning whatever the slot held before.
    pub fn set(&mut self, slot: usize, record: VoiceRecord) -> Option<VoiceRecord> {
        self.slots.get_mut(slot).and_then(|entry| entry.replace(record))
    }

    pub fn get(&self, slot: usize) -> Option<&VoiceRecord> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|entry| *entry = None);
    }

    pub fn populated(&self) -> usize {
        self.slots.iter().filter(|entry| entry.is_some()).count()
    }

    /// Program names by slot, empty for slots not received yet.
    pub fn names(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|entry| entry.as_ref().map(|record| record.name.clone()).unwrap_or_default())
            .collect()
    }

    pub fn export_cartridge(&self, cartridge: Cartridge) -> Result<Vec<u8>, ExportError> {
        let voices = cartridge
            .slots()
            .map(|slot| self.get(slot).map(VoiceRecord::data).ok_or(ExportError::MissingProgram { slot }))
            .collect::<Result<Vec<_>, _>>()?;

        build_cartridge(voices)
    }
}

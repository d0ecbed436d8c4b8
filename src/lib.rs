//! Librarian for the Korg volca fm 2: finds the synth on the MIDI ports,
//! pulls its 64 program bank over SysEx and writes it back out as two DX7
//! 32 voice cartridges.

pub mod bank;
pub mod cartridge;
pub mod codec;
pub mod config;
pub mod discovery;
pub mod dump;
pub mod error;
#[cfg(feature = "midi-io")]
pub mod midi_io;
pub mod service;
pub mod session;
pub mod state;
pub mod sysex;
pub mod transport;

pub use bank::{Bank, VoiceRecord, BANK_SIZE};
pub use cartridge::{build_cartridge, cartridge_checksum, write_cartridge, Cartridge};
pub use codec::{pack_program, unpack_program, PROGRAM_SIZE_IN_BYTES};
pub use config::LibrarianConfig;
pub use error::{CodecError, ConfigError, ExportError, LibrarianError, TransportError};
#[cfg(feature = "midi-io")]
pub use midi_io::MidirTransport;
pub use service::{IncomingEvent, LibrarianService, OutgoingEvent};
pub use session::Librarian;
pub use state::{ConnectionState, PairedEndpoint};
pub use transport::{InboundMessage, MidiTransport, Port};

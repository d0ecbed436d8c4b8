use std::{io, path::PathBuf};

use thiserror::Error;

use crate::state::ConnectionState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("could not initialize MIDI client: {0}")]
    Init(String),
    #[error("could not connect to port {port}: {reason}")]
    Connect { port: String, reason: String },
    #[error("no output port named {0}")]
    UnknownPort(String),
    #[error("failed to send to {port}: {reason}")]
    Send { port: String, reason: String },
}

#[cfg(feature = "midi-io")]
impl From<midir::InitError> for TransportError {
    fn from(error: midir::InitError) -> Self {
        TransportError::Init(error.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("packed payload length {0} is not a multiple of 8")]
    MisalignedLength(usize),
    #[error("packed payload unpacks to {unpacked} bytes, a program needs {expected}")]
    TooShort { unpacked: usize, expected: usize },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("program slot {slot} has not been received")]
    MissingProgram { slot: usize },
    #[error("a cartridge holds {expected} voices, got {actual}")]
    VoiceCount { expected: usize, actual: usize },
    #[error("could not write {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum LibrarianError {
    #[error("no volca fm has been paired yet")]
    NotPaired,
    #[error("paired output port {output} is no longer available")]
    PairingLost { output: String },
    #[error("cannot {action} while {state}")]
    InvalidState { action: &'static str, state: ConnectionState },
    #[error("MIDI transport is unavailable")]
    TransportUnavailable,
    #[error("librarian service did not answer")]
    ServiceUnavailable,
    #[error(transparent)]
    Export(#[from] ExportError),
}

use std::fmt;

/// Where the session stands with the volca.
///
/// Moves `Initializing -> Searching -> {NotFound | Detected} -> Receiving -> Received`.
/// `Error` can be entered from anywhere and only `reset` leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Initializing,
    Searching,
    NotFound,
    Detected,
    Receiving,
    Received,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Initializing => "initializing",
            ConnectionState::Searching => "searching",
            ConnectionState::NotFound => "not found",
            ConnectionState::Detected => "detected",
            ConnectionState::Receiving => "receiving",
            ConnectionState::Received => "received",
            ConnectionState::Error => "in error",
        };
        f.write_str(label)
    }
}

/// Input and output port names of the paired device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedEndpoint {
    pub input: String,
    pub output: String,
}

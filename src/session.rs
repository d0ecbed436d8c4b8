use std::time::{Duration, Instant};

use log::*;

use crate::{
    bank::Bank,
    cartridge::Cartridge,
    config::LibrarianConfig,
    discovery::DiscoveryTimer,
    dump::DumpRequester,
    error::{LibrarianError, TransportError},
    state::{ConnectionState, PairedEndpoint},
    sysex::{classify, to_hex, SysexMessage},
    transport::{InboundMessage, MidiTransport},
};

/// Everything one librarian session knows about the volca. State only
/// changes through these methods, so whoever owns the `Librarian` is the
/// single writer.
///
/// Timers are not threads: discovery and dump deadlines are stored here and
/// fired by `poll`, which the owner calls whenever `next_deadline` passes.
#[derive(Debug)]
pub struct Librarian {
    pub(crate) state: ConnectionState,
    pub(crate) paired: Option<PairedEndpoint>,
    pub(crate) bank: Bank,
    pub(crate) discovery: Option<DiscoveryTimer>,
    pub(crate) dump: Option<DumpRequester>,
    // bumped on every reset and discovery so older timers can tell they are stale
    pub(crate) cycle: u64,
    pub(crate) discovery_timeout: Duration,
    pub(crate) request_interval: Duration,
    pub(crate) dump_timeout: Option<Duration>,
}

impl Librarian {
    pub fn new(config: &LibrarianConfig) -> Self {
        Self {
            state: ConnectionState::Initializing,
            paired: None,
            bank: Bank::new(),
            discovery: None,
            dump: None,
            cycle: 0,
            discovery_timeout: config.discovery_timeout(),
            request_interval: config.request_interval(),
            dump_timeout: config.dump_timeout(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn paired(&self) -> Option<&PairedEndpoint> {
        self.paired.as_ref()
    }

    pub fn bank(&self) -> &Bank {
        &self.bank
    }

    pub fn handle_message<T: MidiTransport + ?Sized>(&mut self, transport: &T, message: &InboundMessage) {
        match classify(&message.bytes) {
            SysexMessage::IdentityReply(reply) => self.handle_identity_reply(transport, &message.port, reply),
            SysexMessage::ProgramDump(dump) => self.handle_program_dump(dump),
            SysexMessage::Unrecognized => {
                trace!("Ignoring message from {}: {}", message.port.name, to_hex(&message.bytes));
            }
        }
    }

    /// Fires whatever timers are due at `now`.
    pub fn poll<T: MidiTransport + ?Sized>(&mut self, transport: &mut T, now: Instant) {
        self.poll_discovery(now);
        self.poll_dump(transport, now);
    }

    /// Earliest instant at which `poll` has something to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let discovery = self.discovery.map(|timer| timer.deadline);
        let dump = self.dump.as_ref().and_then(DumpRequester::next_deadline);

        [discovery, dump].into_iter().flatten().min()
    }

    /// Drops the pairing, the bank and any pending timers.
    pub fn reset(&mut self) {
        info!("Resetting librarian session.");
        self.cycle += 1;
        self.discovery = None;
        self.dump = None;
        self.paired = None;
        self.bank.reset();
        self.transition(ConnectionState::Initializing);
    }

    pub fn transport_unavailable(&mut self, error: &TransportError) {
        error!("MIDI transport unavailable: {}", error);
        self.fail();
    }

    pub fn export_cartridge(&self, cartridge: Cartridge) -> Result<Vec<u8>, LibrarianError> {
        let message = self.bank.export_cartridge(cartridge)?;
        info!("Exported cartridge {} ({} bytes)", cartridge.number(), message.len());
        Ok(message)
    }

    pub(crate) fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            info!("Connection state: {} -> {}", self.state, next);
            self.state = next;
        }
    }

    pub(crate) fn fail(&mut self) {
        self.discovery = None;
        self.dump = None;
        self.transition(ConnectionState::Error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::{pack_program, PROGRAM_SIZE_IN_BYTES},
        sysex::{identity_reply_message, program_dump_message},
        transport::testing::RecordingTransport,
    };

    #[test]
    fn starts_initializing_and_empty() {
        let librarian = Librarian::new(&LibrarianConfig::default());
        assert_eq!(librarian.state(), ConnectionState::Initializing);
        assert_eq!(librarian.paired(), None);
        assert_eq!(librarian.bank().populated(), 0);
        assert_eq!(librarian.next_deadline(), None);
    }

    #[test]
    fn unrecognized_messages_change_nothing() {
        let transport = RecordingTransport::with_ports(&["volca fm"], &["volca fm"]);
        let mut librarian = Librarian::new(&LibrarianConfig::default());

        for bytes in [vec![0x90, 0x40, 0x7F], vec![0xF0, 0x41, 0x10, 0xF7], vec![]] {
            librarian.handle_message(&transport, &InboundMessage { port: transport.input("volca fm"), bytes });
        }

        assert_eq!(librarian.state(), ConnectionState::Initializing);
        assert_eq!(librarian.bank().populated(), 0);
    }

    #[test]
    fn reset_clears_pairing_bank_and_error() {
        let mut transport = RecordingTransport::with_ports(&["volca fm"], &["volca fm"]);
        let mut librarian = Librarian::new(&LibrarianConfig::default());
        let now = Instant::now();

        librarian.start_discovery(&mut transport, now).unwrap();
        librarian.handle_message(&transport, &InboundMessage { port: transport.input("volca fm"), bytes: identity_reply_message() });
        let packed = pack_program(&[0u8; PROGRAM_SIZE_IN_BYTES]);
        librarian.handle_message(&transport, &InboundMessage { port: transport.input("volca fm"), bytes: program_dump_message(4, &packed) });
        librarian.transport_unavailable(&TransportError::Init(String::from("gone")));
        assert_eq!(librarian.state(), ConnectionState::Error);

        librarian.reset();

        assert_eq!(librarian.state(), ConnectionState::Initializing);
        assert_eq!(librarian.paired(), None);
        assert_eq!(librarian.bank().populated(), 0);
        assert_eq!(librarian.next_deadline(), None);
    }

    #[test]
    fn export_reports_missing_programs() {
        let librarian = Librarian::new(&LibrarianConfig::default());
        assert!(matches!(
            librarian.export_cartridge(Cartridge::Second),
            Err(LibrarianError::Export(crate::error::ExportError::MissingProgram { slot: 32 }))
        ));
    }
}

use std::time::Instant;

use log::*;

use crate::{
    error::LibrarianError,
    session::Librarian,
    state::{ConnectionState, PairedEndpoint},
    sysex::{device_inquiry, to_hex, IdentityReply},
    transport::{MidiTransport, Port},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DiscoveryTimer {
    pub(crate) cycle: u64,
    pub(crate) deadline: Instant,
}

impl Librarian {
    /// Broadcasts an identity request on every output port and starts waiting
    /// for a volca fm to answer. Returns the number of ports the request went out on.
    pub fn start_discovery<T: MidiTransport + ?Sized>(&mut self, transport: &mut T, now: Instant) -> Result<usize, LibrarianError> {
        if matches!(self.state, ConnectionState::Receiving | ConnectionState::Error) {
            return Err(LibrarianError::InvalidState { action: "start discovery", state: self.state })
        }

        self.cycle += 1;
        self.paired = None;
        self.dump = None;
        self.transition(ConnectionState::Searching);

        let inquiry = device_inquiry();
        let mut sent = 0;
        for port in transport.output_ports() {
            match transport.send(&port, &inquiry) {
                Ok(()) => sent += 1,
                Err(error) => warn!("Could not send identity request to {}: {}", port.name, error),
            }
        }
        info!("Sent identity request to {} output port(s).", sent);

        self.discovery = Some(DiscoveryTimer { cycle: self.cycle, deadline: now + self.discovery_timeout });
        Ok(sent)
    }

    pub(crate) fn handle_identity_reply<T: MidiTransport + ?Sized>(&mut self, transport: &T, input: &Port, reply: IdentityReply<'_>) {
        if self.state != ConnectionState::Searching {
            debug!("Ignoring identity reply from {} while {}.", input.name, self.state);
            return
        }

        info!(
            "volca fm 2 answered on {} (device id {}, revision {})",
            input.name,
            reply.device_id(),
            reply.software_revision().map(to_hex).unwrap_or_default()
        );

        // a device's input and output ports share a name
        match transport.output_ports().into_iter().find(|output| output.name == input.name) {
            Some(output) => {
                info!("Paired input {} with output {}", input.name, output.name);
                self.paired = Some(PairedEndpoint { input: input.name.clone(), output: output.name });
                self.discovery = None;
                self.transition(ConnectionState::Detected);
            }
            None => warn!("No output port named {}, ignoring identity reply.", input.name),
        }
    }

    pub(crate) fn poll_discovery(&mut self, now: Instant) {
        let Some(timer) = self.discovery else {
            return
        };

        if timer.cycle != self.cycle || self.state != ConnectionState::Searching {
            self.discovery = None;
            return
        }

        if now >= timer.deadline {
            warn!("No volca fm answered within {:?}.", self.discovery_timeout);
            self.discovery = None;
            self.transition(ConnectionState::NotFound);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::LibrarianConfig,
        sysex::identity_reply_message,
        transport::{testing::RecordingTransport, InboundMessage},
    };

    fn reply_from(transport: &RecordingTransport, input: &str) -> InboundMessage {
        InboundMessage { port: transport.input(input), bytes: identity_reply_message() }
    }

    #[test]
    fn inquiry_goes_to_every_output() {
        let mut transport = RecordingTransport::with_ports(&["volca fm"], &["Midi Through", "volca fm", "USB Uno"]);
        let mut librarian = Librarian::new(&LibrarianConfig::default());

        assert_eq!(librarian.start_discovery(&mut transport, Instant::now()).unwrap(), 3);

        assert_eq!(librarian.state(), ConnectionState::Searching);
        for output in ["Midi Through", "volca fm", "USB Uno"] {
            assert_eq!(transport.sent_to(output), vec![vec![0xF0, 0x7E, 0x7F, 0x06, 0x01, 0xF7]]);
        }
    }

    #[test]
    fn reply_pairs_ports_with_the_same_name() {
        let mut transport = RecordingTransport::with_ports(&["Midi Through", "volca fm"], &["Midi Through", "volca fm"]);
        let mut librarian = Librarian::new(&LibrarianConfig::default());
        let now = Instant::now();

        librarian.start_discovery(&mut transport, now).unwrap();
        librarian.handle_message(&transport, &reply_from(&transport, "volca fm"));

        assert_eq!(librarian.state(), ConnectionState::Detected);
        assert_eq!(
            librarian.paired(),
            Some(&PairedEndpoint { input: String::from("volca fm"), output: String::from("volca fm") })
        );

        // timer is disarmed
        assert_eq!(librarian.next_deadline(), None);
        librarian.poll(&mut transport, now + Duration::from_secs(10));
        assert_eq!(librarian.state(), ConnectionState::Detected);
    }

    #[test]
    fn reply_without_matching_output_keeps_searching_until_timeout() {
        let mut transport = RecordingTransport::with_ports(&["volca fm MIDI 1"], &["volca fm MIDI 2"]);
        let mut librarian = Librarian::new(&LibrarianConfig::default());
        let now = Instant::now();

        librarian.start_discovery(&mut transport, now).unwrap();
        librarian.handle_message(&transport, &reply_from(&transport, "volca fm MIDI 1"));

        assert_eq!(librarian.state(), ConnectionState::Searching);
        assert_eq!(librarian.paired(), None);

        librarian.poll(&mut transport, now + Duration::from_millis(1999));
        assert_eq!(librarian.state(), ConnectionState::Searching);

        assert_eq!(librarian.next_deadline(), Some(now + Duration::from_millis(2000)));
        librarian.poll(&mut transport, now + Duration::from_millis(2000));
        assert_eq!(librarian.state(), ConnectionState::NotFound);
        assert_eq!(librarian.next_deadline(), None);
    }

    #[test]
    fn first_reply_wins() {
        let mut transport = RecordingTransport::with_ports(&["volca fm A", "volca fm B"], &["volca fm A", "volca fm B"]);
        let mut librarian = Librarian::new(&LibrarianConfig::default());

        librarian.start_discovery(&mut transport, Instant::now()).unwrap();
        librarian.handle_message(&transport, &reply_from(&transport, "volca fm B"));
        librarian.handle_message(&transport, &reply_from(&transport, "volca fm A"));

        assert_eq!(librarian.paired().map(|paired| paired.output.as_str()), Some("volca fm B"));
    }

    #[test]
    fn reply_outside_discovery_is_ignored() {
        let transport = RecordingTransport::with_ports(&["volca fm"], &["volca fm"]);
        let mut librarian = Librarian::new(&LibrarianConfig::default());

        librarian.handle_message(&transport, &reply_from(&transport, "volca fm"));

        assert_eq!(librarian.state(), ConnectionState::Initializing);
        assert_eq!(librarian.paired(), None);
    }

    #[test]
    fn not_found_can_search_again() {
        let mut transport = RecordingTransport::with_ports(&["volca fm"], &["volca fm"]);
        let mut librarian = Librarian::new(&LibrarianConfig::default());
        let now = Instant::now();

        librarian.start_discovery(&mut transport, now).unwrap();
        librarian.poll(&mut transport, now + Duration::from_secs(3));
        assert_eq!(librarian.state(), ConnectionState::NotFound);

        librarian.start_discovery(&mut transport, now + Duration::from_secs(4)).unwrap();
        librarian.handle_message(&transport, &reply_from(&transport, "volca fm"));
        assert_eq!(librarian.state(), ConnectionState::Detected);
    }

    #[test]
    fn timer_left_over_from_before_a_reset_does_nothing() {
        let mut transport = RecordingTransport::with_ports(&["volca fm"], &["volca fm"]);
        let mut librarian = Librarian::new(&LibrarianConfig::default());
        let now = Instant::now();

        librarian.start_discovery(&mut transport, now).unwrap();
        let stale = librarian.discovery;
        librarian.reset();
        librarian.transition(ConnectionState::Searching);
        librarian.discovery = stale;

        librarian.poll(&mut transport, now + Duration::from_secs(5));

        assert_eq!(librarian.state(), ConnectionState::Searching);
        assert_eq!(librarian.discovery, None);
    }

    #[test]
    fn discovery_is_refused_in_error() {
        let mut transport = RecordingTransport::with_ports(&[], &["volca fm"]);
        let mut librarian = Librarian::new(&LibrarianConfig::default());
        librarian.fail();

        assert!(matches!(
            librarian.start_discovery(&mut transport, Instant::now()),
            Err(LibrarianError::InvalidState { state: ConnectionState::Error, .. })
        ));
        assert!(transport.sent.is_empty());
    }
}

use std::time::Instant;

use log::*;

use crate::{
    bank::{VoiceRecord, BANK_SIZE, LAST_SLOT},
    codec::unpack_program,
    error::LibrarianError,
    session::Librarian,
    state::ConnectionState,
    sysex::{program_dump_request, ProgramDump},
    transport::{MidiTransport, Port},
};

/// Paces program dump requests to the paired output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DumpRequester {
    output: Port,
    next_slot: usize,
    next_request_at: Instant,
    // armed once the last request is out; slot 63 must arrive by then
    deadline: Option<Instant>,
    cycle: u64,
}

impl DumpRequester {
    fn requests_pending(&self) -> bool {
        self.next_slot < BANK_SIZE
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        let next_request = self.requests_pending().then_some(self.next_request_at);
        [next_request, self.deadline].into_iter().flatten().min()
    }
}

impl Librarian {
    /// Clears the bank and starts asking the paired volca for programs 0 to 63,
    /// one request per interval. Requests go out whether or not the previous
    /// one was answered. The completion timeout counts from the last request.
    pub fn request_dump<T: MidiTransport + ?Sized>(&mut self, transport: &mut T, now: Instant) -> Result<(), LibrarianError> {
        if self.state == ConnectionState::Error {
            return Err(LibrarianError::InvalidState { action: "request a dump", state: self.state })
        }

        let paired = self.paired.clone().ok_or(LibrarianError::NotPaired)?;

        self.bank.reset();
        if matches!(self.state, ConnectionState::Receiving | ConnectionState::Received) {
            self.transition(ConnectionState::Detected);
        }

        let Some(output) = transport.output_ports().into_iter().find(|port| port.name == paired.output) else {
            error!("Paired output port {} has disappeared.", paired.output);
            self.fail();
            return Err(LibrarianError::PairingLost { output: paired.output })
        };

        info!("Requesting {} programs from {}", BANK_SIZE, output.name);
        self.dump = Some(DumpRequester {
            output,
            next_slot: 0,
            next_request_at: now,
            deadline: None,
            cycle: self.cycle,
        });
        self.poll_dump(transport, now);

        if self.state == ConnectionState::Error {
            return Err(LibrarianError::PairingLost { output: paired.output })
        }

        Ok(())
    }

    pub(crate) fn poll_dump<T: MidiTransport + ?Sized>(&mut self, transport: &mut T, now: Instant) {
        let Some(mut requester) = self.dump.take() else {
            return
        };

        if requester.cycle != self.cycle {
            return
        }

        if requester.requests_pending() && now >= requester.next_request_at {
            let slot = requester.next_slot as u8;
            debug!("Requesting program {} from {}", slot, requester.output.name);

            if let Err(error) = transport.send(&requester.output, &program_dump_request(slot)) {
                error!("Could not request program {}: {}", slot, error);
                self.fail();
                return
            }

            requester.next_slot += 1;
            requester.next_request_at = now + self.request_interval;
            if !requester.requests_pending() {
                requester.deadline = self.dump_timeout.map(|timeout| now + timeout);
            }
        }

        if self.state != ConnectionState::Received {
            if let Some(deadline) = requester.deadline {
                if now >= deadline {
                    error!("Bank dump did not complete, {} of {} programs received.", self.bank.populated(), BANK_SIZE);
                    self.fail();
                    return
                }
            }
        }

        let finished = !requester.requests_pending()
            && (self.state == ConnectionState::Received || self.dump_timeout.is_none());
        if !finished {
            self.dump = Some(requester);
        }
    }

    pub(crate) fn handle_program_dump(&mut self, dump: ProgramDump<'_>) {
        if self.state == ConnectionState::Error {
            debug!("Ignoring program dump while {}.", self.state);
            return
        }

        let slot = dump.slot() as usize;
        if slot >= BANK_SIZE {
            warn!("Ignoring program dump for slot {}, the bank has {} slots.", slot, BANK_SIZE);
            return
        }

        let program = match unpack_program(dump.payload()) {
            Ok(program) => program,
            Err(error) => {
                warn!("Dropping program dump for slot {}: {}", slot, error);
                return
            }
        };

        let record = VoiceRecord::from_program(program);
        info!("Received program {}: {}", slot, record.name());
        self.bank.set(slot, record);

        if !matches!(self.state, ConnectionState::Receiving | ConnectionState::Received) {
            self.transition(ConnectionState::Receiving);
        }

        if slot == LAST_SLOT {
            info!("Bank dump complete, {} of {} programs received.", self.bank.populated(), BANK_SIZE);
            self.transition(ConnectionState::Received);
        }
    }
}

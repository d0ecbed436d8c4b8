use std::{
    collections::HashMap,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use itertools::Itertools;
use log::*;

use crate::{
    cartridge::Cartridge,
    config::LibrarianConfig,
    error::{LibrarianError, TransportError},
    session::Librarian,
    state::{ConnectionState, PairedEndpoint},
    transport::{InboundMessage, MidiTransport, Port},
};

// wake up at least this often even with no timer armed
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);
const STATE_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingEvent {
    GetInputPorts,
    GetOutputPorts,
    GetConnectionState,
    GetProgramNames,
    Detect,
    RequestDump,
    ExportCartridge(Cartridge),
    Reset,
    Close,
}

#[derive(Debug)]
pub enum OutgoingEvent {
    InputPorts(HashMap<usize, String>),
    OutputPorts(HashMap<usize, String>),
    ConnectionState(ConnectionState, Option<PairedEndpoint>),
    ProgramNames(Vec<String>),
    Cartridge(Cartridge, Result<Vec<u8>, LibrarianError>),
    CommandResult(Result<(), LibrarianError>),
}

/// Runs a `Librarian` on its own thread. The thread owns the transport and is
/// the only place session state changes; clients talk to it through channels.
pub struct LibrarianService {
    commands: Sender<IncomingEvent>,
    events: Receiver<OutgoingEvent>,
    receive_timeout: Duration,
    worker: Option<JoinHandle<()>>,
}

impl LibrarianService {
    /// `open_transport` runs on the service thread and is handed the sender
    /// inbound MIDI must be pushed into.
    pub fn spawn<T, F>(config: LibrarianConfig, open_transport: F) -> Self
    where
        T: MidiTransport,
        F: FnOnce(Sender<InboundMessage>) -> Result<T, TransportError> + Send + 'static,
    {
        let (commands, command_rx) = unbounded::<IncomingEvent>();
        let (event_tx, events) = unbounded::<OutgoingEvent>();
        let receive_timeout = config.receive_timeout();

        let worker = thread::Builder::new()
            .name(String::from("volca-librarian"))
            .spawn(move || run(config, open_transport, command_rx, event_tx))
            .ok();

        if worker.is_none() {
            error!("Could not start the librarian service thread.");
        }

        Self {
            commands,
            events,
            receive_timeout,
            worker,
        }
    }

    fn request(&self, event: IncomingEvent) -> Result<OutgoingEvent, LibrarianError> {
        // replies that arrived after their caller gave up
        for stale in self.events.try_iter() {
            debug!("Discarding late reply: {:?}", stale);
        }

        self.commands.send(event).map_err(|_| LibrarianError::ServiceUnavailable)?;
        self.events.recv_timeout(self.receive_timeout).map_err(|_| LibrarianError::ServiceUnavailable)
    }

    pub fn input_ports(&self) -> Result<Vec<Port>, LibrarianError> {
        match self.request(IncomingEvent::GetInputPorts)? {
            OutgoingEvent::InputPorts(ports) => Ok(sorted_ports(ports)),
            _ => Err(LibrarianError::ServiceUnavailable),
        }
    }

    pub fn output_ports(&self) -> Result<Vec<Port>, LibrarianError> {
        match self.request(IncomingEvent::GetOutputPorts)? {
            OutgoingEvent::OutputPorts(ports) => Ok(sorted_ports(ports)),
            _ => Err(LibrarianError::ServiceUnavailable),
        }
    }

    pub fn connection_state(&self) -> Result<(ConnectionState, Option<PairedEndpoint>), LibrarianError> {
        match self.request(IncomingEvent::GetConnectionState)? {
            OutgoingEvent::ConnectionState(state, paired) => Ok((state, paired)),
            _ => Err(LibrarianError::ServiceUnavailable),
        }
    }

    pub fn program_names(&self) -> Result<Vec<String>, LibrarianError> {
        match self.request(IncomingEvent::GetProgramNames)? {
            OutgoingEvent::ProgramNames(names) => Ok(names),
            _ => Err(LibrarianError::ServiceUnavailable),
        }
    }

    pub fn detect(&self) -> Result<(), LibrarianError> {
        self.command(IncomingEvent::Detect)
    }

    pub fn request_dump(&self) -> Result<(), LibrarianError> {
        self.command(IncomingEvent::RequestDump)
    }

    pub fn reset(&self) -> Result<(), LibrarianError> {
        self.command(IncomingEvent::Reset)
    }

    pub fn export_cartridge(&self, cartridge: Cartridge) -> Result<Vec<u8>, LibrarianError> {
        match self.request(IncomingEvent::ExportCartridge(cartridge))? {
            OutgoingEvent::Cartridge(exported, result) if exported == cartridge => result,
            _ => Err(LibrarianError::ServiceUnavailable),
        }
    }

    /// Polls the connection state until `done` accepts it or `timeout` runs out.
    /// Returns the last state seen.
    pub fn wait_for<P>(&self, timeout: Duration, done: P) -> Result<ConnectionState, LibrarianError>
    where
        P: Fn(ConnectionState) -> bool,
    {
        let give_up_at = Instant::now() + timeout;
        loop {
            let (state, _) = self.connection_state()?;
            if done(state) || Instant::now() >= give_up_at {
                return Ok(state)
            }
            thread::sleep(STATE_POLL_INTERVAL);
        }
    }

    fn command(&self, event: IncomingEvent) -> Result<(), LibrarianError> {
        match self.request(event)? {
            OutgoingEvent::CommandResult(result) => result,
            _ => Err(LibrarianError::ServiceUnavailable),
        }
    }

    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.commands.send(IncomingEvent::Close);
            if worker.join().is_err() {
                error!("Librarian service thread panicked.");
            }
        }
    }
}

impl Drop for LibrarianService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn sorted_ports(ports: HashMap<usize, String>) -> Vec<Port> {
    ports.into_iter().sorted().map(|(id, name)| Port { id, name }).collect()
}

fn port_map(ports: Vec<Port>) -> HashMap<usize, String> {
    ports.into_iter().map(|port| (port.id, port.name)).collect()
}

fn run<T, F>(config: LibrarianConfig, open_transport: F, command_rx: Receiver<IncomingEvent>, event_tx: Sender<OutgoingEvent>)
where
    T: MidiTransport,
    F: FnOnce(Sender<InboundMessage>) -> Result<T, TransportError>,
{
    let (inbound_tx, inbound_rx) = unbounded::<InboundMessage>();
    let mut librarian = Librarian::new(&config);

    // keeps the inbound channel connected even if the transport never opens
    let _inbound_keep_alive = inbound_tx.clone();
    let mut transport = match open_transport(inbound_tx) {
        Ok(transport) => {
            info!("MIDI transport open.");
            Some(transport)
        }
        Err(error) => {
            librarian.transport_unavailable(&error);
            None
        }
    };

    loop {
        let timeout = librarian
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_POLL_INTERVAL);

        select! {
            recv(command_rx) -> command => match command {
                Ok(IncomingEvent::Close) | Err(_) => break,
                Ok(command) => {
                    debug!("Client request received: {:?}", command);
                    let reply = handle_command(&mut librarian, transport.as_mut(), command);
                    let _ = event_tx.send(reply);
                }
            },
            recv(inbound_rx) -> message => {
                if let (Ok(message), Some(transport)) = (message, transport.as_ref()) {
                    librarian.handle_message(transport, &message);
                }
            },
            default(timeout) => {},
        }

        if let Some(transport) = transport.as_mut() {
            librarian.poll(transport, Instant::now());
        }
    }

    info!("Librarian service stopped.");
}

fn handle_command<T: MidiTransport>(librarian: &mut Librarian, transport: Option<&mut T>, command: IncomingEvent) -> OutgoingEvent {
    match command {
        IncomingEvent::GetInputPorts => {
            OutgoingEvent::InputPorts(transport.map(|transport| port_map(transport.input_ports())).unwrap_or_default())
        }
        IncomingEvent::GetOutputPorts => {
            OutgoingEvent::OutputPorts(transport.map(|transport| port_map(transport.output_ports())).unwrap_or_default())
        }
        IncomingEvent::GetConnectionState => OutgoingEvent::ConnectionState(librarian.state(), librarian.paired().cloned()),
        IncomingEvent::GetProgramNames => OutgoingEvent::ProgramNames(librarian.bank().names()),
        IncomingEvent::Detect => OutgoingEvent::CommandResult(match transport {
            Some(transport) => librarian.start_discovery(transport, Instant::now()).map(|_| ()),
            None => Err(LibrarianError::TransportUnavailable),
        }),
        IncomingEvent::RequestDump => OutgoingEvent::CommandResult(match transport {
            Some(transport) => librarian.request_dump(transport, Instant::now()),
            None => Err(LibrarianError::TransportUnavailable),
        }),
        IncomingEvent::ExportCartridge(cartridge) => OutgoingEvent::Cartridge(cartridge, librarian.export_cartridge(cartridge)),
        IncomingEvent::Reset => {
            librarian.reset();
            OutgoingEvent::CommandResult(Ok(()))
        }
        // handled by the loop
        IncomingEvent::Close => OutgoingEvent::CommandResult(Ok(())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::RecordingTransport;

    fn quick_config() -> LibrarianConfig {
        LibrarianConfig { discovery_timeout_ms: 50, receive_timeout_ms: 1000, ..Default::default() }
    }

    #[test]
    fn lists_ports_in_id_order() {
        let service = LibrarianService::spawn(quick_config(), |_| {
            Ok(RecordingTransport::with_ports(&["b", "a"], &["x", "y", "z"]))
        });

        let inputs = service.input_ports().unwrap();
        assert_eq!(inputs, vec![Port { id: 0, name: String::from("b") }, Port { id: 1, name: String::from("a") }]);
        assert_eq!(service.output_ports().unwrap().len(), 3);
        service.close();
    }

    #[test]
    fn silent_ports_end_in_not_found() {
        let service = LibrarianService::spawn(quick_config(), |_| Ok(RecordingTransport::with_ports(&["a"], &["a"])));

        service.detect().unwrap();
        let state = service.wait_for(Duration::from_secs(2), |state| state != ConnectionState::Searching).unwrap();

        assert_eq!(state, ConnectionState::NotFound);
        assert!(matches!(service.request_dump(), Err(LibrarianError::NotPaired)));
    }

    #[test]
    fn failed_transport_puts_the_session_in_error() {
        let service = LibrarianService::spawn(quick_config(), |_| -> Result<RecordingTransport, TransportError> {
            Err(TransportError::Init(String::from("no MIDI here")))
        });

        assert_eq!(service.connection_state().unwrap(), (ConnectionState::Error, None));
        assert!(service.input_ports().unwrap().is_empty());
        assert!(matches!(service.detect(), Err(LibrarianError::TransportUnavailable)));

        service.reset().unwrap();
        assert_eq!(service.connection_state().unwrap().0, ConnectionState::Initializing);
    }
}

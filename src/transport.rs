use crate::error::TransportError;

/// A MIDI port as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Port {
    pub id: usize,
    pub name: String,
}

/// Bytes received on an input port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub port: Port,
    pub bytes: Vec<u8>,
}

/// Whatever moves bytes between us and the MIDI ports. Inbound messages are
/// not pulled through this trait; an implementation pushes them into the
/// `crossbeam_channel::Sender<InboundMessage>` it was opened with.
pub trait MidiTransport {
    fn input_ports(&self) -> Vec<Port>;
    fn output_ports(&self) -> Vec<Port>;
    fn send(&mut self, port: &Port, message: &[u8]) -> Result<(), TransportError>;
}

use std::collections::HashMap;

use crossbeam_channel::Sender;
use log::*;
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use crate::{
    error::TransportError,
    sysex::to_hex,
    transport::{InboundMessage, MidiTransport, Port},
};

/// `MidiTransport` over the host MIDI stack. Every input port is listened to
/// from the moment the transport opens; output connections are made on first
/// send and kept.
pub struct MidirTransport {
    client_name: String,
    midi_in: MidiInput,
    midi_out: MidiOutput,
    input_connections: Vec<MidiInputConnection<()>>,
    output_connections: HashMap<String, MidiOutputConnection>,
}

impl MidirTransport {
    pub fn open(client_name: &str, inbound: Sender<InboundMessage>) -> Result<Self, TransportError> {
        let midi_in = MidiInput::new(client_name)?;
        let midi_out = MidiOutput::new(client_name)?;
        let mut input_connections = vec![];

        for (index, in_port) in midi_in.ports().iter().enumerate() {
            let port_name = match midi_in.port_name(in_port) {
                Ok(port_name) => port_name,
                Err(error) => {
                    warn!("Skipping input port {}: {}", index, error);
                    continue
                }
            };

            let mut listener = MidiInput::new(client_name)?;
            listener.ignore(Ignore::None);

            let port = Port { id: index, name: port_name.clone() };
            let inbound = inbound.clone();
            match listener.connect(
                in_port,
                &format!("{} input", client_name),
                move |_, message, _| {
                    trace!("Received from {}: {}", port.name, to_hex(message));
                    let _ = inbound.send(InboundMessage { port: port.clone(), bytes: message.to_vec() });
                },
                ()
            ) {
                Ok(connection) => {
                    info!("Listening on input port {}: {}", index, port_name);
                    input_connections.push(connection);
                }
                Err(error) => warn!("Could not listen on input port {}: {}", port_name, error),
            }
        }

        info!("Listening on {} input port(s).", input_connections.len());

        Ok(Self {
            client_name: client_name.to_string(),
            midi_in,
            midi_out,
            input_connections,
            output_connections: HashMap::new(),
        })
    }

    fn connect_output(&mut self, port: &Port) -> Result<(), TransportError> {
        let midi_out = MidiOutput::new(&self.client_name)?;
        let out_port = midi_out
            .ports()
            .into_iter()
            .find(|out_port| midi_out.port_name(out_port).map(|name| name == port.name).unwrap_or(false))
            .ok_or_else(|| TransportError::UnknownPort(port.name.clone()))?;

        let connection = midi_out
            .connect(&out_port, &format!("{} output", self.client_name))
            .map_err(|error| TransportError::Connect { port: port.name.clone(), reason: error.to_string() })?;

        info!("Connected to output port {}", port.name);
        self.output_connections.insert(port.name.clone(), connection);
        Ok(())
    }
}

impl MidiTransport for MidirTransport {
    fn input_ports(&self) -> Vec<Port> {
        self.midi_in
            .ports()
            .iter()
            .enumerate()
            .filter_map(|(id, port)| self.midi_in.port_name(port).ok().map(|name| Port { id, name }))
            .collect()
    }

    fn output_ports(&self) -> Vec<Port> {
        self.midi_out
            .ports()
            .iter()
            .enumerate()
            .filter_map(|(id, port)| self.midi_out.port_name(port).ok().map(|name| Port { id, name }))
            .collect()
    }

    fn send(&mut self, port: &Port, message: &[u8]) -> Result<(), TransportError> {
        if !self.output_connections.contains_key(&port.name) {
            self.connect_output(port)?;
        }

        let connection = self
            .output_connections
            .get_mut(&port.name)
            .ok_or_else(|| TransportError::UnknownPort(port.name.clone()))?;

        debug!("Sending to {}: {}", port.name, to_hex(message));
        if let Err(error) = connection.send(message) {
            // a dead connection is reopened on the next send
            self.output_connections.remove(&port.name);
            return Err(TransportError::Send { port: port.name.clone(), reason: error.to_string() })
        }

        Ok(())
    }
}

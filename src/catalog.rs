//! MIDI input port enumeration and the midir-backed host.

use std::fmt;
use std::time::Duration;

use crossbeam_channel::unbounded;
use midir::{Ignore, MidiInput};

use crate::connection::{ConnectionHandle, RawMessage};
use crate::error::MidiError;

/// A connectable input endpoint, as enumerated at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortDescriptor {
    pub index: usize,
    pub name: String,
}

impl fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.index, self.name)
    }
}

/// The host MIDI subsystem as seen by a session.
pub trait MidiHost {
    /// Enumerate input ports. No devices is an empty list, not an error.
    fn list_ports(&self) -> Result<Vec<PortDescriptor>, MidiError>;

    /// Open an input stream on `port`.
    fn open(&self, port: &PortDescriptor) -> Result<ConnectionHandle, MidiError>;
}

/// Message classes the driver drops before they reach us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IgnoreFilter {
    pub clock: bool,
    pub active_sense: bool,
    pub sysex: bool,
}

impl IgnoreFilter {
    fn to_midir(self) -> Ignore {
        match (self.sysex, self.clock, self.active_sense) {
            (false, false, false) => Ignore::None,
            (true, false, false) => Ignore::Sysex,
            (false, true, false) => Ignore::Time,
            (true, true, false) => Ignore::SysexAndTime,
            (false, false, true) => Ignore::ActiveSense,
            (true, false, true) => Ignore::SysexAndActiveSense,
            (false, true, true) => Ignore::TimeAndActiveSense,
            (true, true, true) => Ignore::All,
        }
    }
}

/// [`MidiHost`] over the platform backend (ALSA, CoreMIDI, WinMM) via midir.
#[derive(Debug, Clone)]
pub struct MidirHost {
    client_name: String,
    filter: IgnoreFilter,
    poll_interval: Duration,
}

impl MidirHost {
    pub fn new(client_name: &str, filter: IgnoreFilter, poll_interval: Duration) -> Self {
        Self {
            client_name: client_name.to_string(),
            filter,
            poll_interval,
        }
    }

    fn client(&self, suffix: &str) -> Result<MidiInput, MidiError> {
        MidiInput::new(&format!("{}-{}", self.client_name, suffix))
            .map_err(|e| MidiError::DeviceQuery(e.to_string()))
    }
}

impl MidiHost for MidirHost {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>, MidiError> {
        let midi_in = self.client("enumerate")?;
        let ports = midi_in
            .ports()
            .iter()
            .enumerate()
            .map(|(index, port)| PortDescriptor {
                index,
                name: midi_in
                    .port_name(port)
                    .unwrap_or_else(|_| format!("Unknown Device {}", index)),
            })
            .collect::<Vec<_>>();
        log::debug!("Found {} MIDI input port(s)", ports.len());
        Ok(ports)
    }

    fn open(&self, port: &PortDescriptor) -> Result<ConnectionHandle, MidiError> {
        let connection_error = |reason: String| MidiError::Connection {
            port: port.name.clone(),
            reason,
        };

        let mut midi_in = self.client("in")?;
        midi_in.ignore(self.filter.to_midir());

        let ports = midi_in.ports();
        let midir_port = ports
            .get(port.index)
            .ok_or_else(|| connection_error(format!("port index {} not found", port.index)))?;

        // Indices shift when devices come and go between listing and opening.
        let current_name = midi_in
            .port_name(midir_port)
            .map_err(|e| connection_error(e.to_string()))?;
        if current_name != port.name {
            return Err(connection_error(format!(
                "port {} is now '{}'",
                port.index, current_name
            )));
        }

        let (tx, rx) = unbounded::<RawMessage>();
        let connection = midi_in
            .connect(
                midir_port,
                &format!("{}-in", self.client_name),
                move |stamp, message, tx| {
                    log::trace!("MIDI in [{}] {:02X?}", stamp, message);
                    // The receiver is only gone while the handle is being torn down.
                    let _ = tx.send(RawMessage::new(message, stamp));
                },
                tx,
            )
            .map_err(|e| connection_error(e.to_string()))?;

        log::info!("Connected to MIDI port: {}", port.name);

        let probe_host = self.clone();
        let probe_name = port.name.clone();
        let probe = move || match probe_host.list_ports() {
            Ok(ports) => ports.iter().any(|p| p.name == probe_name),
            // Can't tell; keep listening.
            Err(_) => true,
        };

        Ok(
            ConnectionHandle::new(port.clone(), rx, Box::new(connection), self.poll_interval)
                .with_liveness_probe(Box::new(probe)),
        )
    }
}

/// First port whose name contains `pattern`, case-insensitively.
pub fn find_port<'a>(ports: &'a [PortDescriptor], pattern: &str) -> Option<&'a PortDescriptor> {
    let pattern = pattern.to_lowercase();
    ports
        .iter()
        .find(|p| p.name.to_lowercase().contains(&pattern))
}

//! In-memory stand-ins for the host MIDI subsystem and for sinks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{unbounded, Sender};

use crate::catalog::{MidiHost, PortDescriptor};
use crate::connection::{ConnectionHandle, DriverLink, RawMessage};
use crate::decoder::MidiEvent;
use crate::error::MidiError;
use crate::sink::EventSink;

const TEST_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Counts how often it was closed.
pub struct FakeLink {
    closed: Arc<AtomicUsize>,
}

impl DriverLink for FakeLink {
    fn close(self: Box<Self>) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// A handle plus the producer side of its queue and its close counter.
pub fn fake_connection(
    port: PortDescriptor,
) -> (Sender<RawMessage>, ConnectionHandle, Arc<AtomicUsize>) {
    let (tx, rx) = unbounded();
    let closed = Arc::new(AtomicUsize::new(0));
    let link = FakeLink {
        closed: Arc::clone(&closed),
    };
    let handle = ConnectionHandle::new(port, rx, Box::new(link), TEST_POLL_INTERVAL);
    (tx, handle, closed)
}

/// Scripted host. Each opened port receives the scripted messages and is
/// then unplugged, unless [`FakeHost::keep_open`] was called.
pub struct FakeHost {
    ports: Option<Arc<Mutex<Vec<String>>>>,
    busy: Vec<usize>,
    script: Vec<Vec<u8>>,
    keep_open: bool,
    feed: Arc<Mutex<Option<Sender<RawMessage>>>>,
    closed: Arc<AtomicUsize>,
}

impl FakeHost {
    pub fn with_ports(names: &[&str]) -> Self {
        Self {
            ports: Some(Arc::new(Mutex::new(
                names.iter().map(|n| n.to_string()).collect(),
            ))),
            busy: Vec::new(),
            script: Vec::new(),
            keep_open: false,
            feed: Arc::default(),
            closed: Arc::default(),
        }
    }

    /// A host whose MIDI subsystem cannot be queried.
    pub fn unavailable() -> Self {
        Self {
            ports: None,
            ..Self::with_ports(&[])
        }
    }

    pub fn busy(mut self, index: usize) -> Self {
        self.busy.push(index);
        self
    }

    pub fn script(mut self, messages: &[&[u8]]) -> Self {
        self.script = messages.iter().map(|m| m.to_vec()).collect();
        self
    }

    pub fn keep_open(mut self) -> Self {
        self.keep_open = true;
        self
    }

    /// Producer side of the most recently opened port (with `keep_open`).
    pub fn feed(&self) -> Arc<Mutex<Option<Sender<RawMessage>>>> {
        Arc::clone(&self.feed)
    }

    pub fn closed_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closed)
    }

    /// Port names, editable to simulate devices coming and going.
    pub fn port_list(&self) -> Arc<Mutex<Vec<String>>> {
        self.ports.clone().unwrap_or_default()
    }
}

impl MidiHost for FakeHost {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>, MidiError> {
        let ports = self
            .ports
            .as_ref()
            .ok_or_else(|| MidiError::DeviceQuery("no MIDI backend".into()))?;
        let names = ports.lock().unwrap();
        Ok(names
            .iter()
            .enumerate()
            .map(|(index, name)| PortDescriptor {
                index,
                name: name.clone(),
            })
            .collect())
    }

    fn open(&self, port: &PortDescriptor) -> Result<ConnectionHandle, MidiError> {
        if self.busy.contains(&port.index) {
            return Err(MidiError::Connection {
                port: port.name.clone(),
                reason: "port is in use".into(),
            });
        }
        if !self.list_ports()?.contains(port) {
            return Err(MidiError::Connection {
                port: port.name.clone(),
                reason: format!("port index {} not found", port.index),
            });
        }

        let (tx, rx) = unbounded();
        for (stamp, bytes) in self.script.iter().enumerate() {
            tx.send(RawMessage::new(bytes, stamp as u64)).unwrap();
        }
        if self.keep_open {
            *self.feed.lock().unwrap() = Some(tx);
        }

        let link = FakeLink {
            closed: Arc::clone(&self.closed),
        };
        Ok(ConnectionHandle::new(
            port.clone(),
            rx,
            Box::new(link),
            TEST_POLL_INTERVAL,
        ))
    }
}

/// Collects events; clones share the same buffer.
#[derive(Clone, Default)]
pub struct SharedSink {
    events: Arc<Mutex<Vec<MidiEvent>>>,
}

impl SharedSink {
    pub fn events(&self) -> Vec<MidiEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn notes(&self) -> Vec<u8> {
        self.events().iter().map(|e| e.data1).collect()
    }
}

impl EventSink for SharedSink {
    fn emit(&mut self, event: &MidiEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

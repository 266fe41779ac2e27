//! Open input stream to one port.
//!
//! The driver delivers messages on its own callback thread. The callback only
//! pushes each message into an unbounded crossbeam channel; the session loop
//! is the single consumer, so arrival order is preserved end to end.

use std::fmt;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::cancel::CancelToken;
use crate::catalog::PortDescriptor;
use crate::error::MidiError;

/// How often the port is checked for having disappeared from the host.
const LIVENESS_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// One message as produced by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub bytes: Vec<u8>,
    /// When the callback saw the message
    pub received_at: Instant,
    /// Driver timestamp in microseconds (origin is backend specific)
    pub device_stamp_us: u64,
}

impl RawMessage {
    pub fn new(bytes: &[u8], device_stamp_us: u64) -> Self {
        Self {
            bytes: bytes.to_vec(),
            received_at: Instant::now(),
            device_stamp_us,
        }
    }
}

/// Result of a blocking [`ConnectionHandle::receive`].
#[derive(Debug)]
pub enum Received {
    Message(RawMessage),
    Cancelled,
}

/// Driver-side connection kept alive for as long as the handle is open.
pub trait DriverLink {
    fn close(self: Box<Self>);
}

impl<T: Send + 'static> DriverLink for midir::MidiInputConnection<T> {
    fn close(self: Box<Self>) {
        let _ = (*self).close();
    }
}

/// Reports whether the port is still offered by the host.
pub type LivenessProbe = Box<dyn FnMut() -> bool + Send>;

/// Exclusive handle on an open input port.
pub struct ConnectionHandle {
    port: PortDescriptor,
    receiver: Receiver<RawMessage>,
    link: Option<Box<dyn DriverLink>>,
    probe: Option<LivenessProbe>,
    poll_interval: Duration,
    last_probe: Instant,
}

impl ConnectionHandle {
    pub fn new(
        port: PortDescriptor,
        receiver: Receiver<RawMessage>,
        link: Box<dyn DriverLink>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            port,
            receiver,
            link: Some(link),
            probe: None,
            poll_interval,
            last_probe: Instant::now(),
        }
    }

    pub fn with_liveness_probe(mut self, probe: LivenessProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn port(&self) -> &PortDescriptor {
        &self.port
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Block until the next message arrives or `cancel` trips.
    ///
    /// The poll interval only bounds how long cancellation takes to notice;
    /// there is no receive timeout.
    pub fn receive(&mut self, cancel: &CancelToken) -> Result<Received, MidiError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(Received::Cancelled);
            }
            if !self.is_open() {
                return Err(MidiError::TransportFault(self.port.name.clone()));
            }

            match self.receiver.recv_timeout(self.poll_interval) {
                Ok(message) => return Ok(Received::Message(message)),
                Err(RecvTimeoutError::Timeout) => {
                    if !self.probe_alive() {
                        log::warn!("MIDI port '{}' disappeared", self.port.name);
                        return Err(MidiError::TransportFault(self.port.name.clone()));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(MidiError::TransportFault(self.port.name.clone()));
                }
            }
        }
    }

    fn probe_alive(&mut self) -> bool {
        if self.last_probe.elapsed() < LIVENESS_PROBE_INTERVAL {
            return true;
        }
        self.last_probe = Instant::now();
        match self.probe.as_mut() {
            Some(probe) => probe(),
            None => true,
        }
    }

    /// Release the port. Closing twice is a no-op.
    pub fn close(&mut self) {
        if let Some(link) = self.link.take() {
            link.close();
            log::info!("Disconnected from MIDI port: {}", self.port.name);
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("port", &self.port)
            .field("open", &self.is_open())
            .field("pending", &self.receiver.len())
            .finish()
    }
}

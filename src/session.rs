//! One read session: pick a port, connect, and pump events into a sink.
//!
//! # State machine
//! ```text
//! Idle -> PortSelected -> Connected -> Running -> Stopped
//! ```
//! Selection errors leave the state untouched so the caller can ask again. A
//! failed connect, a cancellation or a transport fault all end in `Stopped`,
//! which is terminal: the connection handle is closed and nothing reopens it.

use std::fmt;
use std::time::Instant;

use crate::cancel::CancelToken;
use crate::catalog::{MidiHost, PortDescriptor};
use crate::connection::{ConnectionHandle, Received};
use crate::decoder::decode;
use crate::error::MidiError;
use crate::sink::EventSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    PortSelected,
    Connected,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    ConnectionFailed(String),
    TransportFault(String),
}

/// Counters for one run of the receive loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub received: u64,
    pub emitted: u64,
    pub skipped: u64,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} messages received, {} events shown, {} skipped",
            self.received, self.emitted, self.skipped
        )
    }
}

/// Owns the port selection and the connection handle for one session.
pub struct Session<H: MidiHost> {
    host: H,
    state: SessionState,
    ports: Vec<PortDescriptor>,
    selected: Option<PortDescriptor>,
    handle: Option<ConnectionHandle>,
    summary: SessionSummary,
    stop_reason: Option<StopReason>,
}

impl<H: MidiHost> Session<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            state: SessionState::Idle,
            ports: Vec::new(),
            selected: None,
            handle: None,
            summary: SessionSummary::default(),
            stop_reason: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    pub fn selected(&self) -> Option<&PortDescriptor> {
        self.selected.as_ref()
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stop_reason.as_ref()
    }

    /// Query the host for input ports. Only valid before connecting.
    pub fn refresh_ports(&mut self) -> Result<&[PortDescriptor], MidiError> {
        self.expect_state(&[SessionState::Idle, SessionState::PortSelected])?;
        self.ports = self.host.list_ports()?;
        if let Some(selected) = &self.selected {
            if !self.ports.contains(selected) {
                log::info!("Previously selected port '{}' is gone", selected.name);
                self.selected = None;
                self.state = SessionState::Idle;
            }
        }
        Ok(&self.ports)
    }

    /// Pick a port from the last catalog query by index.
    ///
    /// An out-of-range index leaves the session as it was.
    pub fn select(&mut self, index: usize) -> Result<&PortDescriptor, MidiError> {
        self.expect_state(&[SessionState::Idle, SessionState::PortSelected])?;
        let port = self.ports.get(index).cloned().ok_or(MidiError::Selection {
            index,
            available: self.ports.len(),
        })?;

        log::debug!("Selected MIDI port {}", port);
        self.state = SessionState::PortSelected;
        Ok(self.selected.insert(port))
    }

    /// Open the selected port. Failure is terminal for this session.
    pub fn connect(&mut self) -> Result<(), MidiError> {
        self.expect_state(&[SessionState::PortSelected])?;
        let port = match &self.selected {
            Some(port) => port.clone(),
            None => {
                return Err(MidiError::InvalidState(self.state));
            }
        };

        match self.host.open(&port) {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to connect to {}: {}", port.name, e);
                self.stop_reason = Some(StopReason::ConnectionFailed(e.to_string()));
                self.state = SessionState::Stopped;
                Err(e)
            }
        }
    }

    /// Receive, decode and emit until cancelled or the transport fails.
    ///
    /// Undecodable messages are logged and skipped. Event timestamps are
    /// measured from the moment the loop starts.
    pub fn run(
        &mut self,
        sink: &mut dyn EventSink,
        cancel: &CancelToken,
    ) -> Result<SessionSummary, MidiError> {
        self.expect_state(&[SessionState::Connected])?;
        let mut handle = match self.handle.take() {
            Some(handle) => handle,
            None => return Err(MidiError::InvalidState(self.state)),
        };

        self.state = SessionState::Running;
        self.summary = SessionSummary::default();
        let started = Instant::now();
        log::info!("Listening on {}", handle.port().name);

        let outcome = loop {
            match handle.receive(cancel) {
                Ok(Received::Message(raw)) => {
                    self.summary.received += 1;
                    log::trace!("[{}us] {:02X?}", raw.device_stamp_us, raw.bytes);
                    let now = raw.received_at.saturating_duration_since(started);
                    match decode(&raw.bytes, now) {
                        Ok(event) => {
                            sink.emit(&event);
                            self.summary.emitted += 1;
                        }
                        Err(e) => {
                            self.summary.skipped += 1;
                            let err = MidiError::from(e);
                            log::warn!("Skipping {:02X?}: {}", raw.bytes, err);
                        }
                    }
                }
                Ok(Received::Cancelled) => {
                    self.stop_reason = Some(StopReason::Cancelled);
                    break Ok(());
                }
                Err(e) => {
                    log::error!("MIDI input stopped: {}", e);
                    self.stop_reason = Some(StopReason::TransportFault(e.to_string()));
                    break Err(e);
                }
            }
        };

        handle.close();
        sink.finish();
        self.state = SessionState::Stopped;
        log::info!("Session stopped: {}", self.summary);

        outcome.map(|()| self.summary.clone())
    }

    /// End the session from any state. Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
        if self.state != SessionState::Stopped {
            self.stop_reason.get_or_insert(StopReason::Cancelled);
            self.state = SessionState::Stopped;
        }
    }

    fn expect_state(&self, allowed: &[SessionState]) -> Result<(), MidiError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(MidiError::InvalidState(self.state))
        }
    }
}

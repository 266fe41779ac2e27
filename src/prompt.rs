//! Choosing the input port: command line, config, or asking the user.

use std::io::{self, BufRead, Write};

use crate::catalog::{find_port, MidiHost, PortDescriptor};
use crate::session::Session;

pub fn print_ports<W: Write>(ports: &[PortDescriptor], out: &mut W) -> io::Result<()> {
    writeln!(out, "Available MIDI input ports:")?;
    for port in ports {
        writeln!(out, "  {}", port)?;
    }
    Ok(())
}

/// Where the port choice came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    CommandLine,
    Preferred,
    OnlyPort,
    Prompt,
}

/// Select a port on `session`, in order of precedence:
/// 1. `requested` index from the command line
/// 2. first port matching the `preferred` name
/// 3. the only port, if there is exactly one
/// 4. ask on `input` until a valid index is given
///
/// Returns `None` if the input ends before a valid choice.
pub fn choose_port<H, R, W>(
    session: &mut Session<H>,
    requested: Option<usize>,
    preferred: Option<&str>,
    input: &mut R,
    out: &mut W,
) -> anyhow::Result<Option<(PortDescriptor, Choice)>>
where
    H: MidiHost,
    R: BufRead,
    W: Write,
{
    if let Some(index) = requested {
        match session.select(index) {
            Ok(port) => return Ok(Some((port.clone(), Choice::CommandLine))),
            Err(e) if e.is_recoverable() => writeln!(out, "{}", e)?,
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(pattern) = preferred {
        match find_port(session.ports(), pattern).map(|p| p.index) {
            Some(index) => {
                let port = session.select(index)?.clone();
                return Ok(Some((port, Choice::Preferred)));
            }
            None => log::info!("Preferred port '{}' not found", pattern),
        }
    }

    if session.ports().len() == 1 {
        let port = session.select(0)?.clone();
        return Ok(Some((port, Choice::OnlyPort)));
    }

    print_ports(session.ports(), out)?;
    Ok(prompt_for_port(session, input, out)?.map(|port| (port, Choice::Prompt)))
}

/// Ask for a port index until the session accepts one.
pub fn prompt_for_port<H, R, W>(
    session: &mut Session<H>,
    input: &mut R,
    out: &mut W,
) -> anyhow::Result<Option<PortDescriptor>>
where
    H: MidiHost,
    R: BufRead,
    W: Write,
{
    loop {
        write!(out, "\nSelect MIDI input port number: ")?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let answer = line.trim();
        let index = match answer.parse::<usize>() {
            Ok(index) => index,
            Err(_) => {
                writeln!(out, "'{}' is not a port number", answer)?;
                continue;
            }
        };

        match session.select(index) {
            Ok(port) => return Ok(Some(port.clone())),
            Err(e) if e.is_recoverable() => writeln!(out, "{}", e)?,
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::testing::FakeHost;
    use std::io::Cursor;

    fn session(names: &[&str]) -> Session<FakeHost> {
        let mut session = Session::new(FakeHost::with_ports(names));
        session.refresh_ports().unwrap();
        session
    }

    fn choose(
        session: &mut Session<FakeHost>,
        requested: Option<usize>,
        preferred: Option<&str>,
        typed: &str,
    ) -> (Option<(PortDescriptor, Choice)>, String) {
        let mut input = Cursor::new(typed.as_bytes().to_vec());
        let mut out = Vec::new();
        let choice = choose_port(session, requested, preferred, &mut input, &mut out).unwrap();
        (choice, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_prompt_reprompts_on_bad_input() {
        let mut session = session(&["Keys", "Pads", "Drums"]);
        let (choice, out) = choose(&mut session, None, None, "abc\n9\n2\n");

        let (port, how) = choice.unwrap();
        assert_eq!(port.name, "Drums");
        assert_eq!(how, Choice::Prompt);
        assert!(out.contains("  1: Pads"));
        assert!(out.contains("'abc' is not a port number"));
        assert!(out.contains("no input port at index 9 (3 available)"));
        assert_eq!(session.state(), SessionState::PortSelected);
    }

    #[test]
    fn test_prompt_end_of_input() {
        let mut session = session(&["Keys", "Pads"]);
        let (choice, _) = choose(&mut session, None, None, "7\n");
        assert!(choice.is_none());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_single_port_is_chosen_automatically() {
        let mut session = session(&["Keys"]);
        let (choice, out) = choose(&mut session, None, None, "");
        assert_eq!(choice.map(|(p, how)| (p.index, how)), Some((0, Choice::OnlyPort)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_preferred_port_by_name() {
        let mut session = session(&["Midi Through", "IAC Driver Bus 1"]);
        let (choice, _) = choose(&mut session, None, Some("iac"), "");
        assert_eq!(choice.map(|(p, how)| (p.index, how)), Some((1, Choice::Preferred)));
    }

    #[test]
    fn test_command_line_index_wins() {
        let mut session = session(&["Midi Through", "IAC Driver Bus 1"]);
        let (choice, _) = choose(&mut session, Some(0), Some("iac"), "");
        assert_eq!(choice.map(|(p, how)| (p.index, how)), Some((0, Choice::CommandLine)));
    }

    #[test]
    fn test_bad_command_line_index_falls_back_to_prompt() {
        let mut session = session(&["Keys", "Pads"]);
        let (choice, out) = choose(&mut session, Some(5), None, "1\n");
        assert_eq!(choice.map(|(p, how)| (p.index, how)), Some((1, Choice::Prompt)));
        assert!(out.starts_with("no input port at index 5 (2 available)"));
    }
}

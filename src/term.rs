//! Terminal transport: raw byte reads with timeouts, plus a scripted
//! in-memory double for tests
//!
//! Signal-driven conditions (resize, suspend/resume, interrupt) surface as
//! explicit `TtyEvent::Interrupted` values from the read call instead of
//! being handled out of band.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

/// State change that interrupted a blocking read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    Suspend,
    Resume,
    Resize,
    Interrupt,
}

/// One observation from the input side of the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtyEvent {
    Byte(u8),
    /// The requested timeout expired with nothing read
    Timedout,
    Interrupted(StateChange),
}

/// Raw terminal the line editor reads from and draws to
pub trait RawTty {
    /// Block for the next byte, up to `timeout` when given
    fn read_byte(&mut self, timeout: Option<Duration>) -> io::Result<TtyEvent>;
    fn writer(&mut self) -> &mut dyn Write;
    fn width(&self) -> u16;
}

/// Source of terminal capability byte strings for `:name` binding tokens
pub trait Capabilities {
    fn resolve(&self, name: &str) -> Option<Vec<u8>>;
}

/// Capability source that knows nothing; every `:name` token stays defunct
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCapabilities;

impl Capabilities for NoCapabilities {
    fn resolve(&self, _name: &str) -> Option<Vec<u8>> {
        None
    }
}

/// Fixed capability table, used where a terminfo lookup is unavailable
#[derive(Debug, Default)]
pub struct StaticCapabilities {
    entries: Vec<(String, Vec<u8>)>,
}

impl StaticCapabilities {
    pub fn with(entries: &[(&str, &[u8])]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(n, b)| (n.to_string(), b.to_vec()))
                .collect(),
        }
    }
}

impl Capabilities for StaticCapabilities {
    fn resolve(&self, name: &str) -> Option<Vec<u8>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b.clone())
    }
}

static RESIZED: AtomicBool = AtomicBool::new(false);
static RESUMED: AtomicBool = AtomicBool::new(false);

/// Note a SIGWINCH; picked up by the next read
pub fn note_resize() {
    RESIZED.store(true, Ordering::SeqCst);
}

/// Note a SIGCONT; picked up by the next read
pub fn note_resume() {
    RESUMED.store(true, Ordering::SeqCst);
}

fn pending_state_change() -> Option<StateChange> {
    if RESUMED.swap(false, Ordering::SeqCst) {
        Some(StateChange::Resume)
    } else if RESIZED.swap(false, Ordering::SeqCst) {
        Some(StateChange::Resize)
    } else {
        None
    }
}

/// The real controlling terminal on stdin/stdout
pub struct PosixTty {
    stdin: io::Stdin,
    stdout: io::Stdout,
    width: u16,
}

impl PosixTty {
    pub fn new() -> io::Result<Self> {
        let width = crossterm::terminal::size().map(|(w, _)| w).unwrap_or(80);
        Ok(Self {
            stdin: io::stdin(),
            stdout: io::stdout(),
            width,
        })
    }

    pub fn refresh_width(&mut self) {
        if let Ok((w, _)) = crossterm::terminal::size() {
            self.width = w;
        }
    }

    fn fd(&self) -> BorrowedFd<'_> {
        self.stdin.as_fd()
    }
}

impl RawTty for PosixTty {
    fn read_byte(&mut self, timeout: Option<Duration>) -> io::Result<TtyEvent> {
        if let Some(change) = pending_state_change() {
            if change == StateChange::Resize {
                self.refresh_width();
            }
            return Ok(TtyEvent::Interrupted(change));
        }
        let poll_timeout = match timeout {
            // Clamp to u16::MAX ms, about 65 seconds
            Some(t) => PollTimeout::from(t.as_millis().min(u16::MAX as u128) as u16),
            None => PollTimeout::NONE,
        };
        let mut fds = [PollFd::new(self.fd(), PollFlags::POLLIN)];
        match poll(&mut fds, poll_timeout) {
            Ok(0) => return Ok(TtyEvent::Timedout),
            Ok(_) => {}
            Err(nix::errno::Errno::EINTR) => {
                let change = pending_state_change().unwrap_or(StateChange::Interrupt);
                if change == StateChange::Resize {
                    self.refresh_width();
                }
                return Ok(TtyEvent::Interrupted(change));
            }
            Err(e) => return Err(io::Error::from(e)),
        }
        let mut buf = [0u8; 1];
        match self.stdin.read(&mut buf) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "terminal closed",
            )),
            Ok(_) => Ok(TtyEvent::Byte(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                Ok(TtyEvent::Interrupted(
                    pending_state_change().unwrap_or(StateChange::Interrupt),
                ))
            }
            Err(e) => Err(e),
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        &mut self.stdout
    }

    fn width(&self) -> u16 {
        self.width
    }
}

/// One step of a scripted input sequence
#[derive(Debug, Clone)]
pub enum ScriptItem {
    Bytes(Vec<u8>),
    /// A pause long enough to trip any requested timeout
    Gap,
    State(StateChange),
}

/// Deterministic in-memory terminal for driving `readline` in tests
#[derive(Debug, Default)]
pub struct ScriptedTty {
    script: VecDeque<ScriptItem>,
    pub output: Vec<u8>,
    width: u16,
}

impl ScriptedTty {
    pub fn new(width: u16) -> Self {
        Self {
            script: VecDeque::new(),
            output: Vec::new(),
            width,
        }
    }

    pub fn feed(mut self, item: ScriptItem) -> Self {
        self.script.push_back(item);
        self
    }

    pub fn feed_str(self, s: &str) -> Self {
        self.feed(ScriptItem::Bytes(s.as_bytes().to_vec()))
    }

    pub fn feed_gap(self) -> Self {
        self.feed(ScriptItem::Gap)
    }
}

impl RawTty for ScriptedTty {
    fn read_byte(&mut self, timeout: Option<Duration>) -> io::Result<TtyEvent> {
        loop {
            match self.script.front_mut() {
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "script exhausted",
                    ))
                }
                Some(ScriptItem::Bytes(bytes)) => {
                    if bytes.is_empty() {
                        self.script.pop_front();
                        continue;
                    }
                    let byte = bytes.remove(0);
                    return Ok(TtyEvent::Byte(byte));
                }
                Some(ScriptItem::Gap) => {
                    self.script.pop_front();
                    // A gap only matters while a timeout is armed
                    if timeout.is_some() {
                        return Ok(TtyEvent::Timedout);
                    }
                }
                Some(ScriptItem::State(change)) => {
                    let change = *change;
                    self.script.pop_front();
                    return Ok(TtyEvent::Interrupted(change));
                }
            }
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        &mut self.output
    }

    fn width(&self) -> u16 {
        self.width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_bytes_in_order() {
        let mut tty = ScriptedTty::new(80).feed_str("ab");
        assert_eq!(tty.read_byte(None).unwrap(), TtyEvent::Byte(b'a'));
        assert_eq!(tty.read_byte(None).unwrap(), TtyEvent::Byte(b'b'));
        assert!(tty.read_byte(None).is_err());
    }

    #[test]
    fn test_scripted_gap_times_out_only_when_armed() {
        let mut tty = ScriptedTty::new(80).feed_gap().feed_str("x");
        // No timeout requested: the gap is skipped over
        assert_eq!(tty.read_byte(None).unwrap(), TtyEvent::Byte(b'x'));

        let mut tty = ScriptedTty::new(80).feed_gap().feed_str("x");
        assert_eq!(
            tty.read_byte(Some(Duration::from_millis(200))).unwrap(),
            TtyEvent::Timedout
        );
        assert_eq!(tty.read_byte(None).unwrap(), TtyEvent::Byte(b'x'));
    }

    #[test]
    fn test_scripted_state_change() {
        let mut tty = ScriptedTty::new(80).feed(ScriptItem::State(StateChange::Resize));
        assert_eq!(
            tty.read_byte(None).unwrap(),
            TtyEvent::Interrupted(StateChange::Resize)
        );
    }

    #[test]
    fn test_static_capabilities() {
        let caps = StaticCapabilities::with(&[("kl", b"\x1b[D")]);
        assert_eq!(caps.resolve("kl"), Some(b"\x1b[D".to_vec()));
        assert_eq!(caps.resolve("kr"), None);
        assert_eq!(NoCapabilities.resolve("kl"), None);
    }
}

//! Scripted in-memory transport for tests and `--mock` demo mode.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::core::LinkTransport;

/// One scripted transport action, consumed in order.
#[derive(Debug)]
enum ScriptItem {
    /// Deliver a line (newline appended).
    Line(String),
    /// Fail the read with a hard I/O error.
    Fail(String),
    /// Block inside the read call, ignoring the poll contract. Used to
    /// exercise the shutdown-timeout path.
    Hang(Duration),
}

/// Builder for a sequence of transport actions.
#[derive(Debug, Default)]
pub struct MockScript {
    items: VecDeque<ScriptItem>,
}

impl MockScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.items.push_back(ScriptItem::Line(line.into()));
        self
    }

    pub fn fail(mut self, reason: impl Into<String>) -> Self {
        self.items.push_back(ScriptItem::Fail(reason.into()));
        self
    }

    pub fn hang(mut self, duration: Duration) -> Self {
        self.items.push_back(ScriptItem::Hang(duration));
        self
    }
}

/// Line generator used when the script runs dry (demo mode).
type Generator = Box<dyn FnMut() -> String + Send>;

/// In-memory [`LinkTransport`]: serves scripted lines, records writes.
pub struct MockTransport {
    script: VecDeque<ScriptItem>,
    pending: VecDeque<u8>,
    idle: Duration,
    generator: Option<(Duration, Generator)>,
    written: Arc<Mutex<Vec<String>>>,
}

impl MockTransport {
    pub fn new(script: MockScript) -> Self {
        Self {
            script: script.items,
            pending: VecDeque::new(),
            idle: Duration::from_millis(5),
            generator: None,
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Endless transport producing one generated line per interval after the
    /// (possibly empty) script is consumed.
    pub fn generator(interval: Duration, generator: impl FnMut() -> String + Send + 'static) -> Self {
        let mut transport = Self::new(MockScript::new());
        transport.generator = Some((interval, Box::new(generator)));
        transport
    }

    /// Shared log of every `write_all` payload, for asserting outbound
    /// commands.
    pub fn written(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.written)
    }

    fn serve(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.pending.len());
        for slot in buf.iter_mut().take(n) {
            // n is bounded by pending.len(), pop cannot fail
            *slot = self.pending.pop_front().unwrap_or_default();
        }
        n
    }
}

impl LinkTransport for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.pending.is_empty() {
            return Ok(self.serve(buf));
        }

        match self.script.pop_front() {
            Some(ScriptItem::Line(line)) => {
                self.pending.extend(line.into_bytes());
                self.pending.push_back(b'\n');
                Ok(self.serve(buf))
            }
            Some(ScriptItem::Fail(reason)) => Err(io::Error::new(io::ErrorKind::Other, reason)),
            Some(ScriptItem::Hang(duration)) => {
                thread::sleep(duration);
                Ok(0)
            }
            None => match &mut self.generator {
                Some((interval, generator)) => {
                    thread::sleep(*interval);
                    let line = generator();
                    self.pending.extend(line.into_bytes());
                    self.pending.push_back(b'\n');
                    Ok(self.serve(buf))
                }
                None => {
                    thread::sleep(self.idle);
                    Ok(0)
                }
            },
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        if let Ok(mut written) = self.written.lock() {
            written.push(String::from_utf8_lossy(buf).to_string());
        }
        Ok(())
    }
}

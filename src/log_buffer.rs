//! In-memory log capture for the `log` operation.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

/// Source of the text returned by the `log` operation.
pub trait LogProvider: Send + Sync {
    fn append_line(&self, line: &str);

    /// The retained log, one line per entry, oldest first.
    fn get_log(&self) -> String;
}

/// Bounded ring of log lines.
///
/// Cloning shares the buffer, so one clone can be handed to the tracing
/// subscriber while another serves the `log` operation.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl LogProvider for LogBuffer {
    fn append_line(&self, line: &str) {
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.to_string());
    }

    fn get_log(&self) -> String {
        let lines = self.lines.lock();
        let mut log = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in lines.iter() {
            log.push_str(line);
            log.push('\n');
        }
        log
    }
}

/// Writer handed out per tracing event. Buffers the formatted event and
/// appends its lines when dropped.
pub struct LogBufferWriter {
    buffer: LogBuffer,
    pending: Vec<u8>,
}

impl io::Write for LogBufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LogBufferWriter {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(&self.pending);
        for line in text.lines().filter(|line| !line.is_empty()) {
            self.buffer.append_line(line);
        }
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogBufferWriter {
            buffer: self.clone(),
            pending: Vec::new(),
        }
    }
}

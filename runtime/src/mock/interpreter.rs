//! Recording interpreter

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::warn;

use super::locked;
use crate::interp::{Interpreter, PersistedStore};
use crate::output::OutputWriter;

#[derive(Debug, Default)]
struct Record {
    chunks: Vec<Vec<u8>>,
    active: usize,
    max_active: usize,
    store: Option<PersistedStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    Silent,
    /// "ok <line>" for every carriage-return terminated line
    Echo,
    /// Persist each line at offset 0, answer "saved <len>"
    Save,
}

/// Interpreter that records every feed it receives.
///
/// Clones share the record, so a test can keep one clone while another
/// is shared with the ports.
#[derive(Debug, Clone)]
pub struct RecordingInterpreter {
    record: Arc<Mutex<Record>>,
    reply: Reply,
    feed_delay: Option<Duration>,
    line: Vec<u8>,
}

impl RecordingInterpreter {
    pub fn new() -> Self {
        Self {
            record: Arc::default(),
            reply: Reply::Silent,
            feed_delay: None,
            line: Vec::new(),
        }
    }

    pub fn echo_lines(mut self) -> Self {
        self.reply = Reply::Echo;
        self
    }

    pub fn save_on_enter(mut self) -> Self {
        self.reply = Reply::Save;
        self
    }

    /// Block the feeding thread for `delay` inside every feed
    pub fn with_feed_delay(mut self, delay: Duration) -> Self {
        self.feed_delay = Some(delay);
        self
    }

    /// Every feed in arrival order
    pub fn chunks(&self) -> Vec<Vec<u8>> {
        locked(&self.record).chunks.clone()
    }

    /// All fed bytes concatenated
    pub fn bytes(&self) -> Vec<u8> {
        locked(&self.record).chunks.concat()
    }

    /// Most feeds ever observed in progress at once
    pub fn max_concurrent_feeds(&self) -> usize {
        locked(&self.record).max_active
    }

    pub fn has_store(&self) -> bool {
        locked(&self.record).store.is_some()
    }

    fn end_of_line(&mut self, out: &mut OutputWriter) {
        let line = std::mem::take(&mut self.line);
        match self.reply {
            Reply::Silent => {}
            Reply::Echo => {
                let text = String::from_utf8_lossy(&line[..line.len() - 1]);
                out.printf(format_args!("ok {}\r\n", text));
            }
            Reply::Save => {
                let store = locked(&self.record).store.clone();
                let Some(store) = store else {
                    out.put_raw(b"no store\r\n");
                    return;
                };
                match store.save::<Vec<u8>, 16>(0, &line) {
                    Ok(_) => out.printf(format_args!("saved {}\r\n", line.len())),
                    Err(e) => {
                        warn!("save failed: {:?}", e);
                        out.put_raw(b"save failed\r\n");
                    }
                }
            }
        }
    }
}

impl Default for RecordingInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter for RecordingInterpreter {
    fn feed(&mut self, bytes: &[u8], out: &mut OutputWriter) {
        {
            let mut record = locked(&self.record);
            record.active += 1;
            record.max_active = record.max_active.max(record.active);
        }
        if let Some(delay) = self.feed_delay {
            std::thread::sleep(delay);
        }
        {
            let mut record = locked(&self.record);
            record.chunks.push(bytes.to_vec());
            record.active -= 1;
        }

        for &byte in bytes {
            self.line.push(byte);
            if byte == b'\r' {
                self.end_of_line(out);
            }
        }
    }

    fn register_persisted_store(&mut self, store: PersistedStore) {
        locked(&self.record).store = Some(store);
    }
}

//! Raw terminal input splitting.
//!
//! A single `read()` from a terminal can carry several keystrokes, half of an escape sequence,
//! or a whole bracketed paste. [`KeystrokeBuffer`] turns that byte stream into one chunk per
//! keystroke. Incomplete escape prefixes are held until the escape timeout elapses and are then
//! flushed verbatim, so bytes are never dropped or reordered.

use std::time::{Duration, Instant};

use unicode_segmentation::UnicodeSegmentation;

use crate::core::input::decode_input;

const ESC: char = '\x1b';
const BRACKETED_PASTE_START: &str = "\x1b[200~";
const BRACKETED_PASTE_END: &str = "\x1b[201~";

pub const DEFAULT_ESCAPE_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputChunk {
    /// One keystroke's raw sequence.
    Sequence(String),
    /// Bracketed paste contents, markers stripped.
    Paste(String),
}

#[derive(Debug)]
enum SequenceStatus {
    Complete,
    Incomplete,
    NotEscape,
}

#[derive(Debug)]
struct SequenceSplit {
    sequences: Vec<String>,
    remainder: String,
}

#[derive(Debug)]
pub struct KeystrokeBuffer {
    buffer: String,
    escape_timeout: Duration,
    paste_mode: bool,
    paste_buffer: String,
    flush_deadline: Option<Instant>,
}

impl Default for KeystrokeBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_ESCAPE_TIMEOUT)
    }
}

impl KeystrokeBuffer {
    pub fn new(escape_timeout: Duration) -> Self {
        Self {
            buffer: String::new(),
            escape_timeout,
            paste_mode: false,
            paste_buffer: String::new(),
            flush_deadline: None,
        }
    }

    pub fn escape_timeout(&self) -> Duration {
        self.escape_timeout
    }

    /// Appends a chunk read at `now` and returns every keystroke it completes.
    pub fn process(&mut self, data: &[u8], now: Instant) -> Vec<InputChunk> {
        self.flush_deadline = None;

        let text = decode_input(data);
        let chunks = self.process_str(&text);
        if !self.buffer.is_empty() {
            self.flush_deadline = Some(now + self.escape_timeout);
        }
        chunks
    }

    /// Emits a held escape prefix verbatim once its deadline has passed.
    pub fn flush_due(&mut self, now: Instant) -> Vec<InputChunk> {
        if self.buffer.is_empty() {
            self.flush_deadline = None;
            return Vec::new();
        }

        match self.flush_deadline {
            Some(deadline) if now >= deadline => self.flush(),
            _ => Vec::new(),
        }
    }

    /// When the held prefix will be flushed, if anything is held.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.flush_deadline
    }

    pub fn flush(&mut self) -> Vec<InputChunk> {
        self.flush_deadline = None;
        if self.buffer.is_empty() {
            return Vec::new();
        }
        vec![InputChunk::Sequence(std::mem::take(&mut self.buffer))]
    }

    pub fn clear(&mut self) {
        self.flush_deadline = None;
        self.buffer.clear();
        self.paste_mode = false;
        self.paste_buffer.clear();
    }

    pub fn pending(&self) -> &str {
        &self.buffer
    }

    pub fn in_paste(&self) -> bool {
        self.paste_mode
    }

    fn process_str(&mut self, data: &str) -> Vec<InputChunk> {
        let mut chunks = Vec::new();
        self.buffer.push_str(data);

        if !self.paste_mode {
            let Some(start_index) = self.buffer.find(BRACKETED_PASTE_START) else {
                let split = extract_complete_sequences(&self.buffer);
                self.buffer = split.remainder;
                chunks.extend(split.sequences.into_iter().map(InputChunk::Sequence));
                return chunks;
            };

            if start_index > 0 {
                let split = extract_complete_sequences(&self.buffer[..start_index]);
                chunks.extend(split.sequences.into_iter().map(InputChunk::Sequence));
                // An unterminated prefix right before the paste marker is flushed as-is.
                if !split.remainder.is_empty() {
                    chunks.push(InputChunk::Sequence(split.remainder));
                }
            }
            self.buffer = self.buffer[start_index + BRACKETED_PASTE_START.len()..].to_string();
            self.paste_mode = true;
        }

        self.paste_buffer.push_str(&self.buffer);
        self.buffer.clear();

        if let Some(end_index) = self.paste_buffer.find(BRACKETED_PASTE_END) {
            let pasted = self.paste_buffer[..end_index].to_string();
            let remaining = self.paste_buffer[end_index + BRACKETED_PASTE_END.len()..].to_string();

            self.paste_mode = false;
            self.paste_buffer.clear();
            chunks.push(InputChunk::Paste(pasted));

            if !remaining.is_empty() {
                chunks.extend(self.process_str(&remaining));
            }
        }

        chunks
    }
}

fn extract_complete_sequences(buffer: &str) -> SequenceSplit {
    let mut sequences = Vec::new();
    let mut pos = 0;

    while pos < buffer.len() {
        if buffer[pos..].starts_with(ESC) {
            let mut seq_end = pos + 1;
            let mut completed = false;

            while seq_end <= buffer.len() {
                if !buffer.is_char_boundary(seq_end) {
                    seq_end += 1;
                    continue;
                }
                let candidate = &buffer[pos..seq_end];
                match is_complete_sequence(candidate) {
                    SequenceStatus::Complete | SequenceStatus::NotEscape => {
                        sequences.push(candidate.to_string());
                        pos = seq_end;
                        completed = true;
                        break;
                    }
                    SequenceStatus::Incomplete => seq_end += 1,
                }
            }

            if !completed {
                return SequenceSplit {
                    sequences,
                    remainder: buffer[pos..].to_string(),
                };
            }
        } else {
            let run_end = buffer[pos..]
                .find(ESC)
                .map_or(buffer.len(), |offset| pos + offset);
            for grapheme in buffer[pos..run_end].graphemes(true) {
                // "\r\n" is one grapheme but two keystrokes.
                if grapheme.chars().count() > 1 && grapheme.starts_with(char::is_control) {
                    sequences.extend(grapheme.chars().map(String::from));
                } else {
                    sequences.push(grapheme.to_string());
                }
            }
            pos = run_end;
        }
    }

    SequenceSplit {
        sequences,
        remainder: String::new(),
    }
}

fn is_complete_sequence(data: &str) -> SequenceStatus {
    let Some(after) = data.strip_prefix(ESC) else {
        return SequenceStatus::NotEscape;
    };
    if after.is_empty() {
        return SequenceStatus::Incomplete;
    }

    if let Some(payload) = after.strip_prefix('[') {
        if payload.starts_with('M') {
            // X10 mouse: ESC [ M b x y
            return if payload.chars().count() >= 4 {
                SequenceStatus::Complete
            } else {
                SequenceStatus::Incomplete
            };
        }
        return is_complete_csi_payload(payload);
    }

    if after.starts_with(']') {
        return if data.ends_with("\x1b\\") || data.ends_with('\x07') {
            SequenceStatus::Complete
        } else {
            SequenceStatus::Incomplete
        };
    }

    if after.starts_with('P') || after.starts_with('_') {
        return if after.len() > 1 && data.ends_with("\x1b\\") {
            SequenceStatus::Complete
        } else {
            SequenceStatus::Incomplete
        };
    }

    if after.starts_with('O') {
        return if after.len() >= 2 {
            SequenceStatus::Complete
        } else {
            SequenceStatus::Incomplete
        };
    }

    SequenceStatus::Complete
}

fn is_complete_csi_payload(payload: &str) -> SequenceStatus {
    let Some(last_byte) = payload.as_bytes().last().copied() else {
        return SequenceStatus::Incomplete;
    };

    // "ESC [ [ A" is the linux console's F1.
    if payload == "[" {
        return SequenceStatus::Incomplete;
    }
    if payload.starts_with('[') && payload.len() == 2 {
        return SequenceStatus::Complete;
    }

    if !(0x40..=0x7e).contains(&last_byte) && last_byte != b'$' {
        return SequenceStatus::Incomplete;
    }

    if let Some(inner) = payload.strip_prefix('<') {
        // SGR mouse: ESC [ < b ; x ; y (M|m)
        if matches!(last_byte, b'M' | b'm') {
            let parts: Vec<&str> = inner[..inner.len() - 1].split(';').collect();
            if parts.len() == 3
                && parts
                    .iter()
                    .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
            {
                return SequenceStatus::Complete;
            }
        }
        return SequenceStatus::Incomplete;
    }

    SequenceStatus::Complete
}

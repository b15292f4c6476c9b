//! Append-only capture of one process output stream
//!
//! Keeps the full transcript for a session plus the most recent chunk so the
//! input-wait heuristics can inspect the tail as bytes arrive. Transcripts
//! are never truncated or rewritten for the life of the session.

/// Growing transcript of one stream (stdout or stderr)
#[derive(Debug, Default)]
pub struct Transcript {
    text: String,
    last_chunk: String,
    /// Bytes held back until the rest of a split UTF-8 sequence arrives
    carry: Vec<u8>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the stream, decoding lossily but holding back an
    /// incomplete trailing multi-byte sequence for the next chunk. Returns
    /// the decoded text that was appended.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> &str {
        let mut data = std::mem::take(&mut self.carry);
        data.extend_from_slice(bytes);

        let hold = incomplete_suffix_len(&data);
        let ready = data.len() - hold;
        self.carry = data.split_off(ready);

        let chunk = String::from_utf8_lossy(&data).into_owned();
        self.text.push_str(&chunk);
        self.last_chunk = chunk;
        &self.last_chunk
    }

    /// Flush any held-back bytes at end of stream; they can no longer be
    /// completed by a later chunk.
    pub fn finish(&mut self) {
        if !self.carry.is_empty() {
            let rest = String::from_utf8_lossy(&self.carry).into_owned();
            self.text.push_str(&rest);
            self.last_chunk = rest;
            self.carry.clear();
        }
    }

    /// Full transcript so far
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Most recently appended chunk
    pub fn last_chunk(&self) -> &str {
        &self.last_chunk
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Length of a trailing byte run that could still become a complete UTF-8
/// sequence. At most three bytes are ever held back.
fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(4) {
        let b = bytes[len - back];
        if b < 0x80 {
            return 0;
        }
        if b >= 0xC0 {
            return if utf8_sequence_len(b) > back { back } else { 0 };
        }
    }
    0
}

/// Expected sequence length for a UTF-8 leading byte
fn utf8_sequence_len(lead: u8) -> usize {
    if lead >= 0xF0 {
        4
    } else if lead >= 0xE0 {
        3
    } else {
        2
    }
}

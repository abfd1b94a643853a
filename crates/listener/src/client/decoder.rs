//! Incremental decoder for `text/event-stream` bodies.
//!
//! Bytes arrive in arbitrary chunks. Lines end with `\n` or `\r\n`; a blank
//! line closes a frame. Only `data` fields are kept, multiple `data` lines
//! in one frame are joined with `\n`, comments and other fields are skipped.
//!
//! A line longer than [`MAX_LINE_BYTES`] is dropped together with the frame
//! it belongs to, so a misbehaving server cannot grow the buffer forever.

/// Longest line the decoder will hold while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
    /// Set while skipping the rest of an oversized line.
    discarding: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the payloads of the frames it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if line.len() > MAX_LINE_BYTES {
                tracing::warn!(len = line.len(), "dropping oversized event stream line");
                self.data.clear();
                continue;
            }

            match String::from_utf8(line) {
                Ok(line) => {
                    if let Some(frame) = self.line(&line) {
                        frames.push(frame);
                    }
                }
                Err(_) => tracing::warn!("skipping non UTF-8 line in event stream"),
            }
        }

        if self.buffer.len() > MAX_LINE_BYTES {
            tracing::warn!(
                len = self.buffer.len(),
                "event stream line exceeds {MAX_LINE_BYTES} bytes, discarding it"
            );
            self.buffer = Vec::new();
            self.data.clear();
            self.discarding = true;
        }
        frames
    }

    fn line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            let frame = self.data.join("\n");
            self.data.clear();
            return Some(frame);
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }
}

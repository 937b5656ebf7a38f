//! SSE Framing
//!
//! Incremental line splitting and frame assembly. Bytes may arrive split at
//! any position; nothing here assumes a read boundary lines up with a line or
//! frame boundary.
//!
//! ```text
//! event: <type>\n
//! data: <json>\n        (repeatable, joined with \n)
//! id: <opaque>\n
//! \n                    (terminates the frame)
//! : <comment>\n         (keep-alive, no frame)
//! ```

use std::fmt::Write as _;

// =============================================================================
// Line Buffer
// =============================================================================

/// Accumulates bytes and yields complete lines.
///
/// Lines are returned with their `\n` terminator so a caller can forward them
/// unchanged. Anything after the last `\n` stays buffered.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Append a chunk and drain every complete line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset + 1;
            lines.push(self.pending[start..end].to_vec());
            start = end;
        }
        self.pending.drain(..start);
        lines
    }

    /// Whether a partial line is buffered.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Discard any partial line.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Strip the trailing `\n` and an optional `\r` before it.
#[must_use]
pub fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

// =============================================================================
// Frames
// =============================================================================

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    /// Value of the `event:` field.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    /// Value of the `id:` field.
    pub id: Option<String>,
}

impl Frame {
    /// Frame with the given type and data.
    #[must_use]
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
            id: None,
        }
    }

    /// Attach an id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Wire text in `event`, `data`, `id` order followed by a blank line.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + 32);
        if let Some(event) = &self.event {
            let _ = writeln!(out, "event: {event}");
        }
        for line in self.data.split('\n') {
            let _ = writeln!(out, "data: {line}");
        }
        if let Some(id) = &self.id {
            let _ = writeln!(out, "id: {id}");
        }
        out.push('\n');
        out
    }
}

/// Output of the frame decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame.
    Frame(Frame),
    /// A `:` comment line.
    Comment(String),
}

/// Incremental SSE frame decoder.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    lines: LineBuffer,
    event: Option<String>,
    data: Option<String>,
    id: Option<String>,
}

impl FrameDecoder {
    /// Fresh decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return everything it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Decoded> {
        let lines = self.lines.push(chunk);
        lines
            .iter()
            .filter_map(|line| self.process_line(trim_line_end(line)))
            .collect()
    }

    /// Whether a frame has started but not yet been terminated.
    #[must_use]
    pub const fn in_frame(&self) -> bool {
        self.event.is_some() || self.data.is_some() || self.id.is_some()
    }

    /// Drop partial state, e.g. before reading a new connection.
    pub fn reset(&mut self) {
        self.lines.clear();
        self.event = None;
        self.data = None;
        self.id = None;
    }

    fn process_line(&mut self, line: &[u8]) -> Option<Decoded> {
        let decoded = String::from_utf8_lossy(line);
        let line: &str = &decoded;

        if line.is_empty() {
            return self.dispatch();
        }

        if let Some(comment) = line.strip_prefix(':') {
            return Some(Decoded::Comment(strip_space(comment).to_string()));
        }

        let (field, value) = line
            .split_once(':')
            .map_or((line, ""), |(f, v)| (f, strip_space(v)));

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            "id" if !value.contains('\0') => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<Decoded> {
        if !self.in_frame() {
            return None;
        }
        Some(Decoded::Frame(Frame {
            event: self.event.take(),
            data: self.data.take().unwrap_or_default(),
            id: self.id.take(),
        }))
    }
}

fn strip_space(value: &str) -> &str {
    value.strip_prefix(' ').unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "event: point\ndata: {\"a\":1}\nid: 10-1\n\n";

    #[test]
    fn line_buffer_keeps_partial_tail() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"one\ntw");
        assert_eq!(lines, vec![b"one\n".to_vec()]);
        assert!(buf.has_partial());

        let lines = buf.push(b"o\n");
        assert_eq!(lines, vec![b"two\n".to_vec()]);
        assert!(!buf.has_partial());
    }

    #[test]
    fn trims_crlf() {
        assert_eq!(trim_line_end(b"data: x\r\n"), b"data: x");
        assert_eq!(trim_line_end(b"data: x"), b"data: x");
    }

    #[test]
    fn decodes_single_frame() {
        let mut decoder = FrameDecoder::new();
        let out = decoder.push(SAMPLE.as_bytes());
        assert_eq!(
            out,
            vec![Decoded::Frame(
                Frame::new("point", "{\"a\":1}").with_id("10-1")
            )]
        );
        assert!(!decoder.in_frame());
    }

    #[test]
    fn joins_multiple_data_lines() {
        let mut decoder = FrameDecoder::new();
        let out = decoder.push(b"event: x\ndata: a\ndata: b\n\n");
        assert_eq!(out, vec![Decoded::Frame(Frame::new("x", "a\nb"))]);
    }

    #[test]
    fn comments_are_reported_without_breaking_frames() {
        let mut decoder = FrameDecoder::new();
        let out = decoder.push(b": keep-alive\nevent: x\n: mid\ndata: 1\n\n");
        assert_eq!(
            out,
            vec![
                Decoded::Comment("keep-alive".into()),
                Decoded::Comment("mid".into()),
                Decoded::Frame(Frame::new("x", "1")),
            ]
        );
    }

    #[test]
    fn stray_blank_lines_dispatch_nothing() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"\n\n\r\n").is_empty());
    }

    #[test]
    fn only_one_leading_space_is_stripped() {
        let mut decoder = FrameDecoder::new();
        let out = decoder.push(b"data:  padded\ndata:tight\n\n");
        assert_eq!(
            out,
            vec![Decoded::Frame(Frame {
                event: None,
                data: " padded\ntight".into(),
                id: None,
            })]
        );
    }

    #[test]
    fn reset_discards_partial_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"event: point\ndata: {");
        assert!(decoder.in_frame());
        decoder.reset();
        assert!(!decoder.in_frame());
        assert!(decoder.push(b"\n").is_empty());
    }

    #[test]
    fn encode_then_decode_is_stable() {
        let frame = Frame::new("error", "{\"code\":\"x\"}");
        let mut decoder = FrameDecoder::new();
        assert_eq!(
            decoder.push(frame.encode().as_bytes()),
            vec![Decoded::Frame(frame)]
        );
    }

    #[test]
    fn split_at_every_boundary_matches_whole_read() {
        let whole = FrameDecoder::new().push(SAMPLE.as_bytes());
        for split in 0..=SAMPLE.len() {
            let (a, b) = SAMPLE.as_bytes().split_at(split);
            let mut decoder = FrameDecoder::new();
            let mut out = decoder.push(a);
            out.extend(decoder.push(b));
            assert_eq!(out, whole, "split at byte {split}");
        }
    }
}

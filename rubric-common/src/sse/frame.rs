//! Incremental decoder for `text/event-stream` bodies
//!
//! Network chunks do not line up with SSE frames: a frame may arrive split
//! across chunks (even mid UTF-8 sequence) and one chunk may carry several
//! frames. The decoder buffers raw bytes and only decodes complete frames.

/// Accumulates bytes and yields the `data` payload of every complete frame
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    buffer: Vec<u8>,
}

impl SseFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning payloads of frames completed by it
    ///
    /// Multi-line `data:` fields are joined with `\n`. Comment lines
    /// (heartbeats) and `event:`/`id:`/`retry:` fields are ignored, as are
    /// frames without data.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut payloads = Vec::new();
        while let Some(end) = find_frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(payload) = parse_frame(&frame[..end]) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Bytes held for an incomplete frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_frame(frame: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(frame);
    let data: Vec<&str> = text
        .lines()
        .filter(|line| !line.starts_with(':'))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();

    if data.is_empty() {
        None
    } else {
        Some(data.join("\n"))
    }
}

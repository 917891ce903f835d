mod decoder;
mod frame;

pub use decoder::Utf8Decoder;
pub use frame::{extract_deltas, DONE_SENTINEL};

/// Frames are separated by a blank line: two consecutive line breaks.
const FRAME_SEPARATOR: &str = "\n\n";

/// Reassembles streamed event frames into per-frame text deltas.
///
/// Reads from the transport carry no alignment guarantee: a single chunk may
/// hold zero, one, or many complete frames plus an incomplete tail. The tail
/// is buffered and prefixed onto the next chunk before re-splitting, and the
/// byte-to-text step carries split codepoints the same way, so the assembled
/// output is invariant under chunk boundaries.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    decoder: Utf8Decoder,
    pending: String,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk; returns the delta of every frame completed by it,
    /// in arrival order. Frames that extracted no text are omitted.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.push_str(&self.decoder.feed(chunk));

        let mut deltas = Vec::new();
        while let Some(pos) = self.pending.find(FRAME_SEPARATOR) {
            let rest = self.pending.split_off(pos + FRAME_SEPARATOR.len());
            let frame = std::mem::replace(&mut self.pending, rest);
            let delta = extract_deltas(frame.trim_end_matches(FRAME_SEPARATOR));
            if !delta.is_empty() {
                deltas.push(delta);
            }
        }
        deltas
    }

    /// End of stream: run the buffered partial frame through the same
    /// extraction rule once.
    pub fn finish(mut self) -> Option<String> {
        self.pending.push_str(&self.decoder.finish());
        if self.pending.trim().is_empty() {
            return None;
        }
        let delta = extract_deltas(&self.pending);
        if delta.is_empty() {
            None
        } else {
            Some(delta)
        }
    }
}

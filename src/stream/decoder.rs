/// Incremental UTF-8 decoder.
///
/// Network chunks can split a multi-byte character across read boundaries, so
/// each `feed` decodes as far as it can and carries the incomplete trailing
/// sequence over to the next call. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(chunk);

        let mut out = String::new();
        let mut rest: &[u8] = &buf;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    // Safe split: `valid` bytes were just checked.
                    out.push_str(std::str::from_utf8(&rest[..valid]).unwrap_or(""));
                    rest = &rest[valid..];
                    match err.error_len() {
                        Some(bad) => {
                            out.push('\u{FFFD}');
                            rest = &rest[bad..];
                        }
                        // Incomplete sequence at the end of the chunk: hold it
                        // back for the next feed.
                        None => break,
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// Flush whatever is still buffered, replacing an unfinished sequence.
    pub fn finish(&mut self) -> String {
        let tail = std::mem::take(&mut self.pending);
        if tail.is_empty() {
            String::new()
        } else {
            String::from_utf8_lossy(&tail).into_owned()
        }
    }
}

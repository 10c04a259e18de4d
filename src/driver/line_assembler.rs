//! Incremental line splitting for a child's output pipes.
//!
//! Progress lines end with `\r` instead of `\n`, so both count as terminators.

/// Append `chunk` to `buffer` and cut out every complete line.
///
/// Returns the unterminated remainder and the complete, non-empty lines in
/// order. Splitting happens on bytes, so a multi-byte character broken across
/// two chunks is decoded only once it is whole.
pub fn assemble(mut buffer: Vec<u8>, chunk: &[u8]) -> (Vec<u8>, Vec<String>) {
    buffer.extend_from_slice(chunk);

    let mut lines = Vec::new();
    let mut start = 0;
    for (index, byte) in buffer.iter().enumerate() {
        if *byte == b'\r' || *byte == b'\n' {
            if index > start {
                lines.push(String::from_utf8_lossy(&buffer[start..index]).into_owned());
            }
            start = index + 1;
        }
    }

    let remainder = buffer.split_off(start);
    (remainder, lines)
}

/// Stateful wrapper around [`assemble`] for one stream
#[derive(Debug, Default)]
pub struct LineAssembler {
    buffer: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, get back the lines it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let (remainder, lines) = assemble(std::mem::take(&mut self.buffer), chunk);
        self.buffer = remainder;
        lines
    }

    /// Flush the unterminated tail once the stream has ended
    pub fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.buffer);
        if tail.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&tail).into_owned())
        }
    }
}

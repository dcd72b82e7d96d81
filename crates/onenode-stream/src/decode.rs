//! Incremental line decoding of streamed bodies.
//!
//! Bytes are decoded as UTF-8 with carry-over: an incomplete multi-byte
//! sequence at the end of a chunk waits for the next chunk, and malformed
//! sequences become U+FFFD. Decoded text is appended to the unterminated
//! remainder of the previous chunk before splitting, so a line cut by a
//! chunk boundary is delivered once, reassembled.

use std::char::REPLACEMENT_CHARACTER;

use tracing::{debug, warn};

use crate::body::ResponseBody;
use crate::StreamError;

/// Drive `body` to exhaustion, calling `on_line` for each non-blank line.
///
/// Lines are split on `\n` with a trailing `\r` stripped. Whitespace-only
/// lines are skipped. A non-blank trailing fragment without a terminator is
/// delivered at the end of the stream.
///
/// The body reader is held for the duration of the call and released on
/// every exit path. A read error is returned after the reader is released;
/// lines decoded before the error have already been delivered.
pub async fn decode_lines<F>(body: &mut ResponseBody, mut on_line: F) -> Result<(), StreamError>
where
    F: FnMut(&str),
{
    let mut reader = body.reader();
    let mut decoder = LineDecoder::new();

    loop {
        match reader.read().await {
            Ok(Some(chunk)) => decoder.push(&chunk, &mut on_line),
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "stream read failed");
                return Err(e);
            }
        }
    }

    decoder.finish(&mut on_line);
    debug!("stream decoded to exhaustion");
    Ok(())
}

/// Decoder state for one stream: undecoded bytes and unterminated text.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
    remainder: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and deliver every line it completes.
    pub fn push<F>(&mut self, chunk: &[u8], mut on_line: F)
    where
        F: FnMut(&str),
    {
        self.pending.extend_from_slice(chunk);
        self.decode_pending(false);
        self.drain_lines(&mut on_line);
    }

    /// Flush at end of stream, delivering any trailing fragment.
    pub fn finish<F>(mut self, mut on_line: F)
    where
        F: FnMut(&str),
    {
        self.decode_pending(true);
        self.drain_lines(&mut on_line);
        emit(&self.remainder, &mut on_line);
    }

    /// Text received after the last line terminator.
    pub fn remainder(&self) -> &str {
        &self.remainder
    }

    fn decode_pending(&mut self, flush: bool) {
        let mut consumed = 0;
        loop {
            let input = &self.pending[consumed..];
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.remainder.push_str(text);
                    consumed = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // Borrowed without copying: the prefix is known valid.
                    self.remainder
                        .push_str(&String::from_utf8_lossy(&input[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            self.remainder.push(REPLACEMENT_CHARACTER);
                            consumed += valid + bad;
                        }
                        None if flush => {
                            self.remainder.push(REPLACEMENT_CHARACTER);
                            consumed = self.pending.len();
                            break;
                        }
                        None => {
                            consumed += valid;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..consumed);
    }

    fn drain_lines<F>(&mut self, on_line: &mut F)
    where
        F: FnMut(&str),
    {
        let Some(last) = self.remainder.rfind('\n') else {
            return;
        };
        let rest = self.remainder.split_off(last + 1);
        let complete = std::mem::replace(&mut self.remainder, rest);
        for line in complete.split('\n') {
            emit(line, on_line);
        }
    }
}

fn emit<F>(line: &str, on_line: &mut F)
where
    F: FnMut(&str),
{
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return;
    }
    on_line(line);
}

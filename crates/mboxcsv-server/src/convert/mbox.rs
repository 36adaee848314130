//! Sequential MBOX archive reader
//!
//! An mbox file is a concatenation of raw RFC 5322 messages, each introduced
//! by a separator line beginning with `From ` (the envelope line). The reader
//! yields one raw message at a time without ever holding more than a single
//! message in memory. Separator lines are consumed, not included in the
//! yielded bytes; `>From ` quoting inside bodies is passed through untouched.
//!
//! Content appearing before the first separator line is yielded as a message
//! of its own rather than rejected, so slightly malformed archives still
//! convert.

use std::io::{self, BufRead};

const SEPARATOR: &[u8] = b"From ";

/// Streaming iterator over the raw messages of an mbox archive
pub struct MboxReader<R: BufRead> {
    reader: R,
    /// Set once the first separator line has been consumed
    started: bool,
    done: bool,
}

impl<R: BufRead> MboxReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            started: false,
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for MboxReader<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut message: Vec<u8> = Vec::new();
        // Inside a message if a separator was consumed on a prior call
        let mut in_message = self.started;
        let mut line: Vec<u8> = Vec::new();

        loop {
            line.clear();
            let n = match self.reader.read_until(b'\n', &mut line) {
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                },
            };

            if n == 0 {
                self.done = true;
                if in_message || !message.is_empty() {
                    return Some(Ok(message));
                }
                return None;
            }

            if line.starts_with(SEPARATOR) {
                if in_message || !message.is_empty() {
                    // Separator of the next message; it stays consumed
                    self.started = true;
                    return Some(Ok(message));
                }
                // First separator in the archive
                self.started = true;
                in_message = true;
                continue;
            }

            message.extend_from_slice(&line);
        }
    }
}

/// Count the messages in an archive with a plain line scan
///
/// Matches [`MboxReader`] semantics, including the leniency for content
/// before the first separator line.
pub fn count_messages<R: BufRead>(mut reader: R) -> io::Result<u64> {
    let mut count: u64 = 0;
    let mut leading_content = false;
    let mut line: Vec<u8> = Vec::new();

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }
        if line.starts_with(SEPARATOR) {
            count += 1;
        } else if count == 0 {
            leading_content = true;
        }
    }

    if leading_content {
        count += 1;
    }

    Ok(count)
}

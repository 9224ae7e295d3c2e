// Copyright 2025 the arbor-collect authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Marker-framed command execution over a single persistent remote shell.
//!
//! The remote side is an unstructured byte stream: there is no channel
//! close or exit-status message per command. Instead each command is sent
//! with a trailing `echo <marker> $?` and the reader scans the stream for
//! the marker to find the command boundary and exit code. The marker
//! carries a per-shell random nonce and a per-command sequence number so
//! output that merely prints a stale or foreign marker cannot terminate
//! the wrong command.

use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::quote::shell_quote;
use crate::session::ExecError;
use crate::ssh::Client;

const MARKER_PREFIX: &str = "__ARBOR_END__";
const NONCE_LEN: usize = 12;
const NONCE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Accumulated output beyond this many bytes (minus a retained tail) is
/// flushed to the result buffer between reads, keeping the search window
/// small on chatty commands.
const FLUSH_THRESHOLD: usize = 8192;

/// Bytes kept beyond the marker length when flushing, so a marker split
/// across two reads is still found.
const TAIL_SLACK: usize = 16;

/// A shared handle to one remote shell. Commands are serialized through an
/// internal mutex; concurrent callers queue rather than interleave bytes.
pub struct PersistentShell {
    inner: Mutex<ShellStream>,
}

struct ShellStream {
    reader: BufReader<Box<dyn AsyncRead + Send + Unpin>>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    nonce: String,
    seq: u64,
}

impl PersistentShell {
    /// Starts a remote shell on `client` and wraps it.
    pub async fn open(client: &Client) -> Result<Self, crate::ssh::Error> {
        let stream = client.open_shell_channel().await?;
        let (reader, writer) = tokio::io::split(stream);
        Ok(Self::from_stream(Box::new(reader), Box::new(writer)))
    }

    /// Wraps an arbitrary byte stream that behaves like a shell. Lets tests
    /// drive the framing logic without a live SSH connection.
    pub fn from_stream(
        reader: Box<dyn AsyncRead + Send + Unpin>,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
    ) -> Self {
        Self {
            inner: Mutex::new(ShellStream {
                reader: BufReader::new(reader),
                writer,
                nonce: make_nonce(),
                seq: 0,
            }),
        }
    }

    /// Runs one command line and returns its combined output and exit
    /// code. The command's own output never includes the marker line.
    pub async fn run_one(&self, line: &str) -> Result<(Vec<u8>, i32), ExecError> {
        let mut shell = self.inner.lock().await;
        shell.seq += 1;
        let marker = format!("{MARKER_PREFIX}{}__{}__", shell.nonce, shell.seq);
        let wire = format!("{line}; echo {} $?\n", shell_quote(&marker));

        shell
            .writer
            .write_all(wire.as_bytes())
            .await
            .map_err(|_| ExecError::StreamClosed { output: Vec::new() })?;
        shell
            .writer
            .flush()
            .await
            .map_err(|_| ExecError::StreamClosed { output: Vec::new() })?;

        // The marker is always followed by a space and the exit code.
        let needle = format!("{marker} ");
        let keep = marker.len() + TAIL_SLACK;

        let mut output: Vec<u8> = Vec::new();
        let mut accum: Vec<u8> = Vec::new();
        loop {
            match shell.reader.read_until(b'\n', &mut accum).await {
                Ok(0) => {
                    output.extend_from_slice(&accum);
                    return Err(ExecError::StreamClosed { output });
                }
                Ok(_) => {}
                Err(_) => {
                    output.extend_from_slice(&accum);
                    return Err(ExecError::StreamClosed { output });
                }
            }

            if let Some(pos) = find(&accum, needle.as_bytes()) {
                output.extend_from_slice(&accum[..pos]);
                let rest = &accum[pos + needle.len()..];
                let code = parse_exit_code(rest);
                return Ok((output, code));
            }

            // No marker yet; spill everything but a tail that could hold a
            // partially-received marker.
            if accum.len() > FLUSH_THRESHOLD {
                let cut = accum.len() - keep.min(accum.len());
                output.extend_from_slice(&accum[..cut]);
                accum.drain(..cut);
            }
        }
    }

    /// Asks the remote shell to exit and shuts the stream down. Errors are
    /// ignored; the connection is going away either way.
    ///
    /// Never waits on the shell mutex: after a timed-out command an
    /// abandoned worker may still hold it, parked on a read that only the
    /// transport teardown can unblock. In that case the polite exit is
    /// skipped and the caller's disconnect releases the worker.
    pub async fn close(&self) {
        let Ok(mut shell) = self.inner.try_lock() else {
            return;
        };
        let _ = shell.writer.write_all(b"exit\n").await;
        let _ = shell.writer.flush().await;
        let _ = shell.writer.shutdown().await;
    }
}

/// Parses the exit code that follows the marker, up to end of line. After
/// trimming the ends, only a plain decimal is accepted; any interior
/// non-digit (including whitespace or a bare `-`) maps to -1 so a mangled
/// echo is never mistaken for success.
fn parse_exit_code(rest: &[u8]) -> i32 {
    let line = match rest.iter().position(|&b| b == b'\n') {
        Some(i) => &rest[..i],
        None => rest,
    };
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() || !trimmed.iter().all(|b| b.is_ascii_digit()) {
        return -1;
    }
    match std::str::from_utf8(trimmed).ok().and_then(|s| s.parse::<i32>().ok()) {
        Some(code) => code,
        None => -1,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
}

fn make_nonce() -> String {
    let mut rng = rand::thread_rng();
    (0..NONCE_LEN)
        .map(|_| NONCE_ALPHABET[rng.gen_range(0..NONCE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_is_twelve_lowercase_alphanumerics() {
        let n = make_nonce();
        assert_eq!(n.len(), NONCE_LEN);
        assert!(n.bytes().all(|b| NONCE_ALPHABET.contains(&b)));
    }

    #[test]
    fn nonces_differ_between_shells() {
        assert_ne!(make_nonce(), make_nonce());
    }

    #[test]
    fn exit_code_parses_plain_decimals() {
        assert_eq!(parse_exit_code(b"0\n"), 0);
        assert_eq!(parse_exit_code(b"17\r\n"), 17);
        assert_eq!(parse_exit_code(b" 3 \n"), 3);
    }

    #[test]
    fn exit_code_never_defaults_to_success() {
        assert_eq!(parse_exit_code(b"\n"), -1);
        assert_eq!(parse_exit_code(b"-1\n"), -1);
        assert_eq!(parse_exit_code(b"x9\n"), -1);
        // interior whitespace must invalidate the parse, not concatenate
        assert_eq!(parse_exit_code(b"1 2\n"), -1);
        assert_eq!(parse_exit_code(b"4\t2\r\n"), -1);
        assert_eq!(parse_exit_code(b"99999999999999999999\n"), -1);
        assert_eq!(parse_exit_code(b""), -1);
    }

    #[test]
    fn find_locates_subslices() {
        assert_eq!(find(b"abcdef", b"cd"), Some(2));
        assert_eq!(find(b"abcdef", b"xy"), None);
        assert_eq!(find(b"ab", b"abc"), None);
    }
}

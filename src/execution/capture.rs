//! Bounded draining of the child's stdout/stderr pipes
//!
//! Pipes are drained on their own threads while the parent waits. A child
//! whose pipe buffer (~64KB on Linux) fills up blocks until it is read.

use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use log::warn;

use crate::errors::{Result, SandboxError};

/// Appended when a stream exceeded its byte budget
pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

enum Chunk {
    Data(Vec<u8>),
    Truncated,
    Failed(io::Error),
}

/// Receiving end of one pipe reader thread
pub struct StreamCollector {
    label: &'static str,
    rx: Receiver<Chunk>,
}

/// Spawn a reader thread that drains `stream`, forwarding at most `limit`
/// bytes as they arrive
pub fn spawn_collector<R>(stream: R, label: &'static str, limit: usize) -> Result<StreamCollector>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(format!("capture-{}", label))
        .spawn(move || {
            let outcome = read_bounded(stream, limit, |bytes| {
                let _ = tx.send(Chunk::Data(bytes.to_vec()));
            });
            let _ = match outcome {
                Ok(true) => tx.send(Chunk::Truncated),
                Ok(false) => Ok(()),
                Err(e) => tx.send(Chunk::Failed(e)),
            };
        })?;

    Ok(StreamCollector { label, rx })
}

impl StreamCollector {
    /// Gather what the reader forwarded, waiting up to `wait` for EOF.
    ///
    /// A pipe still held open after `wait` yields the output received so far.
    pub fn collect(self, wait: Duration) -> Result<String> {
        let end = Instant::now() + wait;
        let mut buf = Vec::new();
        let mut truncated = false;

        loop {
            let remaining = end.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(Chunk::Data(bytes)) => buf.extend_from_slice(&bytes),
                Ok(Chunk::Truncated) => truncated = true,
                Ok(Chunk::Failed(e)) => {
                    return Err(SandboxError::Capture(format!(
                        "reading {} failed: {}",
                        self.label, e
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "{} still open {}ms after exit, keeping {} bytes",
                        self.label,
                        wait.as_millis(),
                        buf.len()
                    );
                    break;
                }
            }
        }

        if truncated {
            buf.extend_from_slice(TRUNCATION_MARKER.as_bytes());
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Read `stream` to EOF, handing the first `limit` bytes to `sink`.
///
/// The rest is read and discarded so the writer never sees a broken pipe.
/// Returns whether anything was discarded.
pub fn read_bounded<R, F>(mut stream: R, limit: usize, mut sink: F) -> io::Result<bool>
where
    R: Read,
    F: FnMut(&[u8]),
{
    let mut chunk = [0u8; 8192];
    let mut kept = 0usize;
    let mut truncated = false;

    loop {
        let n = match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if truncated {
            continue;
        }

        let take = n.min(limit.saturating_sub(kept));
        if take > 0 {
            sink(&chunk[..take]);
            kept += take;
        }
        if take < n {
            truncated = true;
        }
    }

    Ok(truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::mpsc::Sender;

    fn read_all(input: Vec<u8>, limit: usize) -> (Vec<u8>, bool) {
        let mut out = Vec::new();
        let truncated =
            read_bounded(Cursor::new(input), limit, |b| out.extend_from_slice(b)).unwrap();
        (out, truncated)
    }

    /// Yields one chunk, then blocks like a pipe whose writer is still alive
    struct HeldOpenReader {
        first: Option<Vec<u8>>,
        gate: Receiver<()>,
    }

    impl HeldOpenReader {
        fn new(first: &[u8]) -> (Self, Sender<()>) {
            let (tx, rx) = mpsc::channel();
            let reader = Self {
                first: Some(first.to_vec()),
                gate: rx,
            };
            (reader, tx)
        }
    }

    impl Read for HeldOpenReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if let Some(first) = self.first.take() {
                buf[..first.len()].copy_from_slice(&first);
                return Ok(first.len());
            }
            let _ = self.gate.recv();
            Ok(0)
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("boom"))
        }
    }

    #[test]
    fn read_bounded_keeps_small_output() {
        let (out, truncated) = read_all(b"hello\n".to_vec(), 1024);
        assert_eq!(out, b"hello\n");
        assert!(!truncated);
    }

    #[test]
    fn read_bounded_exact_limit_is_not_truncated() {
        let (out, truncated) = read_all(vec![b'a'; 16], 16);
        assert_eq!(out.len(), 16);
        assert!(!truncated);
    }

    #[test]
    fn read_bounded_truncates_and_drains() {
        let (out, truncated) = read_all(vec![b'x'; 100_000], 10);
        assert_eq!(out, b"xxxxxxxxxx");
        assert!(truncated);
    }

    #[test]
    fn collector_appends_marker_when_truncated() {
        let collector = spawn_collector(Cursor::new(vec![b'x'; 100_000]), "stdout", 10).unwrap();
        let text = collector.collect(Duration::from_secs(5)).unwrap();
        assert_eq!(text, format!("xxxxxxxxxx{}", TRUNCATION_MARKER));
    }

    #[test]
    fn collector_keeps_partial_output_when_pipe_stays_open() {
        let (reader, gate) = HeldOpenReader::new(b"before exit\n");
        let collector = spawn_collector(reader, "stdout", 1024).unwrap();

        let start = Instant::now();
        let text = collector.collect(Duration::from_millis(200)).unwrap();

        assert_eq!(text, "before exit\n");
        assert!(start.elapsed() < Duration::from_secs(2));
        drop(gate);
    }

    #[test]
    fn collector_returns_text() {
        let collector = spawn_collector(Cursor::new(b"abc".to_vec()), "stdout", 1024).unwrap();
        assert_eq!(collector.collect(Duration::from_secs(5)).unwrap(), "abc");
    }

    #[test]
    fn collector_surfaces_read_errors() {
        let collector = spawn_collector(FailingReader, "stderr", 1024).unwrap();
        let err = collector.collect(Duration::from_secs(5)).unwrap_err();
        assert!(err.to_string().contains("stderr"));
    }

    #[test]
    fn collector_decodes_invalid_utf8_lossily() {
        let collector =
            spawn_collector(Cursor::new(vec![b'o', b'k', 0xff]), "stdout", 1024).unwrap();
        let text = collector.collect(Duration::from_secs(5)).unwrap();
        assert!(text.starts_with("ok"));
        assert!(text.contains('\u{fffd}'));
    }
}

//! Newline-delimited framing for worker communication.
//!
//! One record per line, `\n` terminated (a trailing `\r` is tolerated).
//! Lines longer than [`MAX_LINE_BYTES`] are consumed and reported as
//! [`CodecError::Oversized`] without buffering them; the reader stays usable.

use std::io;
use std::mem;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Maximum line size (4 MiB) to prevent unbounded memory allocation.
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("reading worker output: {0}")]
    Io(#[from] io::Error),
    #[error("line of {len} bytes exceeds maximum {MAX_LINE_BYTES}")]
    Oversized { len: usize },
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

impl CodecError {
    /// Whether the reader can continue with the next line.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

/// Reads lines from an async reader.
pub struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
        }
    }

    /// Read the next line without its terminator.
    ///
    /// Returns `Ok(None)` on EOF. A final line without a terminator is
    /// still returned.
    pub async fn read_line(&mut self) -> Result<Option<String>, CodecError> {
        self.buf.clear();
        let mut len = 0usize;
        let mut oversized = false;

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if len == 0 {
                    return Ok(None);
                }
                break;
            }

            let (take, done) = match available.iter().position(|&b| b == b'\n') {
                Some(newline) => (newline + 1, true),
                None => (available.len(), false),
            };
            len += take;
            if len > MAX_LINE_BYTES + 1 {
                oversized = true;
                self.buf.clear();
            } else {
                self.buf.extend_from_slice(&available[..take]);
            }
            self.reader.consume(take);

            if done {
                break;
            }
        }

        if oversized {
            return Err(CodecError::Oversized { len });
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        }
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        String::from_utf8(mem::take(&mut self.buf))
            .map(Some)
            .map_err(|_| CodecError::InvalidUtf8)
    }
}

/// Writes lines to an async writer.
pub struct LineWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write `line` plus a `\n` terminator and flush.
    ///
    /// `line` must not contain a newline; serialized JSON never does.
    pub async fn write_line(&mut self, line: &str) -> io::Result<()> {
        debug_assert!(!line.contains('\n'));
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_lines_in_order() {
        let buf: &[u8] = b"{\"id\":1}\n{\"id\":2}\r\n";
        let mut reader = LineReader::new(buf);
        assert_eq!(reader.read_line().await.unwrap().unwrap(), "{\"id\":1}");
        assert_eq!(reader.read_line().await.unwrap().unwrap(), "{\"id\":2}");
        assert!(reader.read_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_returns_none() {
        let buf: &[u8] = b"";
        let mut reader = LineReader::new(buf);
        assert!(reader.read_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unterminated_last_line_is_returned() {
        let buf: &[u8] = b"first\nlast";
        let mut reader = LineReader::new(buf);
        assert_eq!(reader.read_line().await.unwrap().unwrap(), "first");
        assert_eq!(reader.read_line().await.unwrap().unwrap(), "last");
        assert!(reader.read_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_lines_are_returned_empty() {
        let buf: &[u8] = b"\n\nx\n";
        let mut reader = LineReader::new(buf);
        assert_eq!(reader.read_line().await.unwrap().unwrap(), "");
        assert_eq!(reader.read_line().await.unwrap().unwrap(), "");
        assert_eq!(reader.read_line().await.unwrap().unwrap(), "x");
    }

    #[tokio::test]
    async fn oversized_line_is_skipped_and_reader_recovers() {
        let mut buf = vec![b'a'; MAX_LINE_BYTES + 10];
        buf.extend_from_slice(b"\n{\"id\":1}\n");
        let mut reader = LineReader::new(buf.as_slice());

        let err = reader.read_line().await.unwrap_err();
        assert!(matches!(err, CodecError::Oversized { len } if len == MAX_LINE_BYTES + 11));
        assert!(err.is_recoverable());
        assert_eq!(reader.read_line().await.unwrap().unwrap(), "{\"id\":1}");
    }

    #[tokio::test]
    async fn line_at_limit_is_accepted() {
        let mut buf = vec![b'a'; MAX_LINE_BYTES];
        buf.push(b'\n');
        let mut reader = LineReader::new(buf.as_slice());
        assert_eq!(reader.read_line().await.unwrap().unwrap().len(), MAX_LINE_BYTES);
    }

    #[tokio::test]
    async fn invalid_utf8_is_recoverable() {
        let buf: &[u8] = b"\xff\xfe\nok\n";
        let mut reader = LineReader::new(buf);
        let err = reader.read_line().await.unwrap_err();
        assert!(matches!(err, CodecError::InvalidUtf8));
        assert!(err.is_recoverable());
        assert_eq!(reader.read_line().await.unwrap().unwrap(), "ok");
    }

    #[tokio::test]
    async fn multibyte_utf8_survives() {
        let buf = "{\"k\":\"é\"}\n".as_bytes();
        let mut reader = LineReader::new(buf);
        assert_eq!(reader.read_line().await.unwrap().unwrap(), "{\"k\":\"é\"}");
    }

    #[tokio::test]
    async fn writer_terminates_each_line() {
        let mut buf = Vec::new();
        let mut writer = LineWriter::new(&mut buf);
        writer.write_line("{\"id\":1}").await.unwrap();
        writer.write_line("{\"id\":2}").await.unwrap();
        assert_eq!(buf, b"{\"id\":1}\n{\"id\":2}\n");
    }

    #[test]
    fn io_errors_are_fatal() {
        let err = CodecError::from(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        assert!(!err.is_recoverable());
    }
}

use std::io::{self, BufRead, BufReader, Read, Write};

use super::StopFlag;
use crate::error::{ParseErrorKind, Result, RtspError};

/// Longest accepted text line, terminator excluded.
pub const MAX_LINE_SIZE: usize = 4098;

/// How many bytes a pattern scan consumes between stop-flag checks.
const STOP_CHECK_INTERVAL: usize = 4096;

/// Buffered reader over the session's byte stream.
///
/// Mixes line-oriented reads (RTSP status line and headers) with exact-size
/// binary reads (interleaved RTP) on the same buffer, and checks the
/// [`StopFlag`] before every blocking read.
pub struct StreamReader<S> {
    inner: BufReader<S>,
    stop: StopFlag,
}

impl<S> StreamReader<S> {
    pub fn get_ref(&self) -> &S {
        self.inner.get_ref()
    }

    pub fn get_mut(&mut self) -> &mut S {
        self.inner.get_mut()
    }
}

impl<S: Read> StreamReader<S> {
    pub fn new(stream: S, stop: StopFlag) -> Self {
        Self {
            inner: BufReader::new(stream),
            stop,
        }
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let byte = match self.inner.fill_buf()?.first() {
            Some(&b) => b,
            None => return Ok(None),
        };
        self.inner.consume(1);
        Ok(Some(byte))
    }

    /// Read one line, without its `\r\n` (or bare `\n`) terminator.
    ///
    /// Returns `None` at end of stream. Lines longer than
    /// [`MAX_LINE_SIZE`] fail with [`ParseErrorKind::LineTooLong`].
    pub fn read_line(&mut self) -> Result<Option<String>> {
        self.stop.check()?;
        let mut line = Vec::new();

        loop {
            let available = self.inner.fill_buf()?;
            if available.is_empty() {
                if line.is_empty() {
                    return Ok(None);
                }
                break;
            }

            let (used, done) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    line.extend_from_slice(&available[..i]);
                    (i + 1, true)
                }
                None => {
                    line.extend_from_slice(available);
                    (available.len(), false)
                }
            };
            self.inner.consume(used);

            if line.len() > MAX_LINE_SIZE + 1 {
                return Err(RtspError::parse(ParseErrorKind::LineTooLong));
            }
            if done {
                break;
            }
        }

        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.len() > MAX_LINE_SIZE {
            return Err(RtspError::parse(ParseErrorKind::LineTooLong));
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    /// Discard bytes until `pattern` has been consumed.
    ///
    /// Returns `false` if the stream ended first.
    pub fn read_until_found(&mut self, pattern: &[u8]) -> Result<bool> {
        self.stop.check()?;
        if pattern.is_empty() {
            return Ok(true);
        }

        let mut window = Vec::with_capacity(pattern.len());
        let mut scanned = 0usize;

        while let Some(byte) = self.read_byte()? {
            if window.len() == pattern.len() {
                window.remove(0);
            }
            window.push(byte);
            scanned += 1;

            if window == pattern {
                let skipped = scanned - pattern.len();
                if skipped > 0 {
                    tracing::debug!(skipped, "skipped bytes before pattern");
                }
                return Ok(true);
            }
            if scanned % STOP_CHECK_INTERVAL == 0 {
                self.stop.check()?;
            }
        }
        Ok(false)
    }

    /// Fill `buf` completely.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stop.check()?;
        self.inner.read_exact(buf)?;
        Ok(())
    }

    /// Read `len` bytes as (lossy) UTF-8 text.
    ///
    /// The buffer grows with the data actually received, so callers must
    /// bound `len` themselves.
    pub fn read_text(&mut self, len: usize) -> Result<String> {
        self.stop.check()?;
        let mut buf = Vec::new();
        (&mut self.inner).take(len as u64).read_to_end(&mut buf)?;
        if buf.len() < len {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Discard exactly `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.stop.check()?;
        let skipped = io::copy(&mut (&mut self.inner).take(len as u64), &mut io::sink())?;
        if skipped < len as u64 {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        Ok(())
    }
}

impl<S: Write> StreamReader<S> {
    /// Write a complete message to the underlying stream and flush it.
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stop.check()?;
        let stream = self.inner.get_mut();
        stream.write_all(bytes)?;
        stream.flush()?;
        Ok(())
    }
}

//! Length-prefixed framing for append-only record files.
//!
//! Each frame is a big-endian `u32` length followed by that many bytes.
//! A reader distinguishes a clean end of input from a torn final frame
//! so recovery can drop a partially written tail.

use crate::{CodecError, CodecResult};
use std::io::{self, Read, Write};

/// Largest frame accepted by readers
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Frame writer
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: Write> FrameWriter<W> {
    /// Create a new writer
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one frame
    ///
    /// # Errors
    ///
    /// Returns `FrameTooLarge` or `Io`
    pub fn write_frame(&mut self, payload: &[u8]) -> CodecResult<()> {
        if payload.len() > MAX_FRAME_LEN {
            return Err(CodecError::FrameTooLarge {
                size: payload.len(),
                limit: MAX_FRAME_LEN,
            });
        }
        self.writer.write_all(&(payload.len() as u32).to_be_bytes())?;
        self.writer.write_all(payload)?;
        Ok(())
    }

    /// Flush the writer
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Borrow the inner writer
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Consume and return the inner writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Frame reader
pub struct FrameReader<R> {
    reader: R,
}

impl<R: Read> FrameReader<R> {
    /// Create a new reader
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Read the next frame; `Ok(None)` at a clean end of input
    ///
    /// # Errors
    ///
    /// Returns `Truncated` for a torn frame, `FrameTooLarge` for an
    /// implausible length, or `Io`
    pub fn read_frame(&mut self) -> CodecResult<Option<Vec<u8>>> {
        let mut len_bytes = [0u8; 4];
        let n = read_fully(&mut self.reader, &mut len_bytes)?;
        if n == 0 {
            return Ok(None);
        }
        if n < len_bytes.len() {
            return Err(CodecError::Truncated {
                expected: len_bytes.len(),
                found: n,
            });
        }

        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > MAX_FRAME_LEN {
            return Err(CodecError::FrameTooLarge {
                size: len,
                limit: MAX_FRAME_LEN,
            });
        }

        let mut buffer = vec![0u8; len];
        let n = read_fully(&mut self.reader, &mut buffer)?;
        if n < len {
            return Err(CodecError::Truncated { expected: len, found: n });
        }
        Ok(Some(buffer))
    }
}

/// Fill `buf` until it is full or the input ends; returns bytes read
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

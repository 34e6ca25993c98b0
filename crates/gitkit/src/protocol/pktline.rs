//! pkt-line framing.
//!
//! Each frame is a 4-digit lowercase hex length followed by the payload. The
//! length counts the 4 prefix bytes themselves. `0000` is a flush frame and
//! carries no payload.

use crate::error::{Error, Result};

/// Length of the hex prefix.
pub const PREFIX_LEN: usize = 4;

/// Largest frame git accepts, prefix included.
pub const MAX_PKT_LEN: usize = 65520;

/// Largest payload that fits in one frame.
pub const MAX_PAYLOAD_LEN: usize = MAX_PKT_LEN - PREFIX_LEN;

const FLUSH: &[u8; 4] = b"0000";

/// Frame a payload.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::plumbing(format!(
            "pkt-line payload of {} bytes exceeds {MAX_PAYLOAD_LEN}",
            payload.len()
        )));
    }
    let mut frame = Vec::with_capacity(PREFIX_LEN + payload.len());
    frame.extend_from_slice(format!("{:04x}", PREFIX_LEN + payload.len()).as_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Append a framed payload to `out`.
pub fn write(out: &mut Vec<u8>, payload: &[u8]) -> Result<()> {
    out.extend_from_slice(&encode(payload)?);
    Ok(())
}

/// The flush frame.
pub fn flush() -> &'static [u8] {
    FLUSH
}

/// One decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PktLine<'a> {
    Flush,
    Data(&'a [u8]),
}

impl<'a> PktLine<'a> {
    /// Payload bytes; empty for a flush.
    pub fn payload(&self) -> &'a [u8] {
        match self {
            PktLine::Flush => &[],
            PktLine::Data(data) => data,
        }
    }
}

/// Iterates over the frames of a pkt-line stream.
///
/// ```rust
/// use gitkit::protocol::pktline::{PktLine, PktLineReader};
///
/// let mut reader = PktLineReader::new(b"0009done\n0000");
/// assert_eq!(reader.next().unwrap().unwrap(), PktLine::Data(b"done\n"));
/// assert_eq!(reader.next().unwrap().unwrap(), PktLine::Flush);
/// assert!(reader.next().is_none());
/// ```
pub struct PktLineReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PktLineReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not consumed yet.
    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn read_frame(&mut self) -> Result<PktLine<'a>> {
        let rest = self.remaining();
        if rest.len() < PREFIX_LEN {
            return Err(Error::plumbing("truncated pkt-line length"));
        }

        let prefix = std::str::from_utf8(&rest[..PREFIX_LEN])
            .map_err(|_| Error::plumbing("pkt-line length is not ASCII"))?;
        let len = usize::from_str_radix(prefix, 16)
            .map_err(|_| Error::plumbing(format!("invalid pkt-line length '{prefix}'")))?;

        if len == 0 {
            self.pos += PREFIX_LEN;
            return Ok(PktLine::Flush);
        }
        if len < PREFIX_LEN || len > rest.len() {
            return Err(Error::plumbing(format!(
                "pkt-line length {len} out of range ({} bytes left)",
                rest.len()
            )));
        }

        self.pos += len;
        Ok(PktLine::Data(&rest[PREFIX_LEN..len]))
    }
}

impl<'a> Iterator for PktLineReader<'a> {
    type Item = Result<PktLine<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let frame = self.read_frame();
        if frame.is_err() {
            // Stop after the first malformed frame.
            self.pos = self.buf.len();
        }
        Some(frame)
    }
}

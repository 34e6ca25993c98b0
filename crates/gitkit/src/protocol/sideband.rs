//! side-band-64k multiplexing.
//!
//! Every frame is a pkt-line whose first payload byte names the channel.

use super::pktline::{self, MAX_PAYLOAD_LEN};
use crate::error::Result;

/// Pack data channel.
pub const PACK_DATA: u8 = 1;

/// Progress messages.
pub const PROGRESS: u8 = 2;

/// Fatal error message.
pub const ERROR: u8 = 3;

/// Data bytes that fit in one side-band-64k frame.
pub const MAX_CHUNK: usize = MAX_PAYLOAD_LEN - 1;

/// Append `data` as frames on `channel`, splitting at [`MAX_CHUNK`].
pub fn write_channel(out: &mut Vec<u8>, channel: u8, data: &[u8]) -> Result<()> {
    let mut frame = Vec::with_capacity(MAX_PAYLOAD_LEN);
    for chunk in data.chunks(MAX_CHUNK) {
        frame.clear();
        frame.push(channel);
        frame.extend_from_slice(chunk);
        pktline::write(out, &frame)?;
    }
    Ok(())
}

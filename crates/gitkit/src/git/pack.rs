//! Version 2 pack-file writer.
//!
//! Every object is stored whole (no deltas): a type/size header followed by
//! the zlib-compressed content. The file ends with the SHA-1 of everything
//! before it.

use flate2::Compression;
use sha1::{Digest, Sha1};

use super::object::{ObjectKind, deflate};
use crate::error::Result;

const PACK_SIGNATURE: &[u8; 4] = b"PACK";
const PACK_VERSION: u32 = 2;

/// Accumulates objects and emits a pack.
pub struct PackWriter {
    entries: Vec<u8>,
    count: u32,
    level: Compression,
}

impl PackWriter {
    /// Create an empty writer.
    pub fn new(level: Compression) -> Self {
        Self {
            entries: Vec::new(),
            count: 0,
            level,
        }
    }

    /// Append one object.
    pub fn add(&mut self, kind: ObjectKind, content: &[u8]) -> Result<()> {
        self.entries
            .extend_from_slice(&entry_header(kind, content.len() as u64));
        self.entries.extend_from_slice(&deflate(content, self.level)?);
        self.count += 1;
        Ok(())
    }

    /// Number of objects added.
    pub fn len(&self) -> u32 {
        self.count
    }

    /// Whether no object was added.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Emit the pack with header and checksum trailer.
    pub fn finish(self) -> Vec<u8> {
        let mut pack = Vec::with_capacity(12 + self.entries.len() + 20);
        pack.extend_from_slice(PACK_SIGNATURE);
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&self.count.to_be_bytes());
        pack.extend_from_slice(&self.entries);

        let digest = Sha1::digest(&pack);
        pack.extend_from_slice(&digest);
        pack
    }
}

/// Type and size header: 3 type bits and 4 size bits in the first byte, then
/// 7 size bits per byte, MSB set while more bytes follow.
fn entry_header(kind: ObjectKind, size: u64) -> Vec<u8> {
    let mut header = Vec::with_capacity(10);
    let mut byte = (kind.pack_code() << 4) | (size & 0x0f) as u8;
    let mut rest = size >> 4;

    while rest > 0 {
        header.push(byte | 0x80);
        byte = (rest & 0x7f) as u8;
        rest >>= 7;
    }
    header.push(byte);
    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    #[test]
    fn small_header_is_one_byte() {
        assert_eq!(entry_header(ObjectKind::Blob, 5), vec![0x35]);
    }

    #[test]
    fn large_header_continues() {
        // 300 = 0b1_0010_1100: low nibble 0xc, then 300 >> 4 = 18
        assert_eq!(entry_header(ObjectKind::Commit, 300), vec![0x9c, 0x12]);
    }

    #[test]
    fn pack_layout() {
        let mut writer = PackWriter::new(Compression::default());
        writer.add(ObjectKind::Blob, b"hello\n").unwrap();
        assert_eq!(writer.len(), 1);
        let pack = writer.finish();

        assert_eq!(&pack[..4], b"PACK");
        assert_eq!(&pack[4..8], &2u32.to_be_bytes());
        assert_eq!(&pack[8..12], &1u32.to_be_bytes());
        assert_eq!(pack[12], 0x36);

        let body = &pack[13..pack.len() - 20];
        let mut inflated = Vec::new();
        ZlibDecoder::new(body).read_to_end(&mut inflated).unwrap();
        assert_eq!(inflated, b"hello\n");

        let trailer = Sha1::digest(&pack[..pack.len() - 20]);
        assert_eq!(&pack[pack.len() - 20..], trailer.as_slice());
    }

    #[test]
    fn empty_pack_has_zero_count() {
        let pack = PackWriter::new(Compression::default()).finish();
        assert_eq!(pack.len(), 32);
        assert_eq!(&pack[8..12], &0u32.to_be_bytes());
    }
}

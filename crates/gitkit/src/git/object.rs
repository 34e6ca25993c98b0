//! Git object model: ids, loose-object framing, tree and commit encoding.
//!
//! Encodings are canonical git, so ids computed here match the ids real git
//! computes for the same content.

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use sha1::{Digest, Sha1};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Tree entry mode for regular files.
pub const MODE_FILE: u32 = 0o100644;
/// Tree entry mode for executables.
pub const MODE_EXECUTABLE: u32 = 0o100755;
/// Tree entry mode for symbolic links.
pub const MODE_SYMLINK: u32 = 0o120000;
/// Tree entry mode for subtrees.
pub const MODE_TREE: u32 = 0o040000;
/// Tree entry mode for submodule commits.
pub const MODE_COMMIT: u32 = 0o160000;

/// SHA-1 object id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// The all-zero id git uses for "no object".
    pub const ZERO: ObjectId = ObjectId([0; 20]);

    /// Id from raw bytes; `None` unless exactly 20 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 20] = bytes.try_into().ok()?;
        Some(Self(raw))
    }

    /// Id from 40 hex characters.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.trim();
        let invalid = || Error::plumbing(format!("invalid object id '{hex}'"));
        if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let mut raw = [0u8; 20];
        for (byte, pair) in raw.iter_mut().zip(hex.as_bytes().chunks(2)) {
            let pair = std::str::from_utf8(pair).map_err(|_| invalid())?;
            *byte = u8::from_str_radix(pair, 16).map_err(|_| invalid())?;
        }
        Ok(Self(raw))
    }

    /// Hash `content` as an object of `kind`.
    pub fn hash_object(kind: ObjectKind, content: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(object_header(kind, content.len()));
        hasher.update(content);
        let digest = hasher.finalize();

        let mut raw = [0u8; 20];
        raw.copy_from_slice(&digest);
        Self(raw)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase hex form.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Whether this is [`ObjectId::ZERO`].
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 20]
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

/// Object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
}

impl ObjectKind {
    /// Name used in object headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Commit => "commit",
            ObjectKind::Tree => "tree",
            ObjectKind::Blob => "blob",
        }
    }

    /// Type number in pack entry headers.
    pub fn pack_code(&self) -> u8 {
        match self {
            ObjectKind::Commit => 1,
            ObjectKind::Tree => 2,
            ObjectKind::Blob => 3,
        }
    }

    fn parse(name: &str) -> Result<Self> {
        match name {
            "commit" => Ok(ObjectKind::Commit),
            "tree" => Ok(ObjectKind::Tree),
            "blob" => Ok(ObjectKind::Blob),
            other => Err(Error::plumbing(format!("unsupported object type '{other}'"))),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn object_header(kind: ObjectKind, len: usize) -> Vec<u8> {
    format!("{} {}\0", kind.as_str(), len).into_bytes()
}

/// zlib-compress a buffer.
pub(crate) fn deflate(data: &[u8], level: Compression) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), level);
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Frame and compress an object the way loose objects are stored.
pub fn encode_loose(kind: ObjectKind, content: &[u8], level: Compression) -> Result<Vec<u8>> {
    let mut raw = object_header(kind, content.len());
    raw.extend_from_slice(content);
    deflate(&raw, level)
}

/// Decompress and unframe a loose object.
pub fn decode_loose(stored: &[u8]) -> Result<(ObjectKind, Vec<u8>)> {
    let mut raw = Vec::new();
    ZlibDecoder::new(stored).read_to_end(&mut raw)?;

    let nul = raw
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| Error::plumbing("object header is not terminated"))?;
    let header = std::str::from_utf8(&raw[..nul])
        .map_err(|_| Error::plumbing("object header is not utf-8"))?;
    let (kind, len) = header
        .split_once(' ')
        .ok_or_else(|| Error::plumbing(format!("malformed object header '{header}'")))?;
    let kind = ObjectKind::parse(kind)?;
    let len: usize = len
        .parse()
        .map_err(|_| Error::plumbing(format!("malformed object length '{len}'")))?;

    let content = raw.split_off(nul + 1);
    if content.len() != len {
        return Err(Error::plumbing(format!(
            "object length mismatch: header says {len}, found {}",
            content.len()
        )));
    }
    Ok((kind, content))
}

/// One entry of a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Git file mode
    pub mode: u32,
    /// Entry name (single path segment)
    pub name: String,
    /// Referenced object
    pub oid: ObjectId,
}

impl TreeEntry {
    /// Kind of object the entry points at.
    pub fn kind(&self) -> ObjectKind {
        match self.mode {
            MODE_TREE => ObjectKind::Tree,
            MODE_COMMIT => ObjectKind::Commit,
            _ => ObjectKind::Blob,
        }
    }

    /// Whether the entry is a subtree.
    pub fn is_tree(&self) -> bool {
        self.mode == MODE_TREE
    }

    fn sort_key(&self) -> Vec<u8> {
        let mut key = self.name.as_bytes().to_vec();
        if self.is_tree() {
            key.push(b'/');
        }
        key
    }
}

/// Serialize tree entries in git's canonical order.
pub fn encode_tree(entries: &[TreeEntry]) -> Vec<u8> {
    let mut sorted: Vec<&TreeEntry> = entries.iter().collect();
    sorted.sort_by_key(|entry| entry.sort_key());

    let mut out = Vec::new();
    for entry in sorted {
        out.extend_from_slice(format!("{:o} {}\0", entry.mode, entry.name).as_bytes());
        out.extend_from_slice(entry.oid.as_bytes());
    }
    out
}

/// Parse a tree object.
pub fn decode_tree(content: &[u8]) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    let mut rest = content;

    while !rest.is_empty() {
        let space = rest
            .iter()
            .position(|b| *b == b' ')
            .ok_or_else(|| Error::plumbing("malformed tree entry mode"))?;
        let mode = std::str::from_utf8(&rest[..space])
            .ok()
            .and_then(|m| u32::from_str_radix(m, 8).ok())
            .ok_or_else(|| Error::plumbing("malformed tree entry mode"))?;
        rest = &rest[space + 1..];

        let nul = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| Error::plumbing("malformed tree entry name"))?;
        let name = String::from_utf8_lossy(&rest[..nul]).into_owned();
        rest = &rest[nul + 1..];

        if rest.len() < 20 {
            return Err(Error::plumbing("truncated tree entry id"));
        }
        let oid = ObjectId::from_bytes(&rest[..20])
            .ok_or_else(|| Error::plumbing("truncated tree entry id"))?;
        rest = &rest[20..];

        entries.push(TreeEntry { mode, name, oid });
    }

    Ok(entries)
}

/// Author or committer identity with a timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    /// Seconds since the Unix epoch
    pub timestamp: i64,
    /// Offset from UTC in minutes
    pub tz_offset_minutes: i32,
}

impl Signature {
    /// Signature at a UTC timestamp.
    pub fn new(name: impl Into<String>, email: impl Into<String>, timestamp: i64) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            timestamp,
            tz_offset_minutes: 0,
        }
    }

    fn encode(&self) -> String {
        let sign = if self.tz_offset_minutes < 0 { '-' } else { '+' };
        let offset = self.tz_offset_minutes.unsigned_abs();
        format!(
            "{} <{}> {} {}{:02}{:02}",
            self.name,
            self.email,
            self.timestamp,
            sign,
            offset / 60,
            offset % 60
        )
    }

    fn decode(text: &str) -> Result<Self> {
        let malformed = || Error::plumbing(format!("malformed signature '{text}'"));

        let open = text.find('<').ok_or_else(malformed)?;
        let close = text.rfind('>').ok_or_else(malformed)?;
        if close < open {
            return Err(malformed());
        }
        let name = text[..open].trim_end().to_string();
        let email = text[open + 1..close].to_string();

        let mut tail = text[close + 1..].split_whitespace();
        let timestamp = tail
            .next()
            .and_then(|t| t.parse::<i64>().ok())
            .ok_or_else(malformed)?;
        let tz_offset_minutes = match tail.next() {
            Some(tz) if tz.len() == 5 && tz.is_ascii() => {
                let hours: i32 = tz[1..3].parse().map_err(|_| malformed())?;
                let minutes: i32 = tz[3..5].parse().map_err(|_| malformed())?;
                let total = hours * 60 + minutes;
                if tz.starts_with('-') { -total } else { total }
            }
            _ => 0,
        };

        Ok(Self {
            name,
            email,
            timestamp,
            tz_offset_minutes,
        })
    }
}

/// Parsed commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

/// Serialize a commit object. The message always ends with a newline.
pub fn encode_commit(commit: &CommitInfo) -> Vec<u8> {
    let mut out = format!("tree {}\n", commit.tree);
    for parent in &commit.parents {
        out.push_str(&format!("parent {parent}\n"));
    }
    out.push_str(&format!("author {}\n", commit.author.encode()));
    out.push_str(&format!("committer {}\n", commit.committer.encode()));
    out.push('\n');
    out.push_str(&commit.message);
    if !commit.message.ends_with('\n') {
        out.push('\n');
    }
    out.into_bytes()
}

/// Parse a commit object.
pub fn decode_commit(content: &[u8]) -> Result<CommitInfo> {
    let text = String::from_utf8_lossy(content);
    let text: &str = text.as_ref();
    let (header, message) = text.split_once("\n\n").unwrap_or((text, ""));

    let mut tree = None;
    let mut parents = Vec::new();
    let mut author = None;
    let mut committer = None;

    for line in header.lines() {
        // Continuation lines (e.g. signatures) start with a space.
        let Some((key, value)) = line.split_once(' ') else {
            continue;
        };
        match key {
            "tree" => tree = Some(ObjectId::from_hex(value)?),
            "parent" => parents.push(ObjectId::from_hex(value)?),
            "author" => author = Some(Signature::decode(value)?),
            "committer" => committer = Some(Signature::decode(value)?),
            _ => {}
        }
    }

    let tree = tree.ok_or_else(|| Error::plumbing("commit has no tree"))?;
    let author = author.ok_or_else(|| Error::plumbing("commit has no author"))?;
    let committer = committer.unwrap_or_else(|| author.clone());

    Ok(CommitInfo {
        tree,
        parents,
        author,
        committer,
        message: message.to_string(),
    })
}

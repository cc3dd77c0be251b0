//! SHA-256 helpers.
//!
//! Artifact digests are always computed by streaming: firmware images and
//! rootfs tarballs routinely run to hundreds of megabytes.

use camino::Utf8Path;
use fs_err as fs;
use sha2::{Digest, Sha256};
use std::io::{self, Read};

const CHUNK: usize = 64 * 1024;

/// Lowercase hex SHA-256 of an in-memory buffer.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub sha256: String,
    pub size: u64,
}

/// Stream a reader through SHA-256, returning the digest and byte count.
pub fn sha256_reader<R: Read>(mut reader: R) -> io::Result<FileDigest> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK];
    let mut size = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok(FileDigest {
        sha256: hex::encode(hasher.finalize()),
        size,
    })
}

pub fn sha256_file(path: &Utf8Path) -> io::Result<FileDigest> {
    let file = fs::File::open(path)?;
    sha256_reader(io::BufReader::new(file))
}

/// True for a 64-character hex string (either case).
pub fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

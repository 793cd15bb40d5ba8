//! SHA-256 content digests, streamed in fixed-size chunks.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

const CHUNK_SIZE: usize = 8192;

/// Hex digest of everything readable from `reader`.
pub fn hash_reader(mut reader: impl Read) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hex digest of a file's contents.
pub fn hash_file(path: impl AsRef<Path>) -> std::io::Result<String> {
    hash_reader(File::open(path)?)
}

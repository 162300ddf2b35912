use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::error::EngineError;

/// Size of the streaming read buffer used to hash files. Fixed at 64 KiB per the manifest
/// compatibility contract: the digest must be byte-identical to what the source system computes,
/// which streams in the same block size.
const BLOCK_SIZE: usize = 64 * 1024;

/// Computes the lowercase hex SHA-1 digest of the file at `path`, streaming its contents in
/// [`BLOCK_SIZE`] blocks.
///
/// This digest doubles as the manifest's change-detection key and its durable on-disk field, so
/// any reimplementation must match this one byte-for-byte.
pub fn sha1_hex(path: impl AsRef<Path>) -> Result<String, EngineError> {
  let path = path.as_ref();
  let mut file = File::open(path).map_err(|e| EngineError::io(path, e))?;
  let mut hasher = Sha1::new();
  let mut buf = [0u8; BLOCK_SIZE];
  loop {
    let read = file.read(&mut buf).map_err(|e| EngineError::io(path, e))?;
    if read == 0 {
      break;
    }
    hasher.update(&buf[..read]);
  }
  let digest = hasher.finalize();
  let mut hex = String::with_capacity(digest.len() * 2);
  for byte in digest {
    hex.push_str(&format!("{:02x}", byte));
  }
  Ok(hex)
}

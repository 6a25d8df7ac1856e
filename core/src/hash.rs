use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

use crate::error::{CoreError, CoreResult};

/// MD5 of a file's contents as a lowercase hex string. This keys the
/// password cache, so identical archives hash the same whatever they are
/// named.
pub fn file_md5(path: &Path) -> CoreResult<String> {
    let mut file = File::open(path)
        .map_err(|e| CoreError::Io(format!("open {} for hashing: {}", path.display(), e)))?;
    let mut hasher = <Md5 as Digest>::new();
    let mut buf = [0u8; 1024 * 64];
    loop {
        let read = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => return Err(CoreError::Io(format!("read {}: {}", path.display(), e))),
        };
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

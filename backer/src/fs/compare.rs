//! Byte-for-byte file comparison.
//!
//! Used only as a fallback when a destination file has the right size but its
//! fingerprint could not prove it is the same file.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read until `buf` is full or the reader is exhausted. Returns the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
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

/// Compare two readers chunk by chunk, stopping at the first difference.
pub fn readers_identical<A: Read, B: Read>(a: &mut A, b: &mut B, chunk_size: usize) -> io::Result<bool> {
    let chunk_size = chunk_size.max(1);
    let mut buf_a = vec![0u8; chunk_size];
    let mut buf_b = vec![0u8; chunk_size];

    loop {
        let n_a = read_full(a, &mut buf_a)?;
        let n_b = read_full(b, &mut buf_b)?;

        if buf_a[..n_a] != buf_b[..n_b] {
            return Ok(false);
        }
        // A short chunk means end of stream; both must end together
        if n_a < chunk_size {
            return Ok(true);
        }
    }
}

/// Compare the contents of two files.
pub fn files_identical(a: &Path, b: &Path, chunk_size: usize) -> io::Result<bool> {
    let mut file_a = File::open(a)?;
    let mut file_b = File::open(b)?;
    readers_identical(&mut file_a, &mut file_b, chunk_size)
}

//! BLAKE3 content fingerprints for change detection

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

/// Files at or above this size are hashed through a memory map
pub const MMAP_THRESHOLD: u64 = 4 * 1024 * 1024;

/// A BLAKE3 digest of a file's full byte content (32 bytes)
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Create a new Fingerprint from bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        const HEX_CHARS: &[u8] = b"0123456789abcdef";
        let mut hex = String::with_capacity(64);
        for &byte in &self.0 {
            hex.push(HEX_CHARS[(byte >> 4) as usize] as char);
            hex.push(HEX_CHARS[(byte & 0xf) as usize] as char);
        }
        hex
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Fingerprint in-memory bytes
pub fn hash_bytes(data: &[u8]) -> Fingerprint {
    Fingerprint::from_bytes(*blake3::hash(data).as_bytes())
}

/// Fingerprint a file, picking streaming or mmap by size
///
/// Only for files no other process truncates; see [`hash_file_mmap`].
pub fn hash_file(path: &Path) -> Result<Fingerprint> {
    let len = fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();

    if len >= MMAP_THRESHOLD {
        hash_file_mmap(path)
    } else {
        hash_file_streaming(path)
    }
}

/// Fingerprint a file with buffered streaming reads
pub fn hash_file_streaming(path: &Path) -> Result<Fingerprint> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = blake3::Hasher::new();

    let mut buffer = [0u8; 8192]; // 8KB buffer
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Fingerprint::from_bytes(*hasher.finalize().as_bytes()))
}

/// Fingerprint a file using memory-mapped I/O (optimized for large files)
///
/// The caller must be the only writer of `path`. Touching mapped pages past
/// the end of a file truncated by someone else raises SIGBUS.
pub fn hash_file_mmap(path: &Path) -> Result<Fingerprint> {
    use memmap2::Mmap;

    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    // SAFETY: read-only map, dropped before returning. Callers guarantee no
    // concurrent truncation (replica files only have us as a writer).
    let mmap = unsafe { Mmap::map(&file)? };
    let mut hasher = blake3::Hasher::new();
    hasher.update_rayon(&mmap);
    Ok(Fingerprint::from_bytes(*hasher.finalize().as_bytes()))
}

/// Decide whether a source file and its replica hold different content
///
/// Sizes are compared first: a size mismatch is a guaranteed content
/// mismatch. Equal sizes always fall through to a full fingerprint
/// comparison, so size is never the only evidence for "unchanged".
///
/// The source may be rewritten or truncated by other processes at any
/// time, so it is always streamed. Only the replica may be memory-mapped.
///
/// Any error reading either side counts as changed. A file that vanished
/// between scan and comparison must not abort classification.
pub fn files_differ(source: &Path, replica: &Path) -> bool {
    let (source_meta, replica_meta) = match (fs::metadata(source), fs::metadata(replica)) {
        (Ok(ms), Ok(mr)) => (ms, mr),
        _ => return true,
    };

    if source_meta.len() != replica_meta.len() {
        return true;
    }

    match (hash_file_streaming(source), hash_file(replica)) {
        (Ok(ha), Ok(hb)) => ha != hb,
        (Err(e), _) | (_, Err(e)) => {
            tracing::debug!(error = %e, "Fingerprint failed, treating as changed");
            true
        }
    }
}

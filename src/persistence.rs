//! Outcome cache persistence for cross-run reuse
//!
//! Persisting a cache is opt-in. The file is an opaque fingerprint -> outcome
//! mapping; nothing about the candidates themselves is stored.
//!
//! # Format
//!
//! ```text
//! magic    4 bytes   "DDOC"
//! version  u16 LE
//! count    u64 LE
//! entries  count * (fingerprint: 32 bytes, outcome code: u8)
//! ```
//!
//! Entries are written in fingerprint order so that equal caches produce
//! byte-identical files. Writes go to a temporary sibling file that is then
//! renamed over the destination.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info};

use crate::cache::OutcomeCache;
use crate::error::{CacheError, CacheResult};
use crate::outcome::{Fingerprint, Outcome};

const MAGIC: &[u8; 4] = b"DDOC";
const FORMAT_VERSION: u16 = 1;

/// Summary of a merge into an existing cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Entries read from the file
    pub read: usize,
    /// Entries that were new to the cache
    pub inserted: usize,
    /// Entries whose outcome disagreed with the cache (cache kept its own)
    pub conflicts: usize,
}

impl OutcomeCache {
    /// Write all entries to `path`, replacing any existing file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> CacheResult<()> {
        let path = path.as_ref();
        let entries = self.entries();

        let mut buffer = Vec::with_capacity(14 + entries.len() * 33);
        buffer.extend_from_slice(MAGIC);
        buffer.write_u16::<LittleEndian>(FORMAT_VERSION)?;
        buffer.write_u64::<LittleEndian>(entries.len() as u64)?;
        for (fingerprint, outcome) in &entries {
            buffer.extend_from_slice(fingerprint.as_bytes());
            buffer.write_u8(outcome.code())?;
        }

        atomic_write(path, &buffer)?;
        info!("saved {} cached outcomes to {}", entries.len(), path.display());
        Ok(())
    }

    /// Read a cache previously written by [`OutcomeCache::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> CacheResult<Self> {
        let cache = OutcomeCache::new();
        cache.merge_from(path)?;
        Ok(cache)
    }

    /// Merge a saved cache into this one, honoring write-once semantics
    pub fn merge_from<P: AsRef<Path>>(&self, path: P) -> CacheResult<MergeSummary> {
        let path = path.as_ref();
        let entries = read_entries(path)?;

        let mut summary = MergeSummary {
            read: entries.len(),
            ..MergeSummary::default()
        };
        for (fingerprint, outcome) in entries {
            match self.peek(&fingerprint) {
                Some(existing) if existing != outcome => summary.conflicts += 1,
                Some(_) => {}
                None => {
                    if self.record(fingerprint, outcome) {
                        summary.inserted += 1;
                    }
                }
            }
        }

        debug!(
            "merged {} from {}: {} new, {} conflicting",
            summary.read,
            path.display(),
            summary.inserted,
            summary.conflicts
        );
        Ok(summary)
    }
}

fn read_entries(path: &Path) -> CacheResult<Vec<(Fingerprint, Outcome)>> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 4];
    read_exact_or_corrupt(&mut reader, &mut magic, "header")?;
    if &magic != MAGIC {
        return Err(CacheError::Corruption(format!(
            "bad magic {:?} in {}",
            magic,
            path.display()
        )));
    }

    let version = reader
        .read_u16::<LittleEndian>()
        .map_err(|e| truncated(e, "version"))?;
    if version != FORMAT_VERSION {
        return Err(CacheError::Corruption(format!(
            "unsupported cache format version {}",
            version
        )));
    }

    let count = reader
        .read_u64::<LittleEndian>()
        .map_err(|e| truncated(e, "entry count"))?;

    let mut entries = Vec::new();
    for index in 0..count {
        let mut digest = [0u8; 32];
        read_exact_or_corrupt(&mut reader, &mut digest, "fingerprint")?;
        let code = reader.read_u8().map_err(|e| truncated(e, "outcome"))?;
        let outcome = Outcome::from_code(code).ok_or_else(|| {
            CacheError::Corruption(format!("unknown outcome code {} at entry {}", code, index))
        })?;
        entries.push((Fingerprint(digest), outcome));
    }

    let mut trailing = [0u8; 1];
    if reader.read(&mut trailing)? != 0 {
        return Err(CacheError::Corruption(format!(
            "trailing data after {} entries",
            count
        )));
    }

    Ok(entries)
}

fn read_exact_or_corrupt<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> CacheResult<()> {
    reader.read_exact(buf).map_err(|e| truncated(e, what))
}

fn truncated(err: io::Error, what: &str) -> CacheError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        CacheError::Corruption(format!("truncated while reading {}", what))
    } else {
        CacheError::Io(err)
    }
}

/// Atomic write operation using temporary file + rename
fn atomic_write(path: &Path, data: &[u8]) -> CacheResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("tmp");
    {
        let mut file = BufWriter::new(File::create(&temp_path)?);
        file.write_all(data)?;
        file.flush()?;
    }

    fs::rename(&temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::ContentHash;
    use tempfile::TempDir;

    fn sample_cache() -> OutcomeCache {
        let cache = OutcomeCache::new();
        cache.record("a".to_string().fingerprint(), Outcome::Fail);
        cache.record("b".to_string().fingerprint(), Outcome::Pass);
        cache.record("c".to_string().fingerprint(), Outcome::Unresolved);
        cache
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("outcomes.ddoc");

        let cache = sample_cache();
        cache.save(&path).unwrap();

        let loaded = OutcomeCache::load(&path).unwrap();
        assert_eq!(loaded.entries(), cache.entries());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_equal_caches_write_identical_files() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first.ddoc");
        let second = dir.path().join("nested/second.ddoc");

        sample_cache().save(&first).unwrap();
        let reversed: OutcomeCache = sample_cache().entries().into_iter().rev().collect();
        reversed.save(&second).unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn test_merge_keeps_existing_outcomes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("outcomes.ddoc");
        sample_cache().save(&path).unwrap();

        let cache = OutcomeCache::new();
        cache.record("a".to_string().fingerprint(), Outcome::Pass);
        let summary = cache.merge_from(&path).unwrap();

        assert_eq!(summary.read, 3);
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.conflicts, 1);
        assert_eq!(cache.lookup(&"a".to_string().fingerprint()), Some(Outcome::Pass));
    }

    #[test]
    fn test_corrupt_files_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("outcomes.ddoc");
        sample_cache().save(&path).unwrap();
        let good = fs::read(&path).unwrap();

        fs::write(&path, b"NOPE").unwrap();
        assert!(matches!(OutcomeCache::load(&path), Err(CacheError::Corruption(_))));

        fs::write(&path, &good[..good.len() - 5]).unwrap();
        assert!(matches!(OutcomeCache::load(&path), Err(CacheError::Corruption(_))));

        let mut bad_code = good.clone();
        let last = bad_code.len() - 1;
        bad_code[last] = 9;
        fs::write(&path, &bad_code).unwrap();
        assert!(matches!(OutcomeCache::load(&path), Err(CacheError::Corruption(_))));

        let mut trailing = good;
        trailing.push(0);
        fs::write(&path, &trailing).unwrap();
        assert!(matches!(OutcomeCache::load(&path), Err(CacheError::Corruption(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = OutcomeCache::load(dir.path().join("absent.ddoc"));
        assert!(matches!(result, Err(CacheError::Io(_))));
    }
}

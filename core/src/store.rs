//! Keyed blob store: a directory-free pair of files (a data file and a
//! `.index` file) holding NUL-terminated text records addressed by integer
//! key. Readers can memory-map the data file for random access or stream it
//! linearly; writers append records and flush an index alongside.

use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed index line in {path}: {line:?}")]
    MalformedIndex { path: PathBuf, line: String },

    #[error("key {0} not found in store")]
    KeyNotFound(u32),

    #[error("record at offset {offset} length {length} runs past the end of the data file ({size} bytes)")]
    RecordOutOfBounds {
        offset: u64,
        length: u64,
        size: u64,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One `.index` entry: key, byte offset into the data file, and record
/// length excluding the trailing NUL.
#[derive(Debug, Clone, Copy)]
pub struct IndexEntry {
    pub key: u32,
    pub offset: u64,
    pub length: u64,
}

/// Random-access reader over a keyed blob store. Memory-maps the data file
/// and loads the index fully into memory, matching the source engine's
/// prefilter-result access pattern (lookup by db key, arbitrary order).
pub struct StoreReader {
    data_path: PathBuf,
    mmap: Mmap,
    index: HashMap<u32, IndexEntry>,
    ordered_keys: Vec<u32>,
}

impl StoreReader {
    pub fn open(data_path: &Path) -> StoreResult<Self> {
        let mmap = Self::map_file(data_path)?;
        let (index, ordered_keys) = Self::load_index(data_path)?;

        Ok(Self {
            data_path: data_path.to_path_buf(),
            mmap,
            index,
            ordered_keys,
        })
    }

    fn map_file(data_path: &Path) -> StoreResult<Mmap> {
        let data_file = File::open(data_path).map_err(|e| io_err(data_path, e))?;
        unsafe { Mmap::map(&data_file) }.map_err(|e| io_err(data_path, e))
    }

    fn load_index(data_path: &Path) -> StoreResult<(HashMap<u32, IndexEntry>, Vec<u32>)> {
        let index_path = index_path_for(data_path);
        let index_file = File::open(&index_path).map_err(|e| io_err(&index_path, e))?;
        let reader = BufReader::new(index_file);
        let mut index = HashMap::new();
        let mut ordered_keys = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|e| io_err(&index_path, e))?;
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let mut parse = || -> Option<(u32, u64, u64)> {
                let key = fields.next()?.parse().ok()?;
                let offset = fields.next()?.parse().ok()?;
                let length = fields.next()?.parse().ok()?;
                Some((key, offset, length))
            };
            let (key, offset, length) = parse().ok_or_else(|| StoreError::MalformedIndex {
                path: index_path.clone(),
                line: line.clone(),
            })?;
            index.insert(key, IndexEntry { key, offset, length });
            ordered_keys.push(key);
        }
        Ok((index, ordered_keys))
    }

    /// Drop and re-establish the memory mapping, releasing the OS page cache
    /// backing it. Called between flush windows so resident memory does not
    /// grow unboundedly over a long-running job (§5).
    pub fn remap_data(&mut self) -> StoreResult<()> {
        self.mmap = Self::map_file(&self.data_path)?;
        Ok(())
    }

    /// Every key present in the store, in index (insertion) order.
    pub fn keys(&self) -> &[u32] {
        &self.ordered_keys
    }

    pub fn contains(&self, key: u32) -> bool {
        self.index.contains_key(&key)
    }

    /// Fetch the raw bytes for `key`, excluding the trailing NUL.
    pub fn get(&self, key: u32) -> StoreResult<&[u8]> {
        let entry = self
            .index
            .get(&key)
            .copied()
            .ok_or(StoreError::KeyNotFound(key))?;
        let end = entry.offset + entry.length;
        if end as usize > self.mmap.len() {
            return Err(StoreError::RecordOutOfBounds {
                offset: entry.offset,
                length: entry.length,
                size: self.mmap.len() as u64,
            });
        }
        Ok(&self.mmap[entry.offset as usize..end as usize])
    }

    pub fn get_str(&self, key: u32) -> StoreResult<&str> {
        let bytes = self.get(key)?;
        Ok(std::str::from_utf8(bytes).unwrap_or(""))
    }

    pub fn len(&self) -> usize {
        self.ordered_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_keys.is_empty()
    }
}

/// Append-only writer over a keyed blob store, using the `writeStart` /
/// `writeAdd` / `writeEnd` protocol: callers accumulate one query's worth of
/// output into a thread-local buffer and flush it as a single record, so
/// concurrent workers never interleave partial records.
pub struct StoreWriter {
    data: BufWriter<File>,
    index: BufWriter<File>,
    offset: u64,
    pending: Vec<u8>,
}

impl StoreWriter {
    pub fn create(data_path: &Path) -> StoreResult<Self> {
        let index_path = index_path_for(data_path);
        let data = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(data_path)
            .map_err(|e| io_err(data_path, e))?;
        let index = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&index_path)
            .map_err(|e| io_err(&index_path, e))?;
        Ok(Self {
            data: BufWriter::new(data),
            index: BufWriter::new(index),
            offset: 0,
            pending: Vec::new(),
        })
    }

    /// Begin accumulating a record. Mirrors `writeStart` from the source
    /// writer protocol; per-thread buffering is the caller's responsibility
    /// (each rayon worker owns its own `StoreWriter` or guards access with a
    /// mutex, per §5).
    pub fn write_start(&mut self) {
        self.pending.clear();
    }

    pub fn write_add(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Flush the accumulated record under `key`, appending a NUL terminator
    /// and recording an index line.
    pub fn write_end(&mut self, key: u32, data_path: &Path) -> StoreResult<()> {
        let length = self.pending.len() as u64;
        self.data
            .write_all(&self.pending)
            .map_err(|e| io_err(data_path, e))?;
        self.data
            .write_all(&[0u8])
            .map_err(|e| io_err(data_path, e))?;
        writeln!(self.index, "{key}\t{}\t{length}", self.offset)
            .map_err(|e| io_err(&index_path_for(data_path), e))?;
        self.offset += length + 1;
        self.pending.clear();
        Ok(())
    }

    pub fn flush(&mut self, data_path: &Path) -> StoreResult<()> {
        self.data.flush().map_err(|e| io_err(data_path, e))?;
        self.index
            .flush()
            .map_err(|e| io_err(&index_path_for(data_path), e))?;
        Ok(())
    }
}

fn index_path_for(data_path: &Path) -> PathBuf {
    let mut p = data_path.to_path_buf();
    let mut name = p
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".index");
    p.set_file_name(name);
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_single_record() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("db");

        let mut writer = StoreWriter::create(&data_path).unwrap();
        writer.write_start();
        writer.write_add(b"hello world");
        writer.write_end(7, &data_path).unwrap();
        writer.flush(&data_path).unwrap();
        drop(writer);

        let reader = StoreReader::open(&data_path).unwrap();
        assert_eq!(reader.get(7).unwrap(), b"hello world");
        assert_eq!(reader.keys(), &[7]);
    }

    #[test]
    fn roundtrip_multiple_records_preserves_order_and_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("db");

        let mut writer = StoreWriter::create(&data_path).unwrap();
        for (key, body) in [(1u32, "alpha"), (2, "beta"), (3, "gamma-longer-record")] {
            writer.write_start();
            writer.write_add(body.as_bytes());
            writer.write_end(key, &data_path).unwrap();
        }
        writer.flush(&data_path).unwrap();
        drop(writer);

        let reader = StoreReader::open(&data_path).unwrap();
        assert_eq!(reader.keys(), &[1, 2, 3]);
        assert_eq!(reader.get_str(1).unwrap(), "alpha");
        assert_eq!(reader.get_str(2).unwrap(), "beta");
        assert_eq!(reader.get_str(3).unwrap(), "gamma-longer-record");
    }

    #[test]
    fn missing_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("db");
        let mut writer = StoreWriter::create(&data_path).unwrap();
        writer.write_start();
        writer.write_add(b"x");
        writer.write_end(1, &data_path).unwrap();
        writer.flush(&data_path).unwrap();
        drop(writer);

        let reader = StoreReader::open(&data_path).unwrap();
        assert!(matches!(reader.get(99), Err(StoreError::KeyNotFound(99))));
    }
}

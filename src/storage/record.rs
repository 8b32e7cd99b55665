//! Fixed-size record files
//!
//! A tree file is a header followed by an array of equally sized record
//! slots. The record for node pointer `p` lives at
//! `header_size + p * record_size`. Slot 0 is never a node (0 is the null
//! pointer), so layouts are free to keep bookkeeping there.
//!
//! Writes go to `<path>.tmp` and are renamed over `path` on commit; a writer
//! dropped before `commit` removes its temp file and leaves `path` untouched.

use crate::config::SyncMode;
use crate::tree::NodePointer;
use crate::{Result, TreeError};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Little-endian u64 at `offset`
pub(crate) fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Little-endian u64 at `offset`
pub(crate) fn get_u64(buf: &[u8], offset: usize) -> Result<u64> {
    buf.get(offset..offset + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| TreeError::Corruption(format!("record too short for u64 at {}", offset)))
}

/// Geometry of a record file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    pub header_size: u64,
    pub record_size: u64,
}

impl RecordLayout {
    pub fn new(header_size: u64, record_size: u64) -> Self {
        Self { header_size, record_size }
    }

    /// Byte offset of the slot for `pointer`
    pub fn offset(&self, pointer: NodePointer) -> Result<u64> {
        pointer
            .checked_mul(self.record_size)
            .and_then(|o| o.checked_add(self.header_size))
            .ok_or_else(|| TreeError::Corruption(format!("node pointer {} out of range", pointer)))
    }

    /// Node pointer of the slot starting at `offset`
    pub fn pointer_at(&self, offset: u64) -> Result<NodePointer> {
        let body = offset
            .checked_sub(self.header_size)
            .filter(|b| self.record_size > 0 && b % self.record_size == 0)
            .ok_or_else(|| TreeError::Corruption(format!("offset {} is not a slot boundary", offset)))?;
        Ok(body / self.record_size)
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// fsync the directory holding `path` so the rename is durable
fn sync_parent_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let dir = File::open(dir)?;
        let rc = unsafe { libc::fsync(dir.as_raw_fd()) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
    }

    #[cfg(not(unix))]
    {
        File::open(path)?.sync_all()?;
    }

    Ok(())
}

/// Writes header and records into a temp file, then renames it into place
pub struct RecordWriter {
    writer: BufWriter<File>,
    layout: RecordLayout,
    path: PathBuf,
    temp_path: PathBuf,
    sync: SyncMode,
    committed: bool,
}

impl RecordWriter {
    pub fn create(path: &Path, layout: RecordLayout, sync: SyncMode) -> Result<Self> {
        let temp_path = temp_path_for(path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;

        Ok(Self {
            writer: BufWriter::new(file),
            layout,
            path: path.to_path_buf(),
            temp_path,
            sync,
            committed: false,
        })
    }

    /// Header bytes at offset 0
    pub fn header_writer(&mut self) -> Result<&mut BufWriter<File>> {
        self.writer.seek(SeekFrom::Start(0))?;
        Ok(&mut self.writer)
    }

    /// Overwrite slot `pointer` with `record` (exactly `record_size` bytes)
    pub fn write_record(&mut self, pointer: NodePointer, record: &[u8]) -> Result<()> {
        if record.len() as u64 != self.layout.record_size {
            return Err(TreeError::PayloadSize {
                expected: self.layout.record_size as usize,
                actual: record.len(),
            });
        }
        let offset = self.layout.offset(pointer)?;
        self.writer.seek(SeekFrom::Start(offset))?;
        self.writer.write_all(record)?;
        Ok(())
    }

    /// Flush, fsync if requested, and atomically replace the target file
    pub fn commit(mut self) -> Result<()> {
        self.writer.flush()?;
        if self.sync.requires_sync() {
            self.writer.get_ref().sync_all()?;
        }

        fs::rename(&self.temp_path, &self.path)?;
        self.committed = true;

        if self.sync.requires_sync() {
            sync_parent_dir(&self.path)?;
        }
        Ok(())
    }
}

impl Drop for RecordWriter {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

/// Random access to the slots of a record file
pub struct RecordReader {
    reader: BufReader<File>,
    layout: RecordLayout,
    file_len: u64,
    path: PathBuf,
}

impl RecordReader {
    /// Open `path`; the caller reads the header through `header_reader`
    /// before calling `set_record_size`.
    pub fn open(path: &Path, header_size: u64) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        if file_len < header_size {
            return Err(TreeError::CorruptedFile(path.to_path_buf()));
        }
        Ok(Self {
            reader: BufReader::new(file),
            layout: RecordLayout::new(header_size, 0),
            file_len,
            path: path.to_path_buf(),
        })
    }

    pub fn header_reader(&mut self) -> Result<&mut BufReader<File>> {
        self.reader.seek(SeekFrom::Start(0))?;
        Ok(&mut self.reader)
    }

    pub fn set_record_size(&mut self, record_size: u64) -> Result<()> {
        if record_size == 0 {
            return Err(TreeError::Corruption("record size is zero".into()));
        }
        self.layout.record_size = record_size;
        Ok(())
    }

    /// Position the cursor at the slot for `pointer`
    pub fn seek_record(&mut self, pointer: NodePointer) -> Result<()> {
        let offset = self.layout.offset(pointer)?;
        let beyond_end = offset
            .checked_add(self.layout.record_size)
            .map_or(true, |end| end > self.file_len);
        if beyond_end {
            return Err(TreeError::Corruption(format!(
                "node pointer {} lies beyond end of {}",
                pointer,
                self.path.display()
            )));
        }
        self.reader.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Node pointer of the slot under the cursor
    pub fn cursor_pointer(&mut self) -> Result<NodePointer> {
        let position = self.reader.stream_position()?;
        self.layout.pointer_at(position)
    }

    /// Read the slot under the cursor into `buf` (exactly `record_size` bytes)
    pub fn read_record(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.len() as u64 != self.layout.record_size {
            return Err(TreeError::PayloadSize {
                expected: self.layout.record_size as usize,
                actual: buf.len(),
            });
        }
        self.reader.read_exact(buf)?;
        Ok(())
    }
}

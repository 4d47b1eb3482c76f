//! Class databases: one memory-mapped file per class.
//!
//! A class file is a fixed-size open-addressed hash table of feature
//! buckets behind a small header. The header occupies exactly
//! [`HEADER_BUCKETS`] bucket-sized slots (about 4 KiB) so the bucket
//! array starts on a record boundary.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::slice;

use byteorder::{LittleEndian, WriteBytesExt};
use log::trace;
use memmap2::{Mmap, MmapMut};

use crate::error::{OsbfError, Result};

pub(crate) mod lock;
mod table;

pub(crate) use table::Probe;

/// Database format version ("OSBF-Bayes").
pub(crate) const DB_VERSION: u32 = 5;

/// Bytes per bucket record.
pub(crate) const BUCKET_SIZE: usize = mem::size_of::<Bucket>();

/// Header size expressed in bucket-size units.
pub(crate) const HEADER_BUCKETS: u32 = (4096 / BUCKET_SIZE) as u32;

/// Header size in bytes; the bucket array starts here.
pub(crate) const HEADER_BYTES: usize = HEADER_BUCKETS as usize * BUCKET_SIZE;

/// Occurrence counts saturate here; a zero value marks an empty slot.
pub(crate) const MAX_BUCKET_VALUE: u32 = 65535;

/// Classic sparse-spectrum file length, a reasonable default for
/// [`crate::create_db`].
pub const DEFAULT_NUM_BUCKETS: u32 = 94321;

/// Slot is reinforced training data; microgroom preserves it when it can
/// and learn will not increment it again within the same document.
pub(crate) const FLAG_LOCKED: u8 = 0x80;
/// Slot is logically vacated; only set transiently inside grooming.
pub(crate) const FLAG_FREE: u8 = 0x40;
/// Feature behind this slot was already counted for the current document.
pub(crate) const FLAG_SEEN: u8 = 0x01;

/// One feature bucket. `value == 0` means the slot is empty, which is
/// what terminates probe chains.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Bucket {
    pub hash: u32,
    pub key: u32,
    pub value: u32,
}

/// Persisted class header. Field order is the on-disk layout.
#[repr(C)]
#[derive(Debug)]
pub(crate) struct Header {
    pub version: u32,
    pub db_flags: u32,
    pub buckets_start: u32,
    pub num_buckets: u32,
    pub learnings: u32,
    pub mistakes: u32,
    pub classifications: u64,
    pub extra_learnings: u32,
}

/// Header bytes that carry data (the rest of [`HEADER_BYTES`] is zero
/// padding).
pub(crate) const HEADER_STRUCT_BYTES: usize = mem::size_of::<Header>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenMode {
    ReadOnly,
    ReadWrite,
}

enum Map {
    Ro(Mmap),
    Rw(MmapMut),
}

impl Map {
    #[inline]
    fn bytes(&self) -> &[u8] {
        match self {
            Map::Ro(m) => m,
            Map::Rw(m) => m,
        }
    }

    #[inline]
    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Map::Rw(m) => m,
            Map::Ro(_) => unreachable!("write access to a read-only class"),
        }
    }
}

/// Open handle to a class database.
///
/// The handle exclusively owns its mapping and flag array; the flags are
/// never persisted. The trailing counters only carry meaning while a
/// classification is running.
pub(crate) struct Class {
    path: PathBuf,
    file: File,
    mode: OpenMode,
    map: Map,
    num_buckets: u32,
    bflags: Vec<u8>,
    locked: bool,
    closed: bool,
    /// Hits the current feature got in this class.
    pub(crate) hits: f64,
    pub(crate) totalhits: u32,
    pub(crate) uniquefeatures: u32,
    pub(crate) missedfeatures: u32,
    /// Learnings count used for probability math, bumped to at least 1.
    pub(crate) learnings: u32,
}

impl Class {
    /// Opens and maps an existing class file, write-locking it first in
    /// read-write mode.
    pub(crate) fn open(path: &Path, mode: OpenMode) -> Result<Class> {
        let meta =
            std::fs::metadata(path).map_err(|_| OsbfError::FileNotFound(path.to_owned()))?;
        let fsize = meta.len();
        if fsize < HEADER_BYTES as u64 {
            return Err(OsbfError::format(path, "file too short for a class header"));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(mode == OpenMode::ReadWrite)
            .open(path)
            .map_err(|e| OsbfError::io(path, e))?;

        Self::validate_header(&mut file, path, fsize)?;

        if mode == OpenMode::ReadWrite {
            lock::acquire(&file, 0, 0).map_err(|e| OsbfError::io(path, e))?;
        }

        let map = match Self::map_file(&file, mode) {
            Ok(map) => map,
            Err(e) => {
                if mode == OpenMode::ReadWrite {
                    let _ = lock::release(&file, 0, 0);
                }
                return Err(OsbfError::io(path, e));
            }
        };

        let mut class = Class {
            path: path.to_owned(),
            file,
            mode,
            map,
            num_buckets: 0,
            bflags: Vec::new(),
            locked: mode == OpenMode::ReadWrite,
            closed: false,
            hits: 0.0,
            totalhits: 0,
            uniquefeatures: 0,
            missedfeatures: 0,
            learnings: 0,
        };
        class.num_buckets = class.header().num_buckets;
        class.bflags = vec![0u8; class.num_buckets as usize];
        trace!("opened class {:?} ({:?})", class.path, mode);
        Ok(class)
    }

    fn map_file(file: &File, mode: OpenMode) -> io::Result<Map> {
        unsafe {
            match mode {
                OpenMode::ReadOnly => Ok(Map::Ro(Mmap::map(file)?)),
                OpenMode::ReadWrite => Ok(Map::Rw(MmapMut::map_mut(file)?)),
            }
        }
    }

    fn validate_header(file: &mut File, path: &Path, fsize: u64) -> Result<()> {
        use byteorder::ReadBytesExt;

        file.seek(SeekFrom::Start(0)).map_err(|e| OsbfError::io(path, e))?;
        let version = file
            .read_u32::<LittleEndian>()
            .map_err(|e| OsbfError::io(path, e))?;
        let db_flags = file
            .read_u32::<LittleEndian>()
            .map_err(|e| OsbfError::io(path, e))?;
        let buckets_start = file
            .read_u32::<LittleEndian>()
            .map_err(|e| OsbfError::io(path, e))?;
        let num_buckets = file
            .read_u32::<LittleEndian>()
            .map_err(|e| OsbfError::io(path, e))?;

        if version != DB_VERSION || db_flags != 0 {
            return Err(OsbfError::format(path, "wrong version or flags"));
        }
        if buckets_start != HEADER_BUCKETS || num_buckets == 0 {
            return Err(OsbfError::format(path, "corrupt header geometry"));
        }
        let expected = (u64::from(buckets_start) + u64::from(num_buckets)) * BUCKET_SIZE as u64;
        if fsize != expected {
            return Err(OsbfError::format(
                path,
                format!("file size {} does not match geometry ({})", fsize, expected),
            ));
        }
        file.seek(SeekFrom::Start(0)).map_err(|e| OsbfError::io(path, e))?;
        Ok(())
    }

    /// Closes the class. A read-write handle flushes the mapping,
    /// rewrites the first header bytes to refresh the mtime and drops
    /// the advisory lock.
    pub(crate) fn close(mut self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Map::Rw(m) = &self.map {
            m.flush().map_err(|e| OsbfError::io(&self.path, e))?;
        }
        if self.mode == OpenMode::ReadWrite {
            self.touch()?;
        }
        if self.locked {
            lock::release(&self.file, 0, 0).map_err(|e| OsbfError::io(&self.path, e))?;
            self.locked = false;
        }
        trace!("closed class {:?}", self.path);
        Ok(())
    }

    /// No-op rewrite of the header bytes so the mtime reflects training.
    fn touch(&mut self) -> Result<()> {
        let mut head = [0u8; HEADER_STRUCT_BYTES];
        let result = (|| {
            self.file.seek(SeekFrom::Start(0))?;
            self.file.read_exact(&mut head)?;
            self.file.seek(SeekFrom::Start(0))?;
            self.file.write_all(&head)
        })();
        result.map_err(|e| OsbfError::io(&self.path, e))
    }

    /// Creates a zero-initialized class file. Fails if the path exists.
    pub(crate) fn create(path: &Path, num_buckets: u32) -> Result<()> {
        if num_buckets == 0 {
            return Err(OsbfError::InvalidArgument(
                "a class needs at least one bucket".into(),
            ));
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => OsbfError::AlreadyExists(path.to_owned()),
                _ => OsbfError::io(path, e),
            })?;

        let mut w = BufWriter::new(file);
        let io_err = |e| OsbfError::io(path, e);
        w.write_u32::<LittleEndian>(DB_VERSION).map_err(io_err)?;
        w.write_u32::<LittleEndian>(0).map_err(io_err)?; // db_flags
        w.write_u32::<LittleEndian>(HEADER_BUCKETS).map_err(io_err)?;
        w.write_u32::<LittleEndian>(num_buckets).map_err(io_err)?;
        w.write_u32::<LittleEndian>(0).map_err(io_err)?; // learnings
        w.write_u32::<LittleEndian>(0).map_err(io_err)?; // mistakes
        w.write_u64::<LittleEndian>(0).map_err(io_err)?; // classifications
        w.write_u32::<LittleEndian>(0).map_err(io_err)?; // extra_learnings
        w.write_u32::<LittleEndian>(0).map_err(io_err)?; // struct tail padding

        let padding = vec![0u8; HEADER_BYTES - HEADER_STRUCT_BYTES];
        w.write_all(&padding).map_err(io_err)?;

        let zeros = vec![0u8; 4096 * BUCKET_SIZE];
        let mut remaining = num_buckets as usize * BUCKET_SIZE;
        while remaining > 0 {
            let n = remaining.min(zeros.len());
            w.write_all(&zeros[..n]).map_err(io_err)?;
            remaining -= n;
        }
        w.flush().map_err(io_err)?;
        Ok(())
    }

    #[inline]
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub(crate) fn num_buckets(&self) -> u32 {
        self.num_buckets
    }

    #[inline]
    pub(crate) fn header(&self) -> &Header {
        // the open-time validation guarantees the mapping covers a header
        unsafe { &*(self.map.bytes().as_ptr() as *const Header) }
    }

    #[inline]
    pub(crate) fn header_mut(&mut self) -> &mut Header {
        unsafe { &mut *(self.map.bytes_mut().as_mut_ptr() as *mut Header) }
    }

    #[inline]
    fn buckets(&self) -> &[Bucket] {
        let bytes = &self.map.bytes()[HEADER_BYTES..];
        unsafe {
            slice::from_raw_parts(bytes.as_ptr() as *const Bucket, self.num_buckets as usize)
        }
    }

    #[inline]
    fn buckets_mut(&mut self) -> &mut [Bucket] {
        let num = self.num_buckets as usize;
        let bytes = &mut self.map.bytes_mut()[HEADER_BYTES..];
        unsafe { slice::from_raw_parts_mut(bytes.as_mut_ptr() as *mut Bucket, num) }
    }

    #[inline]
    pub(crate) fn bucket(&self, i: u32) -> Bucket {
        self.buckets()[i as usize]
    }

    #[inline]
    pub(crate) fn set_bucket(&mut self, i: u32, bucket: Bucket) {
        self.buckets_mut()[i as usize] = bucket;
    }

    #[inline]
    pub(crate) fn value(&self, i: u32) -> u32 {
        self.buckets()[i as usize].value
    }

    #[inline]
    pub(crate) fn set_value(&mut self, i: u32, value: u32) {
        self.buckets_mut()[i as usize].value = value;
    }

    /// Writes a value and marks the slot as reinforced.
    #[inline]
    pub(crate) fn set_value_locked(&mut self, i: u32, value: u32) {
        self.set_value(i, value);
        self.lock_slot(i);
    }

    #[inline]
    pub(crate) fn is_locked(&self, i: u32) -> bool {
        self.bflags[i as usize] & FLAG_LOCKED != 0
    }

    #[inline]
    pub(crate) fn lock_slot(&mut self, i: u32) {
        self.bflags[i as usize] |= FLAG_LOCKED;
    }

    #[inline]
    pub(crate) fn is_free(&self, i: u32) -> bool {
        self.bflags[i as usize] & FLAG_FREE != 0
    }

    #[inline]
    pub(crate) fn mark_free(&mut self, i: u32) {
        self.bflags[i as usize] |= FLAG_FREE;
    }

    #[inline]
    pub(crate) fn clear_free(&mut self, i: u32) {
        self.bflags[i as usize] &= !FLAG_FREE;
    }

    #[inline]
    pub(crate) fn is_seen(&self, i: u32) -> bool {
        self.bflags[i as usize] & FLAG_SEEN != 0
    }

    #[inline]
    pub(crate) fn mark_seen(&mut self, i: u32) {
        self.bflags[i as usize] |= FLAG_SEEN;
    }

    #[inline]
    pub(crate) fn copy_flags(&mut self, from: u32, to: u32) {
        self.bflags[to as usize] = self.bflags[from as usize];
    }
}

impl Drop for Class {
    fn drop(&mut self) {
        let _ = self.close_inner();
    }
}

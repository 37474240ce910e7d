use std::fs::{File, OpenOptions};
use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use memmap2::{Mmap, MmapMut};

use crate::error::{EngineError, Result};
use crate::types::{AttrRecord, ByteEncodable};

/// A read-only memory map of one binary file.
///
/// Empty files are kept unmapped, since a zero-length mapping is rejected by some platforms;
/// they simply expose an empty byte slice.
#[derive(Debug)]
pub struct MappedFile {
    path: PathBuf,
    map: Option<Mmap>,
}

impl MappedFile {
    /// Opens and maps `path` read-only.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| EngineError::io(path, e))?;
        let length = file.metadata().map_err(|e| EngineError::io(path, e))?.len();
        let map = if length == 0 {
            None
        } else {
            // The engine never truncates its input files while a run holds them.
            Some(unsafe { Mmap::map(&file) }.map_err(|e| EngineError::io(path, e))?)
        };
        Ok(Self { path: path.to_path_buf(), map })
    }

    pub fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A typed, bounds-checked view of a file holding a flat array of fixed-size records.
#[derive(Debug)]
pub struct RecordArray<R> {
    file: MappedFile,
    len: usize,
    _marker: PhantomData<R>,
}

impl<R: ByteEncodable> RecordArray<R> {
    /// Maps `path` and checks that its size is a whole number of records.
    pub fn open(path: &Path) -> Result<Self> {
        let file = MappedFile::open(path)?;
        let byte_len = file.bytes().len();
        if byte_len % R::byte_size() != 0 {
            return Err(EngineError::format(
                path,
                format!("{} bytes is not a multiple of the {}-byte record", byte_len, R::byte_size()),
            ));
        }
        Ok(Self { file, len: byte_len / R::byte_size(), _marker: PhantomData })
    }

    /// Maps `path` and additionally requires exactly `expected` records.
    pub fn open_exact(path: &Path, expected: usize) -> Result<Self> {
        let array = Self::open(path)?;
        if array.len != expected {
            return Err(EngineError::format(
                path,
                format!("expected {} records, found {}", expected, array.len),
            ));
        }
        Ok(array)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Decodes the record at `idx`.
    ///
    /// # Panics
    /// If `idx` is out of range; callers derive indices from validated offsets.
    pub fn get(&self, idx: usize) -> R {
        assert!(idx < self.len, "record {} out of range in {}", idx, self.file.path().display());
        let size = R::byte_size();
        let start = idx * size;
        match R::from_bytes(&self.file.bytes()[start..start + size]) {
            Some(record) => record,
            None => unreachable!("slice has exactly one record"),
        }
    }

    /// Decodes every record in `range`.
    pub fn iter_range(&self, range: Range<usize>) -> impl Iterator<Item = R> + '_ {
        range.map(move |idx| self.get(idx))
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// A writable memory map of a flat array of attribute records.
///
/// This is the single arena behind both the segment view and the full view of the
/// attributes. Records are handed out as shared references; all mutation goes through the
/// atomic fields of the record type.
pub struct AttrArena<A: AttrRecord> {
    path: PathBuf,
    map: Option<MmapMut>,
    ptr: NonNull<A>,
    len: usize,
}

// The arena owns its mapping and only exposes `&A`, and `A: Sync` makes shared access safe.
unsafe impl<A: AttrRecord> Send for AttrArena<A> {}
unsafe impl<A: AttrRecord> Sync for AttrArena<A> {}

impl<A: AttrRecord> AttrArena<A> {
    /// Creates (or truncates) `path` to `len` zeroed records and maps it.
    pub fn create(path: &Path, len: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| EngineError::io(path, e))?;
        file.set_len((len * size_of::<A>()) as u64).map_err(|e| EngineError::io(path, e))?;
        Self::map(path, file, len)
    }

    /// Maps an existing attribute file, keeping its content as the seed of the next run.
    pub fn open(path: &Path, len: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| EngineError::io(path, e))?;
        let byte_len = file.metadata().map_err(|e| EngineError::io(path, e))?.len();
        if byte_len != (len * size_of::<A>()) as u64 {
            return Err(EngineError::format(
                path,
                format!("expected {} attribute records of {} bytes, file has {} bytes", len, size_of::<A>(), byte_len),
            ));
        }
        Self::map(path, file, len)
    }

    fn map(path: &Path, file: File, len: usize) -> Result<Self> {
        if len == 0 || size_of::<A>() == 0 {
            return Ok(Self { path: path.to_path_buf(), map: None, ptr: NonNull::dangling(), len });
        }
        let mut map = unsafe { MmapMut::map_mut(&file) }.map_err(|e| EngineError::io(path, e))?;
        let raw = map.as_mut_ptr() as *mut A;
        if (raw as usize) % align_of::<A>() != 0 {
            return Err(EngineError::format(path, "attribute map is not aligned for the record type"));
        }
        let ptr = NonNull::new(raw).ok_or_else(|| EngineError::format(path, "null attribute map"))?;
        Ok(Self { path: path.to_path_buf(), map: Some(map), ptr, len })
    }

    /// The full view: every record of the arena.
    pub fn records(&self) -> &[A] {
        // `ptr` points at `len` initialized records for as long as `map` lives; any bit
        // pattern is a valid `A` per the `AttrRecord` contract.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const A, self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes dirty pages back to the attribute file.
    pub fn flush(&self) -> Result<()> {
        match &self.map {
            Some(map) => map.flush().map_err(|e| EngineError::io(&self.path, e)),
            None => Ok(()),
        }
    }
}

//! Blocking heap file I/O.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use mira_common::types::PageId;
use parking_lot::Mutex;
use tracing::debug;

use super::error::{HeapError, HeapResult};
use super::header::HeapHeader;

/// A paged backing file.
///
/// Page ids are issued densely from 0 upward; page `i` lives at offset
/// `header_size + i * page_size`. The header region is one full page so
/// slots stay block-aligned. All operations serialize on one internal
/// mutex; writes are not fsync'd (durability stops at OS buffers unless
/// [`HeapFile::sync`] is called).
pub struct HeapFile {
    /// File path, kept for error context.
    path: PathBuf,
    /// Size of one page slot in bytes.
    page_size: usize,
    /// Byte offset of page 0.
    header_size: u64,
    /// The backing file; this mutex is the file mutex and is the
    /// innermost lock in the system.
    file: Mutex<File>,
    /// Mirror of the persisted page count, so bounds checks never take
    /// the file mutex.
    page_count: AtomicU32,
}

impl HeapFile {
    /// Opens a heap file, creating and initializing it if `create` is
    /// set (an existing file is truncated in that case).
    pub fn open(path: impl AsRef<Path>, create: bool, page_size: usize) -> HeapResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if create {
            options.create(true).truncate(true);
        }
        let mut file = options.open(&path).map_err(|source| HeapError::Open {
            path: path.clone(),
            source,
        })?;

        let header_size = page_size as u64;
        let header = if create {
            let header = HeapHeader::empty();
            Self::write_header_to(&mut file, &path, &header)?;
            file.set_len(header_size)
                .map_err(|e| HeapError::io(&path, 0, e))?;
            debug!(path = %path.display(), page_size, "created heap file");
            header
        } else {
            Self::read_header_from(&mut file, &path)?
        };

        Ok(Self {
            path,
            page_size,
            header_size,
            file: Mutex::new(file),
            page_count: AtomicU32::new(header.page_count),
        })
    }

    /// Returns the page size this file was opened with.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the file path.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of allocated pages.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.page_count.load(Ordering::Acquire)
    }

    /// Returns true if `id` names an allocated page.
    #[inline]
    pub fn contains(&self, id: PageId) -> bool {
        id.as_u32() < self.page_count()
    }

    /// Allocates a new page slot and returns its id.
    ///
    /// The persisted page count is bumped and the file is extended by
    /// one zeroed slot, so a subsequent read of the new page yields
    /// zeroes.
    pub fn new_page_id(&self) -> HeapResult<PageId> {
        let mut file = self.file.lock();

        let id = self.page_count.load(Ordering::Acquire);
        let new_count = id + 1;

        let header = HeapHeader {
            page_count: new_count,
        };
        Self::write_header_to(&mut file, &self.path, &header)?;
        file.set_len(self.header_size + u64::from(new_count) * self.page_size as u64)
            .map_err(|e| HeapError::io(&self.path, 0, e))?;

        self.page_count.store(new_count, Ordering::Release);
        Ok(PageId::new(id))
    }

    /// Pre-allocates slots so the file holds at least `num_pages` pages.
    pub fn initialize(&self, num_pages: u32) -> HeapResult<()> {
        let mut file = self.file.lock();

        if num_pages <= self.page_count.load(Ordering::Acquire) {
            return Ok(());
        }

        let header = HeapHeader {
            page_count: num_pages,
        };
        Self::write_header_to(&mut file, &self.path, &header)?;
        file.set_len(self.header_size + u64::from(num_pages) * self.page_size as u64)
            .map_err(|e| HeapError::io(&self.path, 0, e))?;

        self.page_count.store(num_pages, Ordering::Release);
        Ok(())
    }

    /// Reads page `id` into `buf`.
    ///
    /// `buf` must be exactly one page long. The caller must hold a lock
    /// proving exclusive access to the destination buffer.
    pub fn read_page(&self, id: PageId, buf: &mut [u8]) -> HeapResult<()> {
        self.check_access(id, buf.len())?;

        let offset = self.offset_of(id);
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| HeapError::io(&self.path, offset, e))?;

        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(HeapError::ShortIo {
                        operation: "read",
                        path: self.path.clone(),
                        expected: buf.len(),
                        actual: filled,
                    })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HeapError::io(&self.path, offset, e)),
            }
        }
        Ok(())
    }

    /// Writes `buf` to page `id`.
    ///
    /// `buf` must be exactly one page long. The caller must hold a lock
    /// proving the buffer is stable for the duration of the write.
    pub fn write_page(&self, id: PageId, buf: &[u8]) -> HeapResult<()> {
        self.check_access(id, buf.len())?;

        let offset = self.offset_of(id);
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| HeapError::io(&self.path, offset, e))?;
        file.write_all(buf)
            .map_err(|e| HeapError::io(&self.path, offset, e))?;
        Ok(())
    }

    /// Flushes OS buffers to stable storage.
    pub fn sync(&self) -> HeapResult<()> {
        let file = self.file.lock();
        file.sync_all().map_err(|e| HeapError::io(&self.path, 0, e))
    }

    fn offset_of(&self, id: PageId) -> u64 {
        self.header_size + u64::from(id.as_u32()) * self.page_size as u64
    }

    fn check_access(&self, id: PageId, buf_len: usize) -> HeapResult<()> {
        if buf_len != self.page_size {
            return Err(HeapError::BufferSizeMismatch {
                expected: self.page_size,
                actual: buf_len,
            });
        }
        let count = self.page_count();
        if id.as_u32() >= count {
            return Err(HeapError::out_of_bounds(id, count));
        }
        Ok(())
    }

    fn write_header_to(file: &mut File, path: &Path, header: &HeapHeader) -> HeapResult<()> {
        file.seek(SeekFrom::Start(0))
            .map_err(|e| HeapError::io(path, 0, e))?;
        file.write_all(&header.to_bytes())
            .map_err(|e| HeapError::io(path, 0, e))?;
        Ok(())
    }

    fn read_header_from(file: &mut File, path: &Path) -> HeapResult<HeapHeader> {
        let len = file
            .metadata()
            .map_err(|e| HeapError::io(path, 0, e))?
            .len();
        if len < HeapHeader::SIZE as u64 {
            return Err(HeapError::TruncatedHeader {
                path: path.to_path_buf(),
                len,
            });
        }

        file.seek(SeekFrom::Start(0))
            .map_err(|e| HeapError::io(path, 0, e))?;
        let mut bytes = [0u8; HeapHeader::SIZE];
        file.read_exact(&mut bytes)
            .map_err(|e| HeapError::io(path, 0, e))?;
        HeapHeader::from_bytes(&bytes, path)
    }
}

impl std::fmt::Debug for HeapFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapFile")
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .field("page_count", &self.page_count())
            .finish()
    }
}

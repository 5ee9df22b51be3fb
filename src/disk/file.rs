//! File-backed disk manager.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{DiskError, DiskManager};
use crate::page::{PageId, PAGE_SIZE};

/// Single-file page store.
///
/// Page `n` occupies bytes `[n * PAGE_SIZE, (n + 1) * PAGE_SIZE)`.
/// Allocation extends the file with zeros up to the end of the
/// allocated page, so under a federation (where one instance mints ids
/// `i, i + n, i + 2n, ...`) the intervening offsets belong to sibling
/// instances and read as zeros until they are written.
///
/// # File layout
///
/// ```text
/// +------------------+------------------+------------------+
/// | page 0 (4KB)     | page 1 (4KB)     | page 2 (4KB)     | ...
/// +------------------+------------------+------------------+
/// ^ offset 0         ^ offset 4096      ^ offset 8192
/// ```
///
/// A mutex serializes the seek-then-transfer pairs on the shared file
/// handle. Durability is explicit: writes reach the OS; `sync_all`
/// reaches the disk.
pub struct FileDisk {
    path: PathBuf,
    file: Mutex<File>,
    /// Current file length in bytes, kept in sync with the handle.
    len: AtomicU64,
}

impl FileDisk {
    /// Opens or creates the store at `path`.
    ///
    /// # Errors
    ///
    /// `DiskError::Corrupted` if an existing file's size is not a
    /// multiple of the page size; `DiskError::Io` on open failure.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DiskError> {
        let path = path.into();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let len = file.metadata()?.len();
        if len % PAGE_SIZE as u64 != 0 {
            return Err(DiskError::Corrupted(format!(
                "file size {} is not a multiple of page size {}",
                len, PAGE_SIZE
            )));
        }

        Ok(Self {
            path,
            file: Mutex::new(file),
            len: AtomicU64::new(len),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of page slots the file currently spans.
    pub fn page_count(&self) -> usize {
        (self.len.load(Ordering::Acquire) / PAGE_SIZE as u64) as usize
    }

    fn check_bounds(&self, page_id: PageId, buf_len: usize) -> Result<(), DiskError> {
        if buf_len != PAGE_SIZE {
            return Err(DiskError::BufferLength {
                expected: PAGE_SIZE,
                actual: buf_len,
            });
        }
        let end = page_id.byte_offset() + PAGE_SIZE as u64;
        if end > self.len.load(Ordering::Acquire) {
            return Err(DiskError::PageNotFound(page_id));
        }
        Ok(())
    }
}

impl DiskManager for FileDisk {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), DiskError> {
        self.check_bounds(page_id, buf.len())?;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id.byte_offset()))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), DiskError> {
        self.check_bounds(page_id, buf.len())?;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id.byte_offset()))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn allocate_page(&self, page_id: PageId) -> Result<(), DiskError> {
        let end = page_id.byte_offset() + PAGE_SIZE as u64;

        let file = self.file.lock();
        if end > self.len.load(Ordering::Acquire) {
            file.set_len(end)?;
            self.len.store(end, Ordering::Release);
        }
        Ok(())
    }

    fn sync_all(&self) -> Result<(), DiskError> {
        let file = self.file.lock();
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_temp() -> (tempfile::TempDir, FileDisk) {
        let dir = tempdir().unwrap();
        let disk = FileDisk::open(dir.path().join("pages.db")).unwrap();
        (dir, disk)
    }

    #[test]
    fn test_allocate_extends_and_reads_zeros() {
        let (_dir, disk) = open_temp();
        assert_eq!(disk.page_count(), 0);

        disk.allocate_page(PageId::new(2)).unwrap();
        assert_eq!(disk.page_count(), 3);

        // Both the allocated page and the hole before it read as zeros.
        let mut buf = vec![0xffu8; PAGE_SIZE];
        disk.read_page(PageId::new(2), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
        disk.read_page(PageId::new(0), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (_dir, disk) = open_temp();
        disk.allocate_page(PageId::new(1)).unwrap();

        let mut buf = vec![0u8; PAGE_SIZE];
        buf[0] = 0xab;
        buf[PAGE_SIZE - 1] = 0xcd;
        disk.write_page(PageId::new(1), &buf).unwrap();

        let mut read_buf = vec![0u8; PAGE_SIZE];
        disk.read_page(PageId::new(1), &mut read_buf).unwrap();
        assert_eq!(read_buf, buf);
    }

    #[test]
    fn test_out_of_bounds_page_not_found() {
        let (_dir, disk) = open_temp();
        disk.allocate_page(PageId::new(0)).unwrap();

        let mut buf = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            disk.read_page(PageId::new(1), &mut buf),
            Err(DiskError::PageNotFound(_))
        ));
    }

    #[test]
    fn test_reopen_preserves_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.db");

        {
            let disk = FileDisk::open(&path).unwrap();
            disk.allocate_page(PageId::new(0)).unwrap();
            let mut buf = vec![0u8; PAGE_SIZE];
            buf[7] = 7;
            disk.write_page(PageId::new(0), &buf).unwrap();
            disk.sync_all().unwrap();
        }

        let disk = FileDisk::open(&path).unwrap();
        assert_eq!(disk.page_count(), 1);
        let mut buf = vec![0u8; PAGE_SIZE];
        disk.read_page(PageId::new(0), &mut buf).unwrap();
        assert_eq!(buf[7], 7);
    }

    #[test]
    fn test_open_rejects_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("torn.db");
        std::fs::write(&path, vec![0u8; PAGE_SIZE + 1]).unwrap();

        assert!(matches!(
            FileDisk::open(&path),
            Err(DiskError::Corrupted(_))
        ));
    }
}

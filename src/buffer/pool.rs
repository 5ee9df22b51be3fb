//! The buffer pool federation: hash-partitioned instances behind one
//! interface.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::error::BufferError;
use super::guard::{PageReadGuard, PageWriteGuard};
use super::instance::BufferPoolInstance;
use super::replacer::{LruReplacer, Replacer};
use crate::disk::DiskManager;
use crate::page::PageId;

/// Construction parameters for a [`BufferPool`].
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Frames per instance. Total capacity is
    /// `pool_size * num_instances` pages.
    pub pool_size: usize,

    /// Number of instances in the federation. Operations on distinct
    /// instances run fully in parallel; page ids are partitioned by
    /// `page_num % num_instances`.
    pub num_instances: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            // 1024 * 4KB = 4MB per instance.
            pool_size: 1024,
            num_instances: 1,
        }
    }
}

/// A federation of buffer pool instances presenting a unified cache.
///
/// Every operation that takes a [`PageId`] routes to the instance
/// owning that id's residue class; [`new_page`](Self::new_page)
/// round-robins across instances so allocations spread evenly. The
/// pool itself holds no lock: all serialization happens inside the
/// individual instances.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use pagepool::buffer::{BufferPool, BufferPoolConfig};
/// use pagepool::disk::MemoryDisk;
///
/// let pool = BufferPool::new(
///     BufferPoolConfig { pool_size: 8, num_instances: 2 },
///     Arc::new(MemoryDisk::new()),
/// );
///
/// let page_id = {
///     let mut guard = pool.new_page().unwrap();
///     guard[0] = 42;
///     guard.page_id()
/// };
///
/// let guard = pool.fetch_page_read(page_id).unwrap();
/// assert_eq!(guard[0], 42);
/// ```
pub struct BufferPool<D: DiskManager> {
    instances: Vec<BufferPoolInstance<D>>,

    /// Round-robin cursor for `new_page`.
    next_instance: AtomicUsize,
}

impl<D: DiskManager> BufferPool<D> {
    /// Creates a federation with LRU replacement in every instance.
    ///
    /// # Panics
    ///
    /// Panics if `pool_size` or `num_instances` is 0.
    pub fn new(config: BufferPoolConfig, disk: Arc<D>) -> Self {
        Self::with_replacer_factory(config, disk, |num_pages| {
            Box::new(LruReplacer::with_capacity(num_pages))
        })
    }

    /// Creates a federation whose instances use replacers built by
    /// `factory` (called once per instance with the frame count).
    pub fn with_replacer_factory<F>(config: BufferPoolConfig, disk: Arc<D>, factory: F) -> Self
    where
        F: Fn(usize) -> Box<dyn Replacer>,
    {
        assert!(config.num_instances > 0, "num_instances must be > 0");

        let instances = (0..config.num_instances)
            .map(|i| {
                BufferPoolInstance::with_replacer(
                    config.pool_size,
                    config.num_instances,
                    i,
                    Arc::clone(&disk),
                    factory(config.pool_size),
                )
            })
            .collect();

        Self {
            instances,
            next_instance: AtomicUsize::new(0),
        }
    }

    /// Number of instances in the federation.
    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// Total frame count across all instances.
    pub fn pool_size(&self) -> usize {
        self.instances.iter().map(|i| i.pool_size()).sum()
    }

    /// Total resident pages across all instances.
    pub fn page_count(&self) -> usize {
        self.instances.iter().map(|i| i.page_count()).sum()
    }

    fn owner(&self, page_id: PageId) -> &BufferPoolInstance<D> {
        let idx = (page_id.page_num() % self.instances.len() as u64) as usize;
        &self.instances[idx]
    }

    /// Mints a new page on some instance, starting at the round-robin
    /// cursor and consulting each instance at most once.
    ///
    /// # Errors
    ///
    /// [`BufferError::PoolExhausted`] once every instance reports
    /// exhaustion; disk errors propagate immediately.
    pub fn new_page(&self) -> Result<PageWriteGuard<'_, D>, BufferError> {
        let n = self.instances.len();
        let start = self.next_instance.fetch_add(1, Ordering::Relaxed) % n;

        for i in 0..n {
            match self.instances[(start + i) % n].new_page() {
                Err(BufferError::PoolExhausted) => continue,
                other => return other,
            }
        }
        Err(BufferError::PoolExhausted)
    }

    /// Fetches a page for reading from its owning instance.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_, D>, BufferError> {
        self.owner(page_id).fetch_page_read(page_id)
    }

    /// Fetches a page for writing from its owning instance.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_, D>, BufferError> {
        self.owner(page_id).fetch_page_write(page_id)
    }

    /// Releases one pin; see
    /// [`BufferPoolInstance::unpin_page`].
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.owner(page_id).unpin_page(page_id, is_dirty)
    }

    /// Writes one page back if dirty; see
    /// [`BufferPoolInstance::flush_page`].
    pub fn flush_page(&self, page_id: PageId) -> Result<bool, BufferError> {
        self.owner(page_id).flush_page(page_id)
    }

    /// Flushes every instance. No ordering across pages or instances.
    pub fn flush_all_pages(&self) -> Result<(), BufferError> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }

    /// Deletes a page from its owning instance; see
    /// [`BufferPoolInstance::delete_page`].
    pub fn delete_page(&self, page_id: PageId) -> Result<bool, BufferError> {
        self.owner(page_id).delete_page(page_id)
    }
}

//! One buffer pool instance: a frame array, a page table, a free list,
//! a replacer, and a slice of the page-id space.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::BufferError;
use super::frame::{Frame, FrameId, FrameMeta};
use super::guard::{PageReadGuard, PageWriteGuard};
use super::replacer::{LruReplacer, Replacer};
use crate::disk::DiskManager;
use crate::page::PageId;

/// One shard of the buffer pool.
///
/// The instance owns `pool_size` frames and caches pages in them on
/// demand. When every frame is occupied, the replacer picks the
/// least-recently-unpinned resident page for eviction; dirty pages are
/// written back before their frame is reused.
///
/// As part of a federation of `num_instances` siblings, the instance
/// also owns one residue class of the page-id space: every id it mints
/// satisfies `page_num % num_instances == instance_index`, starting at
/// `instance_index` and advancing by `num_instances`.
///
/// # Concurrency
///
/// One mutex guards the page table, frame metadata, free list,
/// replacer, and allocator cursor. Each frame's byte buffer has its own
/// `RwLock`, so holders of pinned pages access bytes without the state
/// lock, and disk transfers run outside it as well: a frame undergoing
/// a load, write-back, or delete is temporarily in neither the free
/// list nor the replacer, and the operation re-validates under the
/// state lock before committing.
///
/// Lock order: a frame data lock is only acquired while the state lock
/// is *not* held. Acquiring the state lock while holding a data lock is
/// the permitted direction (guards do this when they unpin on drop).
pub struct BufferPoolInstance<D: DiskManager> {
    disk: Arc<D>,
    frames: Vec<Frame>,
    state: Mutex<InstanceState>,
    pool_size: usize,
    num_instances: u64,
    instance_index: u64,
}

struct InstanceState {
    /// Maps each resident page to its frame. Exactly one entry per
    /// frame holding a valid page.
    page_table: HashMap<PageId, FrameId>,

    /// Per-frame bookkeeping, indexed by frame id.
    meta: Vec<FrameMeta>,

    /// Frames holding no page, available without eviction.
    free_list: VecDeque<FrameId>,

    /// Eviction candidates among resident frames.
    replacer: Box<dyn Replacer>,

    /// Next page number to mint; advances by `num_instances`.
    next_page_id: u64,
}

impl<D: DiskManager> BufferPoolInstance<D> {
    /// Creates a standalone instance (a federation of one).
    pub fn new(pool_size: usize, disk: Arc<D>) -> Self {
        Self::with_partition(pool_size, 1, 0, disk)
    }

    /// Creates instance `instance_index` of a federation of
    /// `num_instances`, with LRU replacement.
    ///
    /// # Panics
    ///
    /// Panics if `pool_size` or `num_instances` is 0, or if
    /// `instance_index` is out of range.
    pub fn with_partition(
        pool_size: usize,
        num_instances: usize,
        instance_index: usize,
        disk: Arc<D>,
    ) -> Self {
        Self::with_replacer(
            pool_size,
            num_instances,
            instance_index,
            disk,
            Box::new(LruReplacer::with_capacity(pool_size)),
        )
    }

    /// Like [`with_partition`](Self::with_partition), with a custom
    /// replacement policy.
    pub fn with_replacer(
        pool_size: usize,
        num_instances: usize,
        instance_index: usize,
        disk: Arc<D>,
        replacer: Box<dyn Replacer>,
    ) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");
        assert!(num_instances > 0, "num_instances must be > 0");
        assert!(
            instance_index < num_instances,
            "instance_index {} out of range for {} instances",
            instance_index,
            num_instances
        );

        let frames: Vec<_> = (0..pool_size).map(|_| Frame::new()).collect();
        let meta: Vec<_> = (0..pool_size).map(|_| FrameMeta::new()).collect();
        let free_list: VecDeque<_> = (0..pool_size).map(FrameId::new).collect();

        Self {
            disk,
            frames,
            state: Mutex::new(InstanceState {
                page_table: HashMap::with_capacity(pool_size),
                meta,
                free_list,
                replacer,
                next_page_id: instance_index as u64,
            }),
            pool_size,
            num_instances: num_instances as u64,
            instance_index: instance_index as u64,
        }
    }

    /// Number of frames this instance owns.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Index of this instance within its federation.
    pub fn instance_index(&self) -> usize {
        self.instance_index as usize
    }

    /// Number of pages currently resident.
    pub fn page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Pin count of `page_id`, or `None` if the page is not resident.
    /// Debugging aid; the value may be stale the moment it returns.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let frame_id = state.page_table.get(&page_id)?;
        Some(state.meta[frame_id.as_usize()].pin_count)
    }

    /// Mints a fresh page id, zeroes a frame for it, and returns the
    /// page pinned for writing.
    ///
    /// A frame is secured *before* an id is minted, so exhaustion does
    /// not burn ids.
    ///
    /// # Errors
    ///
    /// [`BufferError::PoolExhausted`] if every frame is pinned;
    /// [`BufferError::Disk`] if the disk allocation hook fails (the
    /// secured frame returns to the free list).
    pub fn new_page(&self) -> Result<PageWriteGuard<'_, D>, BufferError> {
        let frame_id = self.acquire_frame()?;

        let page_id = {
            let mut state = self.state.lock();
            let id = PageId::new(state.next_page_id);
            state.next_page_id += self.num_instances;
            debug_assert_eq!(
                id.page_num() % self.num_instances,
                self.instance_index,
                "minted id must fall in this instance's residue class"
            );
            id
        };

        if let Err(e) = self.disk.allocate_page(page_id) {
            self.state.lock().free_list.push_back(frame_id);
            return Err(e.into());
        }

        // No disk read for a fresh page; it starts as zeros.
        let mut data = self.frames[frame_id.as_usize()].data.write();
        data.zero();

        {
            let mut state = self.state.lock();
            state.page_table.insert(page_id, frame_id);
            state.meta[frame_id.as_usize()].reset(page_id);
            state.replacer.pin(frame_id);
        }

        Ok(PageWriteGuard::new(self, frame_id, page_id, data))
    }

    /// Fetches `page_id` pinned for reading, loading it from disk on a
    /// cache miss.
    ///
    /// # Errors
    ///
    /// [`BufferError::PoolExhausted`] if a miss finds every frame
    /// pinned; [`BufferError::Disk`] if the disk read fails (the
    /// secured frame returns to the free list and the page id is not
    /// registered).
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_, D>, BufferError> {
        let frame_id = self.pin_or_load(page_id)?;
        let data = self.frames[frame_id.as_usize()].data.read();
        Ok(PageReadGuard::new(self, frame_id, page_id, data))
    }

    /// Fetches `page_id` pinned for writing. Same loading and error
    /// behavior as [`fetch_page_read`](Self::fetch_page_read); blocks
    /// until no other guard holds the frame's bytes.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_, D>, BufferError> {
        let frame_id = self.pin_or_load(page_id)?;
        let data = self.frames[frame_id.as_usize()].data.write();
        Ok(PageWriteGuard::new(self, frame_id, page_id, data))
    }

    /// Releases one pin on `page_id`.
    ///
    /// Returns `false` if the page is not resident. Releasing a page
    /// whose pin count is already 0 is a no-op returning `true`.
    /// `is_dirty == true` marks the frame dirty; `false` never clears
    /// an earlier mark. When the count reaches 0 the frame becomes an
    /// eviction candidate.
    ///
    /// Guards release their pin on drop; this entry point exists for
    /// holders doing manual pin accounting.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.state.lock();
        let frame_id = match state.page_table.get(&page_id) {
            Some(&id) => id,
            None => return false,
        };
        Self::release_pin(&mut state, frame_id, is_dirty);
        true
    }

    /// Writes `page_id` back to disk if it is resident and dirty.
    ///
    /// Returns `false` if the page is not resident, `true` otherwise
    /// (including the clean no-op case). Pin state is unchanged, but
    /// the call blocks while a write guard holds the page's bytes, so
    /// a holder must not flush its own write-guarded page.
    ///
    /// # Errors
    ///
    /// [`BufferError::Disk`] if the write fails; the dirty flag is
    /// left set.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool, BufferError> {
        let frame_id = {
            let state = self.state.lock();
            match state.page_table.get(&page_id) {
                None => return Ok(false),
                Some(&id) => {
                    if !state.meta[id.as_usize()].is_dirty {
                        return Ok(true);
                    }
                    id
                }
            }
        };

        let data = self.frames[frame_id.as_usize()].data.read();

        // Re-validate under the data lock: if the page moved out of
        // this frame meanwhile, the eviction already wrote it, and the
        // frozen bytes under our read lock may belong to another page.
        {
            let state = self.state.lock();
            if state.page_table.get(&page_id) != Some(&frame_id) {
                return Ok(true);
            }
        }

        self.disk.write_page(page_id, data.as_slice())?;

        let mut state = self.state.lock();
        if state.page_table.get(&page_id) == Some(&frame_id) {
            state.meta[frame_id.as_usize()].is_dirty = false;
        }
        Ok(true)
    }

    /// Flushes every resident dirty page, then issues a durability
    /// barrier on the disk manager. No ordering across pages.
    ///
    /// # Errors
    ///
    /// The first failure is returned; later pages stay dirty.
    pub fn flush_all_pages(&self) -> Result<(), BufferError> {
        let pages: Vec<PageId> = {
            let state = self.state.lock();
            state.page_table.keys().copied().collect()
        };

        for page_id in pages {
            self.flush_page(page_id)?;
        }

        self.disk.sync_all()?;
        Ok(())
    }

    /// Drops `page_id` from the cache.
    ///
    /// Invokes the disk `deallocate_page` hook unconditionally.
    /// Returns `true` if the page is absent (delete is idempotent) or
    /// was removed; `false` if the page is pinned, in which case
    /// nothing changes.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool, BufferError> {
        self.disk.deallocate_page(page_id)?;

        let frame_id = {
            let mut state = self.state.lock();
            let frame_id = match state.page_table.get(&page_id) {
                None => return Ok(true),
                Some(&id) => id,
            };
            if state.meta[frame_id.as_usize()].is_pinned() {
                return Ok(false);
            }
            state.page_table.remove(&page_id);
            state.meta[frame_id.as_usize()].clear();
            state.replacer.pin(frame_id);
            frame_id
        };

        // Unmapped and unpinned: nobody else can claim the frame until
        // it reappears in the free list.
        self.frames[frame_id.as_usize()].data.write().zero();
        self.state.lock().free_list.push_back(frame_id);
        Ok(true)
    }

    /// Pin the resident frame for `page_id`, or claim a frame and load
    /// the page into it.
    fn pin_or_load(&self, page_id: PageId) -> Result<FrameId, BufferError> {
        {
            let mut state = self.state.lock();
            if let Some(frame_id) = state.page_table.get(&page_id).copied() {
                state.meta[frame_id.as_usize()].pin();
                state.replacer.pin(frame_id);
                return Ok(frame_id);
            }
        }

        let frame_id = self.acquire_frame()?;

        {
            let mut data = self.frames[frame_id.as_usize()].data.write();
            if let Err(e) = self.disk.read_page(page_id, data.as_mut_slice()) {
                drop(data);
                self.state.lock().free_list.push_back(frame_id);
                return Err(e.into());
            }
        }

        let mut state = self.state.lock();
        if let Some(winner) = state.page_table.get(&page_id).copied() {
            // Another thread loaded the page while we were reading.
            // Keep the winner's frame, give ours back.
            state.free_list.push_back(frame_id);
            state.meta[winner.as_usize()].pin();
            state.replacer.pin(winner);
            return Ok(winner);
        }
        state.page_table.insert(page_id, frame_id);
        state.meta[frame_id.as_usize()].reset(page_id);
        state.replacer.pin(frame_id);
        Ok(frame_id)
    }

    /// Claims a frame: free list first, then the replacer victim, with
    /// dirty write-back.
    ///
    /// The returned frame is in no structure at all (not in the free
    /// list, page table, or replacer) and has cleared metadata; the
    /// caller must register it or return it to the free list.
    fn acquire_frame(&self) -> Result<FrameId, BufferError> {
        loop {
            let (frame_id, old_page_id, dirty) = {
                let mut state = self.state.lock();
                if let Some(frame_id) = state.free_list.pop_front() {
                    return Ok(frame_id);
                }
                let frame_id = match state.replacer.victim() {
                    Some(id) => id,
                    None => return Err(BufferError::PoolExhausted),
                };
                let meta = &state.meta[frame_id.as_usize()];
                let old = meta.page_id.expect("replacer member holds a page");
                (frame_id, old, meta.is_dirty)
            };

            if dirty {
                let data = self.frames[frame_id.as_usize()].data.read();
                if let Err(e) = self.disk.write_page(old_page_id, data.as_slice()) {
                    drop(data);
                    let mut state = self.state.lock();
                    let meta = &state.meta[frame_id.as_usize()];
                    if meta.pin_count == 0 && meta.page_id == Some(old_page_id) {
                        state.replacer.unpin(frame_id);
                    }
                    return Err(e.into());
                }
            }

            let mut state = self.state.lock();
            {
                let meta = &state.meta[frame_id.as_usize()];
                if meta.pin_count > 0 || meta.page_id != Some(old_page_id) {
                    // Re-pinned or reassigned while the lock was
                    // released; pick another victim.
                    continue;
                }
            }
            state.meta[frame_id.as_usize()].clear();
            state.page_table.remove(&old_page_id);
            // Purge a stale re-add from an unpin that raced the
            // write-back.
            state.replacer.pin(frame_id);
            return Ok(frame_id);
        }
    }

    /// Guard-drop entry point: same semantics as
    /// [`unpin_page`](Self::unpin_page), keyed by frame.
    pub(super) fn complete_unpin(&self, frame_id: FrameId, is_dirty: bool) {
        let mut state = self.state.lock();
        Self::release_pin(&mut state, frame_id, is_dirty);
    }

    fn release_pin(state: &mut InstanceState, frame_id: FrameId, is_dirty: bool) {
        let idx = frame_id.as_usize();
        if state.meta[idx].pin_count == 0 {
            // Extra release; clamp rather than underflow.
            return;
        }
        if is_dirty {
            state.meta[idx].is_dirty = true;
        }
        state.meta[idx].pin_count -= 1;
        if state.meta[idx].pin_count == 0 {
            state.replacer.unpin(frame_id);
        }
    }
}

// NOTE: For production use the instance would also want:
// - hit/miss and eviction counters
// - a background flusher, so eviction rarely meets a dirty victim
// - WAL coupling: flush log records up to the page's LSN before the
//   page itself

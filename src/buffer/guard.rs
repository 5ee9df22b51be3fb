//! RAII guards for pinned pages.
//!
//! A guard is the holder's view of a pinned frame: it derefs to the
//! page bytes and releases exactly one pin when dropped. Dirtiness is
//! reported automatically; a write guard marks the page dirty on first
//! mutable access.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use super::frame::FrameId;
use super::instance::BufferPoolInstance;
use crate::disk::DiskManager;
use crate::page::{PageBuf, PageId};

/// Shared access to a pinned page.
///
/// Multiple read guards for the same page may coexist. Dropping the
/// guard unpins the page without marking it dirty.
pub struct PageReadGuard<'a, D: DiskManager> {
    instance: &'a BufferPoolInstance<D>,
    frame_id: FrameId,
    page_id: PageId,
    data: RwLockReadGuard<'a, PageBuf>,
}

impl<'a, D: DiskManager> PageReadGuard<'a, D> {
    pub(super) fn new(
        instance: &'a BufferPoolInstance<D>,
        frame_id: FrameId,
        page_id: PageId,
        data: RwLockReadGuard<'a, PageBuf>,
    ) -> Self {
        Self {
            instance,
            frame_id,
            page_id,
            data,
        }
    }

    /// Id of the pinned page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl<D: DiskManager> std::fmt::Debug for PageReadGuard<'_, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageReadGuard")
            .field("frame_id", &self.frame_id)
            .field("page_id", &self.page_id)
            .finish()
    }
}

impl<D: DiskManager> Deref for PageReadGuard<'_, D> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data.as_slice()
    }
}

impl<D: DiskManager> Drop for PageReadGuard<'_, D> {
    fn drop(&mut self) {
        self.instance.complete_unpin(self.frame_id, false);
    }
}

/// Exclusive access to a pinned page.
///
/// Dropping the guard unpins the page; if the bytes were accessed
/// mutably (or [`mark_dirty`](Self::mark_dirty) was called) the page is
/// reported dirty and will be written back before its frame is reused.
pub struct PageWriteGuard<'a, D: DiskManager> {
    instance: &'a BufferPoolInstance<D>,
    frame_id: FrameId,
    page_id: PageId,
    data: RwLockWriteGuard<'a, PageBuf>,
    dirty: bool,
}

impl<'a, D: DiskManager> PageWriteGuard<'a, D> {
    pub(super) fn new(
        instance: &'a BufferPoolInstance<D>,
        frame_id: FrameId,
        page_id: PageId,
        data: RwLockWriteGuard<'a, PageBuf>,
    ) -> Self {
        Self {
            instance,
            frame_id,
            page_id,
            data,
            dirty: false,
        }
    }

    /// Id of the pinned page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Reports the page dirty even without mutable access through this
    /// guard.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl<D: DiskManager> Deref for PageWriteGuard<'_, D> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data.as_slice()
    }
}

impl<D: DiskManager> DerefMut for PageWriteGuard<'_, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.dirty = true;
        self.data.as_mut_slice()
    }
}

impl<D: DiskManager> Drop for PageWriteGuard<'_, D> {
    fn drop(&mut self) {
        self.instance.complete_unpin(self.frame_id, self.dirty);
    }
}

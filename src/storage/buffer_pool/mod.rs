//! Buffer pool management for page caching.
//!
//! This module implements a buffer pool that manages in-memory caching of
//! database pages. It provides:
//! - Page pinning and unpinning with reference counting
//! - Clock (second-chance) eviction for memory management
//! - RAII guards ([`PageHandle`]) for safe page access
//!
//! # Architecture
//!
//! The pool owns a fixed array of frames. A page table maps resident page IDs
//! to frame indices; frames holding no page wait on a FIFO free list, and
//! unpinned resident frames are eviction candidates in the [`ClockReplacer`].
//! Every frame sits behind a `RwLock` that doubles as the page latch handed
//! to higher layers through [`PageHandle::data`] / [`PageHandle::data_mut`].
//!
//! # Example
//!
//! ```ignore
//! let pool = BufferPoolManager::new(capacity, disk_manager)?;
//! let handle = pool.fetch_page(page_id)?;
//! // Read/write page data via handle
//! // Page automatically unpinned when handle drops
//! ```

mod clock_replacer;
mod frame;

pub use clock_replacer::ClockReplacer;
pub use frame::Frame;

use std::collections::{HashMap, VecDeque};

use log::warn;
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};

use crate::error::{Result, RivetError};
use crate::storage::page::{DiskManager, PageData, PageId};

/// Index of a frame within the buffer pool.
pub type FrameId = usize;

/// Where a victim frame came from, so a failed operation can hand it back.
enum VictimSource {
    FreeList,
    Replacer,
}

/// Buffer pool manager caching disk pages in a fixed set of frames.
pub struct BufferPoolManager {
    /// Buffer frames holding cached pages. The `RwLock` is also the page latch.
    frames: Vec<RwLock<Frame>>,
    /// Maps resident page IDs to frame indices.
    page_table: Mutex<HashMap<PageId, FrameId>>,
    /// Frames holding no page, in FIFO order.
    free_list: Mutex<VecDeque<FrameId>>,
    /// Clock replacer selecting eviction victims among unpinned frames.
    replacer: ClockReplacer,
    /// Disk manager for page I/O.
    disk: Mutex<DiskManager>,
    /// Number of frames in the pool.
    pool_size: usize,
}

impl BufferPoolManager {
    /// Creates a buffer pool with `pool_size` frames over the given disk
    /// manager. All frames start on the free list.
    ///
    /// # Errors
    ///
    /// Returns an error if `pool_size` is zero.
    pub fn new(pool_size: usize, disk_manager: DiskManager) -> Result<Self> {
        if pool_size == 0 {
            return Err(RivetError::Storage(
                "Buffer pool size must be greater than 0".into(),
            ));
        }

        let frames = (0..pool_size).map(|_| RwLock::new(Frame::new())).collect();
        let free_list = (0..pool_size).collect();

        Ok(Self {
            frames,
            page_table: Mutex::new(HashMap::with_capacity(pool_size)),
            free_list: Mutex::new(free_list),
            replacer: ClockReplacer::new(pool_size),
            disk: Mutex::new(disk_manager),
            pool_size,
        })
    }

    /// Returns the number of frames in the pool.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Fetches a page, pinning it in the buffer pool.
    ///
    /// If the page is resident its pin count rises; otherwise a frame is
    /// claimed from the free list first, else from the replacer, the old
    /// page is written back if dirty, and the requested page is read in.
    ///
    /// # Errors
    ///
    /// Returns [`RivetError::NoVictim`] when every frame is pinned, or a
    /// storage error if the disk I/O fails.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PageHandle<'_>> {
        loop {
            // Hit path: pin without blocking other pool operations.
            let resident = { self.page_table.lock().get(&page_id).copied() };
            if let Some(frame_id) = resident {
                let mut frame = self.frames[frame_id].write();
                if frame.page_id != Some(page_id) {
                    // Evicted between lookup and lock; start over.
                    continue;
                }
                frame.pin_count += 1;
                self.replacer.pin(frame_id);
                return Ok(PageHandle {
                    pool: self,
                    frame_id,
                    page_id,
                });
            }

            // Miss path: serialize on the page table so two threads cannot
            // load the same page into two frames.
            let mut page_table = self.page_table.lock();
            if page_table.contains_key(&page_id) {
                continue;
            }

            let (frame_id, source) = self.take_victim()?;
            let mut frame = self.frames[frame_id].write();

            // A racing fetch that resolved this frame before we took the
            // page table may have re-pinned it; it will re-enter the
            // replacer on its final unpin.
            if frame.pin_count > 0 {
                continue;
            }

            if let Err(e) = self.evict_resident(&mut page_table, &mut frame) {
                drop(frame);
                self.restore_victim(frame_id, source);
                return Err(e);
            }

            if let Err(e) = self.disk.lock().read_page(page_id, &mut frame.data) {
                frame.reset();
                drop(frame);
                self.free_list.lock().push_back(frame_id);
                return Err(e);
            }
            frame.page_id = Some(page_id);
            frame.pin_count = 1;
            frame.dirty = false;
            drop(frame);

            page_table.insert(page_id, frame_id);
            self.replacer.pin(frame_id);
            return Ok(PageHandle {
                pool: self,
                frame_id,
                page_id,
            });
        }
    }

    /// Allocates a fresh page and pins it in the buffer pool.
    ///
    /// The new page's ID is available through [`PageHandle::page_id`]; its
    /// bytes start zeroed.
    ///
    /// # Errors
    ///
    /// Returns [`RivetError::NoVictim`] when every frame is pinned, or a
    /// storage error if the disk I/O fails.
    pub fn new_page(&self) -> Result<PageHandle<'_>> {
        loop {
            let mut page_table = self.page_table.lock();

            let (frame_id, source) = self.take_victim()?;
            let mut frame = self.frames[frame_id].write();

            // Same re-pin race as in fetch_page.
            if frame.pin_count > 0 {
                continue;
            }

            if let Err(e) = self.evict_resident(&mut page_table, &mut frame) {
                drop(frame);
                self.restore_victim(frame_id, source);
                return Err(e);
            }

            let page_id = match self.disk.lock().allocate_page() {
                Ok(id) => id,
                Err(e) => {
                    frame.reset();
                    drop(frame);
                    self.free_list.lock().push_back(frame_id);
                    return Err(e);
                }
            };

            frame.data = [0u8; crate::storage::page::PAGE_SIZE];
            frame.page_id = Some(page_id);
            frame.pin_count = 1;
            frame.dirty = false;
            drop(frame);

            page_table.insert(page_id, frame_id);
            self.replacer.pin(frame_id);
            return Ok(PageHandle {
                pool: self,
                frame_id,
                page_id,
            });
        }
    }

    /// Unpins a page, optionally marking it dirty.
    ///
    /// Unpinning a non-resident page succeeds silently. The dirty flag is
    /// only ever raised here, never cleared. When the pin count reaches zero
    /// the frame becomes an eviction candidate.
    ///
    /// # Errors
    ///
    /// Returns [`RivetError::InvalidUnpin`] if the page has no outstanding
    /// pins.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<()> {
        let resident = { self.page_table.lock().get(&page_id).copied() };
        let Some(frame_id) = resident else {
            return Ok(());
        };

        let mut frame = self.frames[frame_id].write();
        if frame.page_id != Some(page_id) {
            // The page left residency before we locked the frame; an
            // unpinned page needs no bookkeeping.
            return Ok(());
        }
        if frame.pin_count == 0 {
            return Err(RivetError::InvalidUnpin { page_id });
        }

        frame.pin_count -= 1;
        frame.dirty |= is_dirty;
        if frame.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }
        Ok(())
    }

    /// Writes a page's bytes to disk if it is resident and dirty.
    ///
    /// Residency and pin state are unchanged; flushing a non-resident or
    /// clean page is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the disk write fails.
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        loop {
            let resident = { self.page_table.lock().get(&page_id).copied() };
            let Some(frame_id) = resident else {
                return Ok(());
            };

            let mut frame = self.frames[frame_id].write();
            if frame.page_id != Some(page_id) {
                continue;
            }
            if !frame.dirty {
                return Ok(());
            }

            self.disk.lock().write_page(page_id, &frame.data)?;
            frame.dirty = false;
            return Ok(());
        }
    }

    /// Removes a page from the buffer pool and deallocates its ID.
    ///
    /// Deleting a non-resident page succeeds. The freed frame rejoins the
    /// free list.
    ///
    /// # Errors
    ///
    /// Returns [`RivetError::PageInUse`] if the page is pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        loop {
            let mut page_table = self.page_table.lock();
            let Some(&frame_id) = page_table.get(&page_id) else {
                return Ok(());
            };

            // Never block on a frame latch while holding the page table:
            // a latch holder may be inside fetch_page waiting for the table.
            let Some(mut frame) = self.frames[frame_id].try_write() else {
                drop(page_table);
                std::thread::yield_now();
                continue;
            };

            if frame.page_id != Some(page_id) {
                continue;
            }
            if frame.pin_count > 0 {
                return Err(RivetError::PageInUse { page_id });
            }

            page_table.remove(&page_id);
            self.replacer.pin(frame_id);
            frame.reset();
            drop(frame);
            self.free_list.lock().push_back(frame_id);
            drop(page_table);

            self.disk.lock().deallocate_page(page_id);
            return Ok(());
        }
    }

    /// Flushes every resident dirty page.
    ///
    /// Individual flush failures are logged and skipped; the sweep always
    /// visits every page.
    pub fn flush_all(&self) {
        let page_ids: Vec<PageId> = {
            let page_table = self.page_table.lock();
            page_table.keys().copied().collect()
        };

        for page_id in page_ids {
            if let Err(e) = self.flush_page(page_id) {
                warn!("flush_all: failed to flush {page_id}: {e}");
            }
        }
    }

    /// Returns a snapshot of the pool's occupancy counters.
    #[must_use]
    pub fn stats(&self) -> BufferPoolStats {
        let resident = self.page_table.lock().len();
        let mut dirty_frames = 0;
        let mut pinned_frames = 0;

        for frame_lock in &self.frames {
            let frame = frame_lock.read();
            if frame.page_id.is_some() {
                if frame.dirty {
                    dirty_frames += 1;
                }
                if frame.pin_count > 0 {
                    pinned_frames += 1;
                }
            }
        }

        BufferPoolStats {
            pool_size: self.pool_size,
            resident_pages: resident,
            dirty_frames,
            pinned_frames,
            free_frames: self.free_list.lock().len(),
            evictable_frames: self.replacer.size(),
        }
    }

    /// Claims a frame for a page load: free list first, then the replacer.
    fn take_victim(&self) -> Result<(FrameId, VictimSource)> {
        if let Some(frame_id) = self.free_list.lock().pop_front() {
            return Ok((frame_id, VictimSource::FreeList));
        }
        match self.replacer.victim() {
            Some(frame_id) => Ok((frame_id, VictimSource::Replacer)),
            None => Err(RivetError::NoVictim),
        }
    }

    /// Hands a claimed frame back after a failed operation.
    fn restore_victim(&self, frame_id: FrameId, source: VictimSource) {
        match source {
            VictimSource::FreeList => self.free_list.lock().push_front(frame_id),
            VictimSource::Replacer => self.replacer.unpin(frame_id),
        }
    }

    /// Writes back a victim's current page if dirty and unmaps it.
    ///
    /// On write failure the frame is left exactly as found.
    fn evict_resident(
        &self,
        page_table: &mut HashMap<PageId, FrameId>,
        frame: &mut Frame,
    ) -> Result<()> {
        let Some(old_id) = frame.page_id else {
            return Ok(());
        };
        if frame.dirty {
            self.disk.lock().write_page(old_id, &frame.data)?;
            frame.dirty = false;
        }
        page_table.remove(&old_id);
        Ok(())
    }
}

/// RAII guard for a pinned page.
///
/// The handle keeps the page pinned; [`PageHandle::data`] takes the frame's
/// shared latch and [`PageHandle::data_mut`] its exclusive latch, marking the
/// page dirty. Dropping the handle unpins the page.
pub struct PageHandle<'a> {
    pool: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
}

impl PageHandle<'_> {
    /// Returns the page ID.
    #[must_use]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Takes the shared page latch and returns a read view of the bytes.
    #[must_use]
    pub fn data(&self) -> MappedRwLockReadGuard<'_, PageData> {
        let frame = self.pool.frames[self.frame_id].read();
        RwLockReadGuard::map(frame, |f| &f.data)
    }

    /// Takes the exclusive page latch and returns a write view of the bytes.
    ///
    /// The page is marked dirty.
    pub fn data_mut(&mut self) -> MappedRwLockWriteGuard<'_, PageData> {
        let mut frame = self.pool.frames[self.frame_id].write();
        frame.dirty = true;
        RwLockWriteGuard::map(frame, |f| &mut f.data)
    }
}

impl Drop for PageHandle<'_> {
    fn drop(&mut self) {
        let _ = self.pool.unpin_page(self.page_id, false);
    }
}

/// Statistics about the buffer pool state.
#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    /// Number of frames in the pool.
    pub pool_size: usize,
    /// Number of resident pages.
    pub resident_pages: usize,
    /// Number of frames holding unflushed modifications.
    pub dirty_frames: usize,
    /// Number of frames with a nonzero pin count.
    pub pinned_frames: usize,
    /// Number of frames on the free list.
    pub free_frames: usize,
    /// Number of frames in the replacer's candidate set.
    pub evictable_frames: usize,
}

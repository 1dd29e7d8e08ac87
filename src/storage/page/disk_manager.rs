//! Disk manager for page-level I/O.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, RivetError};
use crate::storage::page::{PageData, PageId, PAGE_SIZE};

/// Manages disk I/O for database pages.
///
/// The disk manager handles:
/// - Reading and writing whole pages to/from the database file
/// - Allocating new page IDs and recycling deallocated ones
///
/// Callers are expected to serialize access externally; the buffer pool wraps
/// the disk manager in a mutex.
pub struct DiskManager {
    /// Path to the database file.
    path: PathBuf,
    /// File handle for the database file.
    file: File,
    /// Next never-allocated page index.
    next_page_index: u32,
    /// Page IDs returned by `deallocate_page`, reused before extending the file.
    free_ids: Vec<PageId>,
}

impl DiskManager {
    /// Opens or creates a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| RivetError::Storage(format!("Failed to open database file: {e}")))?;

        let file_len = file
            .metadata()
            .map_err(|e| RivetError::Storage(format!("Failed to get file metadata: {e}")))?
            .len();

        // Resume page allocation from the current file size.
        let next_page_index = file_len.div_ceil(PAGE_SIZE as u64) as u32;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_page_index,
            free_ids: Vec::new(),
        })
    }

    /// Returns the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of pages allocated in the database file.
    #[must_use]
    pub fn num_pages(&self) -> u32 {
        self.next_page_index
    }

    /// Reads a page from disk into `buf`.
    ///
    /// If the page has never been written (beyond current file size), the
    /// buffer is zero-filled.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn read_page(&mut self, page_id: PageId, buf: &mut PageData) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(page_id.offset()))
            .map_err(|e| RivetError::Storage(format!("Failed to seek to page: {e}")))?;

        match self.file.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                buf.fill(0);
                Ok(())
            }
            Err(e) => Err(RivetError::Storage(format!(
                "Failed to read page {page_id}: {e}"
            ))),
        }
    }

    /// Writes a page to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn write_page(&mut self, page_id: PageId, data: &PageData) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(page_id.offset()))
            .map_err(|e| RivetError::Storage(format!("Failed to seek to page: {e}")))?;

        self.file
            .write_all(data)
            .map_err(|e| RivetError::Storage(format!("Failed to write page {page_id}: {e}")))?;

        Ok(())
    }

    /// Allocates a page ID, reusing a deallocated one when available.
    ///
    /// Recycled pages are zeroed on disk; fresh pages read as zeros until
    /// first written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be extended or scrubbed.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        if let Some(page_id) = self.free_ids.pop() {
            // Scrub the recycled page so a clean eviction of its new owner
            // cannot resurface the old contents.
            self.write_page(page_id, &[0u8; PAGE_SIZE])?;
            return Ok(page_id);
        }

        let page_id = PageId::new(self.next_page_index);
        self.next_page_index += 1;

        let new_size = u64::from(self.next_page_index) * PAGE_SIZE as u64;
        self.file
            .set_len(new_size)
            .map_err(|e| RivetError::Storage(format!("Failed to extend file: {e}")))?;

        Ok(page_id)
    }

    /// Returns a page ID to the allocator for reuse.
    pub fn deallocate_page(&mut self, page_id: PageId) {
        self.free_ids.push(page_id);
    }

    /// Flushes all buffered writes to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&mut self) -> Result<()> {
        self.file
            .sync_all()
            .map_err(|e| RivetError::Storage(format!("Failed to sync file: {e}")))
    }
}

//! Persistent linear-probing hash table.
//!
//! The table is an open-addressing hash index whose buckets live in block
//! pages addressed by a header page; both kinds of page are ordinary buffer
//! pool pages, so the index survives eviction and restarts.
//!
//! A key hashes to a global slot index `i = h(k) % (num_blocks * capacity)`,
//! which splits into a block index `i / capacity` and a bucket within that
//! block `i % capacity`. Probing is linear and wraps across blocks and around
//! the table. Duplicate keys are allowed; duplicate `(key, value)` pairs are
//! not.
//!
//! # Concurrency
//!
//! A table-level `RwLock` separates steady-state operations (lookup, insert,
//! remove hold it shared) from resize (exclusive). Within one operation the
//! header page is latched shared for the duration, while block pages are
//! latched hand-over-hand in probe order: the current block's latch and pin
//! are always released before the next block's are taken, so no two block
//! latches are ever held at once.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::error::{Result, RivetError};
use crate::storage::buffer_pool::BufferPoolManager;
use crate::storage::page::{
    block_array_size, HashBlockPage, HashBlockPageMut, HashHeaderPage, HashHeaderPageMut, PageId,
    SlotData, MAX_BLOCK_IDS,
};

/// Hash function over keys; injectable so tests can force collisions.
pub type HashFn<K> = fn(&K) -> u64;

fn default_hash<K: Hash>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Outcome of one probe pass over the table.
enum ProbeOutcome {
    Inserted,
    Duplicate,
    TableFull { size: u32 },
}

/// A persistent open-addressing hash index keyed by `K` storing values `V`.
pub struct LinearProbeHashTable<K, V> {
    bpm: Arc<BufferPoolManager>,
    /// Table latch; the guarded value is the current header page ID, which
    /// only resize replaces.
    header_page_id: RwLock<PageId>,
    hash_fn: HashFn<K>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> LinearProbeHashTable<K, V>
where
    K: SlotData + Hash,
    V: SlotData,
{
    /// Creates a new hash table spanning `num_blocks` block pages, hashed
    /// with the standard hasher.
    ///
    /// # Errors
    ///
    /// Returns an error if the pages cannot be allocated.
    pub fn new(bpm: Arc<BufferPoolManager>, num_blocks: usize) -> Result<Self> {
        Self::with_hash_fn(bpm, num_blocks, default_hash::<K>)
    }

    /// Creates a new hash table with a caller-provided hash function.
    ///
    /// # Errors
    ///
    /// Returns an error if the pages cannot be allocated.
    pub fn with_hash_fn(
        bpm: Arc<BufferPoolManager>,
        num_blocks: usize,
        hash_fn: HashFn<K>,
    ) -> Result<Self> {
        if num_blocks == 0 || num_blocks > MAX_BLOCK_IDS {
            return Err(RivetError::Storage(format!(
                "hash table must span between 1 and {MAX_BLOCK_IDS} blocks, got {num_blocks}"
            )));
        }

        let header_page_id = Self::build_table(&bpm, num_blocks)?;
        Ok(Self {
            bpm,
            header_page_id: RwLock::new(header_page_id),
            hash_fn,
            _marker: PhantomData,
        })
    }

    /// Opens an existing table by its header page ID.
    pub fn open(bpm: Arc<BufferPoolManager>, header_page_id: PageId, hash_fn: HashFn<K>) -> Self {
        Self {
            bpm,
            header_page_id: RwLock::new(header_page_id),
            hash_fn,
            _marker: PhantomData,
        }
    }

    /// Number of key/value slots per block page.
    #[must_use]
    pub fn block_capacity() -> usize {
        block_array_size(K::LEN + V::LEN)
    }

    /// Returns the page ID of the current header page.
    #[must_use]
    pub fn header_page_id(&self) -> PageId {
        *self.header_page_id.read()
    }

    /// Returns the table's total slot count.
    ///
    /// # Errors
    ///
    /// Returns an error if the header page cannot be fetched.
    pub fn get_size(&self) -> Result<u32> {
        let header_pid = self.header_page_id.read();
        let header_handle = self.bpm.fetch_page(*header_pid)?;
        let data = header_handle.data();
        Ok(HashHeaderPage::new(&data[..]).size())
    }

    /// Collects every value stored under `key`.
    ///
    /// The probe walks forward from the key's home slot while slots are
    /// occupied; tombstones are traversed, not terminal. Returns the values
    /// in probe order (possibly empty).
    ///
    /// # Errors
    ///
    /// Returns an error if a page cannot be fetched.
    pub fn get_value(&self, key: &K) -> Result<Vec<V>> {
        let header_pid = self.header_page_id.read();
        let header_handle = self.bpm.fetch_page(*header_pid)?;
        let header_data = header_handle.data();
        let header = HashHeaderPage::new(&header_data[..]);

        let capacity = Self::block_capacity();
        let num_blocks = header.size() as usize / capacity;
        let table_size = num_blocks * capacity;
        let start = (self.hash_fn)(key) as usize % table_size;
        let mut block_index = start / capacity;
        let mut bucket = start % capacity;
        let mut probed = 0;

        let mut result = Vec::new();
        'probe: while probed < table_size {
            let block_handle = self.bpm.fetch_page(header.block_page_id(block_index))?;
            let block_data = block_handle.data();
            let block = HashBlockPage::<K, V>::new(&block_data[..]);

            while probed < table_size {
                if !block.is_occupied(bucket) {
                    break 'probe;
                }
                if block.is_readable(bucket) && block.key_at(bucket) == *key {
                    result.push(block.value_at(bucket));
                }
                probed += 1;
                bucket += 1;
                if bucket == capacity {
                    break;
                }
            }

            // Hand over to the next block: latch and pin drop here.
            block_index = (block_index + 1) % num_blocks;
            bucket = 0;
        }

        Ok(result)
    }

    /// Inserts the pair `(key, value)`.
    ///
    /// Duplicate keys are fine; re-inserting an existing `(key, value)` pair
    /// fails with [`RivetError::DuplicatePair`]. A full table triggers a
    /// doubling resize and the insert then continues against the grown
    /// table.
    ///
    /// # Errors
    ///
    /// Returns [`RivetError::DuplicatePair`] for an exact duplicate, or a
    /// storage error if pages cannot be fetched or allocated.
    pub fn insert(&self, key: &K, value: &V) -> Result<()> {
        loop {
            let header_pid = self.header_page_id.read();
            match self.probe_insert(*header_pid, key, value)? {
                ProbeOutcome::Inserted => return Ok(()),
                ProbeOutcome::Duplicate => return Err(RivetError::DuplicatePair),
                ProbeOutcome::TableFull { size } => {
                    // Release the shared table latch before resizing, then
                    // retry against the new header.
                    drop(header_pid);
                    self.resize(size)?;
                }
            }
        }
    }

    /// Removes the pair `(key, value)`.
    ///
    /// The slot keeps its occupied bit (a tombstone) so longer probe chains
    /// stay intact. Returns whether the pair was present.
    ///
    /// # Errors
    ///
    /// Returns an error if a page cannot be fetched.
    pub fn remove(&self, key: &K, value: &V) -> Result<bool> {
        let header_pid = self.header_page_id.read();
        let header_handle = self.bpm.fetch_page(*header_pid)?;
        let header_data = header_handle.data();
        let header = HashHeaderPage::new(&header_data[..]);

        let capacity = Self::block_capacity();
        let num_blocks = header.size() as usize / capacity;
        let table_size = num_blocks * capacity;
        let start = (self.hash_fn)(key) as usize % table_size;
        let mut block_index = start / capacity;
        let mut bucket = start % capacity;
        let mut probed = 0;

        'probe: while probed < table_size {
            let mut block_handle = self.bpm.fetch_page(header.block_page_id(block_index))?;
            let mut block_data = block_handle.data_mut();
            let mut block = HashBlockPageMut::<K, V>::new(&mut block_data[..]);

            while probed < table_size {
                if !block.is_occupied(bucket) {
                    break 'probe;
                }
                if block.is_readable(bucket)
                    && block.key_at(bucket) == *key
                    && block.value_at(bucket) == *value
                {
                    block.remove(bucket);
                    return Ok(true);
                }
                probed += 1;
                bucket += 1;
                if bucket == capacity {
                    break;
                }
            }

            block_index = (block_index + 1) % num_blocks;
            bucket = 0;
        }

        Ok(false)
    }

    /// Allocates the header and block pages of a fresh, empty table.
    fn build_table(bpm: &BufferPoolManager, num_blocks: usize) -> Result<PageId> {
        let capacity = Self::block_capacity();

        let mut header_handle = bpm.new_page()?;
        let header_pid = header_handle.page_id();

        let mut block_ids = Vec::with_capacity(num_blocks);
        for _ in 0..num_blocks {
            // New pages come back zeroed, which is exactly an empty block.
            let block_handle = bpm.new_page()?;
            block_ids.push(block_handle.page_id());
        }

        let mut data = header_handle.data_mut();
        let mut header = HashHeaderPageMut::new(&mut data[..]);
        header.set_page_id(header_pid);
        header.set_size((num_blocks * capacity) as u32);
        for (index, block_pid) in block_ids.iter().enumerate() {
            header.set_block_page_id(index, *block_pid);
        }

        Ok(header_pid)
    }

    /// One insert attempt against the table rooted at `header_pid`.
    ///
    /// Holds no table-level latch itself; callers decide whether the shared
    /// latch (steady state) or the exclusive latch (resize migration) is in
    /// force.
    fn probe_insert(&self, header_pid: PageId, key: &K, value: &V) -> Result<ProbeOutcome> {
        let header_handle = self.bpm.fetch_page(header_pid)?;
        let header_data = header_handle.data();
        let header = HashHeaderPage::new(&header_data[..]);

        let capacity = Self::block_capacity();
        let num_blocks = header.size() as usize / capacity;
        let table_size = num_blocks * capacity;
        let start = (self.hash_fn)(key) as usize % table_size;
        let mut block_index = start / capacity;
        let mut bucket = start % capacity;
        let mut probed = 0;

        while probed < table_size {
            let mut block_handle = self.bpm.fetch_page(header.block_page_id(block_index))?;
            let mut block_data = block_handle.data_mut();
            let mut block = HashBlockPageMut::<K, V>::new(&mut block_data[..]);

            while probed < table_size {
                if block.insert(bucket, key, value) {
                    return Ok(ProbeOutcome::Inserted);
                }
                if block.key_at(bucket) == *key && block.value_at(bucket) == *value {
                    return Ok(ProbeOutcome::Duplicate);
                }
                probed += 1;
                bucket += 1;
                if bucket == capacity {
                    break;
                }
            }

            block_index = (block_index + 1) % num_blocks;
            bucket = 0;
        }

        Ok(ProbeOutcome::TableFull {
            size: table_size as u32,
        })
    }

    /// Doubles the table's capacity and migrates every live pair.
    ///
    /// Runs under the exclusive table latch, so no lookup, insert, or remove
    /// overlaps the migration. Tombstones are not migrated, which also
    /// compacts probe chains.
    fn resize(&self, observed_size: u32) -> Result<()> {
        let mut header_guard = self.header_page_id.write();
        let old_header_pid = *header_guard;

        let capacity = Self::block_capacity();
        let (current_size, old_block_ids) = {
            let header_handle = self.bpm.fetch_page(old_header_pid)?;
            let data = header_handle.data();
            let header = HashHeaderPage::new(&data[..]);
            let num_blocks = header.size() as usize / capacity;
            let block_ids: Vec<PageId> =
                (0..num_blocks).map(|i| header.block_page_id(i)).collect();
            (header.size(), block_ids)
        };

        // A concurrent insert may have grown the table while we waited for
        // the exclusive latch.
        if current_size > observed_size {
            return Ok(());
        }

        let new_num_blocks = (2 * current_size as usize).div_ceil(capacity);
        if new_num_blocks > MAX_BLOCK_IDS {
            return Err(RivetError::Storage(format!(
                "hash table cannot grow past {MAX_BLOCK_IDS} blocks"
            )));
        }
        let new_header_pid = Self::build_table(&self.bpm, new_num_blocks)?;

        // Migrate readable slots. The new table is at most half full and has
        // no tombstones, so these inserts cannot wrap and recurse.
        for old_block_pid in &old_block_ids {
            {
                let block_handle = self.bpm.fetch_page(*old_block_pid)?;
                let block_data = block_handle.data();
                let block = HashBlockPage::<K, V>::new(&block_data[..]);
                for bucket in 0..capacity {
                    if block.is_readable(bucket) {
                        let key = block.key_at(bucket);
                        let value = block.value_at(bucket);
                        match self.probe_insert(new_header_pid, &key, &value)? {
                            ProbeOutcome::Inserted => {}
                            ProbeOutcome::Duplicate => {}
                            ProbeOutcome::TableFull { .. } => {
                                return Err(RivetError::Storage(
                                    "hash table resize overflowed the grown table".into(),
                                ))
                            }
                        }
                    }
                }
            }
            self.bpm.delete_page(*old_block_pid)?;
        }
        self.bpm.delete_page(old_header_pid)?;

        debug!(
            "resized hash table: {current_size} -> {} slots",
            new_num_blocks * capacity
        );
        *header_guard = new_header_pid;
        Ok(())
    }
}

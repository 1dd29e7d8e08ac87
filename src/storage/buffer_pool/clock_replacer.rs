//! Clock (second-chance) replacement policy.
//!
//! The replacer tracks which frames are candidates for eviction and picks
//! victims with a rotating hand. A frame entering the candidate set gets a
//! reference bit: the hand clears it on the first pass and only evicts the
//! frame on the second, so recently-unpinned frames survive one sweep.

use parking_lot::Mutex;

use crate::storage::buffer_pool::FrameId;

struct ClockState {
    /// Next position the hand will examine.
    hand: usize,
    /// Frame is currently an eviction candidate.
    in_pool: Vec<bool>,
    /// Second-chance bit; set on unpin, cleared by a passing hand.
    referenced: Vec<bool>,
}

/// Second-chance victim selector over frame indices `0..num_frames`.
///
/// All operations serialize on one internal mutex; the buffer pool treats
/// the replacer as opaque beyond these entry points.
pub struct ClockReplacer {
    state: Mutex<ClockState>,
}

impl ClockReplacer {
    /// Creates a replacer for `num_frames` frames, all initially pinned
    /// (not candidates).
    #[must_use]
    pub fn new(num_frames: usize) -> Self {
        Self {
            state: Mutex::new(ClockState {
                hand: 0,
                in_pool: vec![false; num_frames],
                referenced: vec![false; num_frames],
            }),
        }
    }

    /// Selects and removes a victim frame from the candidate set.
    ///
    /// Returns `None` when no frame is evictable. The hand advances at most
    /// twice around the clock: the first pass may spend reference bits, after
    /// which some candidate must be bare.
    pub fn victim(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        let num_frames = state.in_pool.len();

        if !state.in_pool.iter().any(|&in_pool| in_pool) {
            return None;
        }

        for _ in 0..2 * num_frames {
            let slot = state.hand % num_frames;
            state.hand = slot + 1;

            if !state.in_pool[slot] {
                continue;
            }
            if state.referenced[slot] {
                state.referenced[slot] = false;
                continue;
            }

            state.in_pool[slot] = false;
            return Some(slot);
        }

        // Two full sweeps visit every slot twice: once to spend its
        // reference bit, once to take it. Not reached while any candidate
        // remains.
        None
    }

    /// Removes `frame_id` from the candidate set.
    ///
    /// Called by the buffer pool whenever a frame's pin count rises above
    /// zero (or the frame leaves residency).
    pub fn pin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        state.in_pool[frame_id] = false;
    }

    /// Adds `frame_id` to the candidate set with a fresh reference bit.
    ///
    /// Called by the buffer pool when a frame's pin count reaches zero.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        state.in_pool[frame_id] = true;
        state.referenced[frame_id] = true;
    }

    /// Returns the number of frames currently in the candidate set.
    #[must_use]
    pub fn size(&self) -> usize {
        let state = self.state.lock();
        state.in_pool.iter().filter(|&&in_pool| in_pool).count()
    }
}

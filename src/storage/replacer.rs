use std::collections::VecDeque;
use std::sync::Mutex;

use log::debug;

use crate::storage::page::FrameId;

/// How a page access reached the pool. The replacement policy currently
/// treats all kinds alike; the kind is recorded for future policies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AccessType {
    Unknown,
    Lookup,
    Scan,
    Index,
}

/// Replacer tracks frame usage and picks eviction victims when the
/// buffer pool is full.
pub trait Replacer: Send + Sync {
    /// Record the event that the given frame is accessed at the current
    /// timestamp. Panics if the frame id is out of the range the
    /// replacer was built for.
    fn record_access(&self, frame_id: FrameId, access_type: AccessType);

    /// Find the frame to evict with the replacement policy. Only frames
    /// that are marked evictable are candidates.
    ///
    /// Successful eviction decrements the size of the replacer and
    /// drops the frame's access history.
    ///
    /// Return the frame id if a frame is evicted successfully, None if
    /// no frame can be evicted.
    fn evict(&self) -> Option<FrameId>;

    /// Toggle whether a frame is evictable or non-evictable. This also
    /// controls the replacer size: size is the number of evictable
    /// tracked frames, so it moves only on a state change. Frames the
    /// replacer is not tracking are ignored.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool);

    /// Remove a specific evictable frame along with its access history,
    /// regardless of where the policy ranks it. Untracked frames are
    /// ignored; removing a tracked non-evictable frame panics.
    fn remove(&self, frame_id: FrameId);

    /// Number of evictable frames currently tracked.
    fn size(&self) -> usize;
}

/// Index value meaning "not linked".
const NIL: usize = usize::MAX;

/// Per-frame record: the bounded access history (oldest first, at most
/// k entries) and the links of the intrusive list the frame currently
/// sits on. Sentinel slots reuse the same type with an empty history.
struct LRUKNode {
    history: VecDeque<u64>,
    is_evictable: bool,
    prev: usize,
    next: usize,
}

impl LRUKNode {
    fn new() -> Self {
        LRUKNode { history: VecDeque::new(), is_evictable: false, prev: NIL, next: NIL }
    }

    /// A frame is tracked once it has at least one recorded access.
    fn is_tracked(&self) -> bool {
        !self.history.is_empty()
    }
}

/// LRUKReplacer implements the LRU-k replacement policy.
///
/// The policy evicts the frame whose k-th most recent access is oldest.
/// Frames with fewer than k recorded accesses take precedence over all
/// full ones (their backward k-distance is treated as infinite) and are
/// evicted FIFO by their first recorded access.
///
/// Tracked frames live on one of two lists joined by three sentinels,
///
/// ```text
/// history_end <-> ..sub-k frames.. <-> middle_separator <-> ..full frames.. <-> buffer_start
/// ```
///
/// realized as an intrusive doubly-linked list over one node arena
/// (frame slots first, the three sentinels after), so splicing is O(1)
/// and there are no owning pointers to juggle. A frame sits on the
/// history side while its history is shorter than k and moves to the
/// cache side once it is full.
pub struct LRUKReplacer {
    /// node arena: one slot per frame, then the three sentinels.
    node_store: Vec<LRUKNode>,
    history_end: usize,
    middle_separator: usize,
    buffer_start: usize,
    /// logical clock, bumped on every recorded access.
    current_timestamp: u64,
    /// number of tracked evictable frames.
    curr_size: usize,
    replacer_size: usize,
    k: usize,
}

impl LRUKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "replacer k must be larger than zero");
        let mut node_store = Vec::with_capacity(num_frames + 3);
        node_store.resize_with(num_frames + 3, LRUKNode::new);
        let mut replacer = LRUKReplacer {
            node_store,
            history_end: num_frames,
            middle_separator: num_frames + 1,
            buffer_start: num_frames + 2,
            current_timestamp: 0,
            curr_size: 0,
            replacer_size: num_frames,
            k,
        };
        // chain the sentinels; frame nodes start unlinked
        let (h, m, b) = (replacer.history_end, replacer.middle_separator, replacer.buffer_start);
        replacer.node_store[h].next = m;
        replacer.node_store[m].prev = h;
        replacer.node_store[m].next = b;
        replacer.node_store[b].prev = m;
        replacer
    }

    /// Splice the node out of its list; its own links become NIL.
    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.node_store[idx].prev, self.node_store[idx].next);
        if prev != NIL {
            self.node_store[prev].next = next;
        }
        if next != NIL {
            self.node_store[next].prev = prev;
        }
        self.node_store[idx].prev = NIL;
        self.node_store[idx].next = NIL;
    }

    /// Unlink the node and splice it back in immediately after
    /// `sentinel`: the most-recent position of the list that begins
    /// there. Eviction walks each list from the opposite end, so nodes
    /// placed here are reached last.
    fn move_to_end(&mut self, idx: usize, sentinel: usize) {
        self.unlink(idx);
        let next = self.node_store[sentinel].next;
        self.node_store[sentinel].next = idx;
        self.node_store[idx].prev = sentinel;
        self.node_store[idx].next = next;
        if next != NIL {
            self.node_store[next].prev = idx;
        }
    }

    fn record_access(&mut self, frame_id: FrameId, _access_type: AccessType) {
        if frame_id >= self.replacer_size {
            panic!(
                "record access: frame id {} out of range (replacer size {})",
                frame_id, self.replacer_size
            );
        }
        self.current_timestamp += 1;
        let timestamp = self.current_timestamp;

        let k = self.k;
        let node = &mut self.node_store[frame_id];
        node.history.push_back(timestamp);
        if node.history.len() > k {
            node.history.pop_front();
        }
        // re-place the node at the recent end of whichever list matches
        // its history length; evictability is not touched by accesses
        if node.history.len() < k {
            self.move_to_end(frame_id, self.history_end);
        } else {
            self.move_to_end(frame_id, self.middle_separator);
        }
    }

    /// Find the frame with the largest backward k-distance and evict it.
    /// Sub-k frames are all considered infinitely distant, so the
    /// history list is searched first and the cache list only when it
    /// yields nothing.
    fn evict(&mut self) -> Option<FrameId> {
        if self.curr_size == 0 {
            return None;
        }
        let victim = self
            .scan_list(self.middle_separator, self.history_end)
            .or_else(|| self.scan_list(self.buffer_start, self.middle_separator));
        let frame_id = victim?;

        self.unlink(frame_id);
        let node = &mut self.node_store[frame_id];
        node.is_evictable = false;
        node.history.clear();
        self.curr_size -= 1;
        debug!("evicting frame {}", frame_id);
        Some(frame_id)
    }

    /// Walk one list from its oldest end (just before `from`) toward
    /// `until`, returning the evictable node with the smallest ordering
    /// key. The key is the front of the node's history: the first-ever
    /// access for sub-k frames, the k-th most recent access for full
    /// ones. Ties keep the node nearer the oldest end.
    fn scan_list(&self, from: usize, until: usize) -> Option<FrameId> {
        let mut best: Option<(u64, FrameId)> = None;
        let mut idx = self.node_store[from].prev;
        while idx != until {
            let node = &self.node_store[idx];
            if node.is_evictable {
                // a linked node always has history
                let key = *node.history.front().expect("linked node without history");
                if best.map_or(true, |(ts, _)| key < ts) {
                    best = Some((key, idx));
                }
            }
            idx = self.node_store[idx].prev;
        }
        best.map(|(_, idx)| idx)
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        if frame_id >= self.replacer_size {
            return;
        }
        let node = &mut self.node_store[frame_id];
        if !node.is_tracked() || node.is_evictable == evictable {
            return;
        }
        node.is_evictable = evictable;
        if evictable {
            self.curr_size += 1;
        } else {
            self.curr_size -= 1;
        }
    }

    fn remove(&mut self, frame_id: FrameId) {
        if frame_id >= self.replacer_size || !self.node_store[frame_id].is_tracked() {
            return;
        }
        if !self.node_store[frame_id].is_evictable {
            panic!("remove: frame {} is not evictable", frame_id);
        }
        self.unlink(frame_id);
        let node = &mut self.node_store[frame_id];
        node.history.clear();
        node.is_evictable = false;
        self.curr_size -= 1;
    }

    fn size(&self) -> usize {
        self.curr_size
    }
}

/// SyncLRUKReplacer is the thread-safe version of the LRU-k policy;
/// basically all the heavy lifting happens in the LRUKReplacer, under a
/// single latch. The access timestamp is a logical clock bumped under
/// that latch, so recency order reflects the linearization of
/// record_access calls.
pub struct SyncLRUKReplacer {
    inner: Mutex<LRUKReplacer>,
}

impl SyncLRUKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        SyncLRUKReplacer { inner: Mutex::new(LRUKReplacer::new(num_frames, k)) }
    }
}

impl Replacer for SyncLRUKReplacer {
    fn record_access(&self, frame_id: FrameId, access_type: AccessType) {
        let mut guard = self.inner.lock().unwrap();
        guard.record_access(frame_id, access_type)
    }

    fn evict(&self) -> Option<FrameId> {
        let mut guard = self.inner.lock().unwrap();
        guard.evict()
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut guard = self.inner.lock().unwrap();
        guard.set_evictable(frame_id, evictable)
    }

    fn remove(&self, frame_id: FrameId) {
        let mut guard = self.inner.lock().unwrap();
        guard.remove(frame_id)
    }

    fn size(&self) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.size()
    }
}

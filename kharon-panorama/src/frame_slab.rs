use kharon_types::Timestamp;

/// One entry in the frame history: a fixed-capacity slab slot addressed by
/// index rather than pointer (spec §9, ported from the original's
/// intrusive `frame_page_type` linked list).
struct Slot<T> {
    /// Link within the live frame-history list.
    next: Option<u32>,
    /// Link within the free/available queue.
    queue_next: Option<u32>,
    timestamp: Timestamp,
    payload: Option<T>,
}

/// Self-compacting frame history (spec §4.C, §9): a fixed number of slots
/// are allocated once; pushing a new frame takes a slot from the free
/// queue and then thins the older end of the history so that storage
/// density falls off logarithmically with age -- the first several frames
/// are kept at full resolution, then every other frame, then every 4th,
/// and so on. A push never fails: when the free queue is empty the oldest
/// live frame is evicted first.
///
/// This is a from-scratch re-expression of the original's pointer-based
/// intrusive list as an arena of `Option<u32>` indices, which sidesteps
/// the aliasing the original relied on unsafely: readers in this port
/// clone out a snapshot via [`frames`](Self::frames) instead of walking
/// live pointers concurrently with a writer.
pub struct FrameSlab<T> {
    slots: Vec<Slot<T>>,
    available_head: Option<u32>,
    available_tail: Option<u32>,
    available_count: usize,
    frames_head: Option<u32>,
    compaction_count: u64,
}

impl<T> FrameSlab<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 4, "frame slab capacity must allow compaction");
        let mut slots = Vec::with_capacity(capacity);
        for i in 0..capacity {
            slots.push(Slot {
                next: None,
                queue_next: if i + 1 < capacity { Some(i as u32 + 1) } else { None },
                timestamp: Timestamp::ZERO,
                payload: None,
            });
        }
        FrameSlab {
            slots,
            available_head: Some(0),
            available_tail: Some(capacity as u32 - 1),
            available_count: capacity,
            frames_head: None,
            compaction_count: 0,
        }
    }

    fn free_page(&mut self, idx: u32) {
        if let Some(tail) = self.available_tail {
            self.slots[tail as usize].queue_next = Some(idx);
        } else {
            self.available_head = Some(idx);
        }
        self.slots[idx as usize].queue_next = None;
        self.available_tail = Some(idx);
        self.available_count += 1;
        // Payload is intentionally left in place: the original never wipes
        // a retired page's data so an in-flight reader can keep draining it.
    }

    fn allocate_page(&mut self) -> u32 {
        if self.available_count == 0 {
            let mut page = self
                .frames_head
                .expect("allocate_page: frame list empty but no pages available");
            let mut prev = None;
            while let Some(next) = self.slots[page as usize].next {
                prev = Some(page);
                page = next;
            }
            match prev {
                Some(p) => self.slots[p as usize].next = None,
                None => self.frames_head = None,
            }
            self.free_page(page);
        }

        let idx = self
            .available_head
            .expect("allocate_page: available queue empty after eviction");
        self.available_head = self.slots[idx as usize].queue_next;
        if self.available_head.is_none() {
            self.available_tail = None;
        }
        self.available_count -= 1;
        self.slots[idx as usize].queue_next = None;
        self.slots[idx as usize].next = None;
        idx
    }

    fn add_to_frames(&mut self, idx: u32) {
        self.slots[idx as usize].next = self.frames_head;
        self.frames_head = Some(idx);
    }

    /// Delete the 4th node from `head` and return the page that followed
    /// it, ported directly from `delete_fourth` in the original (spec §9).
    fn delete_fourth(&mut self, head: Option<u32>) -> Option<u32> {
        let head = head?;
        let mut ctr = 0u32;
        let mut prev = head;
        let mut cur = Some(head);
        while let Some(p) = cur {
            ctr += 1;
            if ctr == 4 {
                let after = self.slots[p as usize].next;
                self.slots[prev as usize].next = after;
                self.free_page(p);
                break;
            }
            prev = p;
            cur = self.slots[p as usize].next;
        }
        self.slots[prev as usize].next
    }

    /// Push a new frame and thin the tail of the history by the
    /// logarithmic compaction rule: every other push deletes the 4th
    /// element, every 4th push deletes it twice (continuing from where the
    /// first deletion left off), every 8th three times, and so on.
    ///
    /// The trigger and counter semantics mirror the original's
    /// `compaction_count` exactly: the odd/even check is made on the
    /// counter *before* it advances, and the counter is capped at 63
    /// (`compaction_count &= 63`, comfortably above `MAX_FRAME_HEAP_AVAILABLE`)
    /// so it never overflows across a long-running process.
    pub fn push(&mut self, timestamp: Timestamp, payload: T) {
        let idx = self.allocate_page();
        self.slots[idx as usize].timestamp = timestamp;
        self.slots[idx as usize].payload = Some(payload);
        self.add_to_frames(idx);

        if self.compaction_count & 1 == 1 {
            let mut val = self.compaction_count;
            let mut head = self.frames_head;
            while val & 1 == 1 {
                head = self.delete_fourth(head);
                val >>= 1;
            }
            self.compaction_count &= 63;
        }
        self.compaction_count = self.compaction_count.wrapping_add(1);
    }

    /// A newest-first snapshot of the live frame history (spec
    /// `get_frame_list`). Readers get their own owned copy rather than
    /// walking the slab's internal links directly.
    pub fn frames(&self) -> Vec<(Timestamp, &T)>
    where
        T: Sized,
    {
        let mut out = Vec::new();
        let mut cur = self.frames_head;
        while let Some(idx) = cur {
            let slot = &self.slots[idx as usize];
            if let Some(payload) = &slot.payload {
                out.push((slot.timestamp, payload));
            }
            cur = slot.next;
        }
        out
    }

    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut cur = self.frames_head;
        while let Some(idx) = cur {
            count += 1;
            cur = self.slots[idx as usize].next;
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.frames_head.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_never_exceeds_capacity() {
        let mut slab = FrameSlab::new(16);
        for i in 0..4096u64 {
            slab.push(Timestamp::from_usec(i), i);
        }
        assert!(slab.len() <= 16);
    }

    /// Sixteen pushes numbered 0..15, matching the worked example in
    /// `original_source/core/core_modules/panorama/panorama.c`'s
    /// `compaction_count` trigger (checked before it advances, chaining
    /// `delete_fourth` through the page that followed each deletion).
    #[test]
    fn sixteen_pushes_compact_per_original_counter_semantics() {
        let mut slab = FrameSlab::new(48);
        for i in 0..16u64 {
            slab.push(Timestamp::from_usec(i), i);
        }
        let survivors: Vec<u64> = slab.frames().into_iter().map(|(_, p)| *p).collect();
        assert_eq!(survivors, vec![15, 14, 13, 11, 9, 7, 3]);
    }

    #[test]
    fn history_thins_toward_the_tail() {
        let mut slab = FrameSlab::new(48);
        for i in 0..256u64 {
            slab.push(Timestamp::from_usec(i), i);
        }
        let frames = slab.frames();
        // Newest entries should be denser (smaller payload gaps) than the
        // oldest surviving entries.
        let recent_gap = frames[1].1 - frames[0].1;
        let old_gap = frames[frames.len() - 1].1 - frames[frames.len() - 2].1;
        assert!(old_gap >= recent_gap);
    }
}

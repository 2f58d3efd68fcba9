//! Tri-color mark-sweep.
//!
//! White objects are unmarked, gray objects are marked and waiting on the
//! worklist, black objects are marked and already scanned. The worklist
//! keeps marking iterative however deep the object graph is.

use object::{ObjRef, Value};

use crate::heap::{Heap, RootProvider};

impl Heap {
    /// Run a full collection. Everything not reachable from `roots` or the
    /// temporary-root stack is freed.
    pub fn collect(&mut self, roots: &dyn RootProvider) {
        let before = self.bytes_allocated;
        log::debug!(
            "-- gc begin: {before} bytes, {} objects",
            self.live_objects()
        );

        self.mark_roots(roots);
        self.trace_references();
        self.remove_white_strings();
        let (objects, bytes) = self.sweep();

        self.next_gc = (self.bytes_allocated * self.settings.grow_factor)
            .max(self.settings.min_threshold);
        self.stats.collections += 1;
        self.stats.objects_freed += objects as u64;
        self.stats.bytes_freed += bytes as u64;

        log::debug!(
            "-- gc end: collected {bytes} bytes in {objects} objects (from {before} to {}) next at {}",
            self.bytes_allocated,
            self.next_gc
        );
    }

    /// Whether the object survived the last mark phase. Only meaningful
    /// while a collection is running; sweep clears every mark.
    pub fn is_marked(&self, r: ObjRef) -> bool {
        self.slot(r).is_some_and(|s| s.marked)
    }

    fn mark_roots(&mut self, roots: &dyn RootProvider) {
        roots.visit_roots(&mut |value| self.mark_value(value));
        for i in 0..self.scratch.len() {
            let value = self.scratch[i];
            self.mark_value(value);
        }
    }

    #[inline(always)]
    fn mark_value(&mut self, value: Value) {
        if let Value::Obj(r) = value {
            self.mark_object(r);
        }
    }

    fn mark_object(&mut self, r: ObjRef) {
        let Some(slot) = self
            .slots
            .get_mut(r.index())
            .filter(|s| s.generation == r.generation() && s.object.is_some())
        else {
            return;
        };
        if slot.marked {
            return;
        }
        slot.marked = true;
        self.gray.push(r);
    }

    /// Drain the gray worklist, blackening each object by marking what it
    /// references.
    fn trace_references(&mut self) {
        let mut children = Vec::new();
        while let Some(r) = self.gray.pop() {
            if let Ok(object) = self.get(r) {
                log::trace!("blacken {r:?} ({})", object.kind());
                object.trace(|child| children.push(child));
            }
            for child in children.drain(..) {
                self.mark_value(child);
            }
        }
    }

    /// Interned strings are weak: drop the ones nobody marked so sweep can
    /// free them.
    fn remove_white_strings(&mut self) {
        let Heap { strings, slots, .. } = self;
        strings.remove_white(|r| {
            slots
                .get(r.index())
                .is_some_and(|s| s.generation == r.generation() && s.marked)
        });
    }

    /// Free every white object and reset marks on the survivors. Returns the
    /// number of objects and bytes freed.
    fn sweep(&mut self) -> (usize, usize) {
        let Heap { slots, free, .. } = self;
        let mut objects = 0;
        let mut bytes = 0;
        for (index, slot) in slots.iter_mut().enumerate() {
            let Some(object) = &slot.object else {
                continue;
            };
            if slot.marked {
                slot.marked = false;
                continue;
            }
            log::trace!("free @{index}.{} ({})", slot.generation, object.kind());
            bytes += object.heap_size();
            objects += 1;
            slot.object = None;
            slot.generation = slot.generation.wrapping_add(1);
            free.push(index as u32);
        }
        self.bytes_allocated = self.bytes_allocated.saturating_sub(bytes);
        (objects, bytes)
    }
}

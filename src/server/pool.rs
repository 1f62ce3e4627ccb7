//! Fixed-capacity slot pool for per-connection state.
//!
//! Freed slots keep their object so the next allocation reuses its buffers
//! instead of building a fresh one.

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("pool exhausted ({capacity} slots in use)")]
pub struct PoolExhausted {
    pub capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

enum Slot<T> {
    Vacant(Option<T>),
    Occupied(T),
}

pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    capacity: usize,
    in_use: usize,
}

impl<T> Pool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            capacity,
            in_use: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Takes a slot, reusing a recycled object when there is one and calling
    /// `make` otherwise. Recycled objects are returned as they were freed;
    /// the caller reinitialises them.
    pub fn alloc(&mut self, make: impl FnOnce() -> T) -> Result<SlotId, PoolExhausted> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            if let Slot::Vacant(recycled) = slot {
                let value = recycled.take().unwrap_or_else(make);
                *slot = Slot::Occupied(value);
                self.in_use += 1;
                return Ok(SlotId(index));
            }
        }

        if self.slots.len() >= self.capacity {
            return Err(PoolExhausted {
                capacity: self.capacity,
            });
        }
        self.slots.push(Slot::Occupied(make()));
        self.in_use += 1;
        Ok(SlotId(self.slots.len() - 1))
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        match self.slots.get(id.0) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        match self.slots.get_mut(id.0) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    /// Returns a slot to the pool. Freeing a vacant slot is a no-op and
    /// returns `false`.
    pub fn free(&mut self, id: SlotId) -> bool {
        let Some(slot) = self.slots.get_mut(id.0) else {
            return false;
        };
        match std::mem::replace(slot, Slot::Vacant(None)) {
            Slot::Occupied(value) => {
                *slot = Slot::Vacant(Some(value));
                self.free.push(id.0);
                self.in_use -= 1;
                true
            }
            vacant => {
                *slot = vacant;
                false
            }
        }
    }
}

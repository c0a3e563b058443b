//! Reuse allocator for short-lived simulation entities.
//!
//! Entities live in slots owned by the pool and are addressed through
//! [`PoolHandle`]s. A handle carries the slot generation it was issued for, so
//! a handle kept around after `release` can never reach the entity once it has
//! been handed out again.

/// Entities that can be returned to a pool and zeroed for reuse.
pub trait Poolable {
    fn reset(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    index: usize,
    generation: u32,
}

struct Slot<T> {
    entity: Option<T>,
    generation: u32,
    active: bool,
}

pub struct ObjectPool<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    // Slots whose entity was dropped by `set_capacity`.
    vacant: Vec<usize>,
    active_count: usize,
    capacity: usize,
    factory: Box<dyn Fn() -> T>,
}

impl<T: Poolable> ObjectPool<T> {
    /// Creates a pool and constructs `initial_size` idle entities up front.
    pub fn new(factory: impl Fn() -> T + 'static, initial_size: usize) -> Self {
        let mut pool = Self {
            slots: Vec::with_capacity(initial_size),
            free: Vec::with_capacity(initial_size),
            vacant: Vec::new(),
            active_count: 0,
            capacity: initial_size,
            factory: Box::new(factory),
        };
        pool.expand(initial_size);
        pool
    }

    /// Hands out an idle entity, constructing a new one when none is free.
    pub fn acquire(&mut self) -> PoolHandle {
        let index = match self.free.pop() {
            Some(index) => index,
            None => self.construct(),
        };
        let slot = &mut self.slots[index];
        debug_assert!(!slot.active, "free list held an active slot");
        slot.active = true;
        self.active_count += 1;
        PoolHandle {
            index,
            generation: slot.generation,
        }
    }

    /// Resets and reclaims the entity. No-op for handles that are not active.
    pub fn release(&mut self, handle: PoolHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index) else {
            return false;
        };
        if !slot.active || slot.generation != handle.generation {
            return false;
        }
        if let Some(entity) = slot.entity.as_mut() {
            entity.reset();
        }
        slot.active = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.active_count -= 1;
        self.free.push(handle.index);
        true
    }

    pub fn release_all(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if !slot.active {
                continue;
            }
            if let Some(entity) = slot.entity.as_mut() {
                entity.reset();
            }
            slot.active = false;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index);
        }
        self.active_count = 0;
    }

    /// Adds `count` freshly constructed idle entities.
    pub fn expand(&mut self, count: usize) {
        self.free.reserve(count);
        for _ in 0..count {
            let index = self.construct();
            self.free.push(index);
        }
    }

    /// Retargets the pool size. Grows the free list when short and drops idle
    /// entities when over; active entities are never touched, so the pool may
    /// stay above `capacity` until they are released.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        let total = self.total_constructed();
        if total < capacity {
            self.expand(capacity - total);
            return;
        }
        let mut surplus = total - capacity;
        while surplus > 0 {
            let Some(index) = self.free.pop() else { break };
            self.slots[index].entity = None;
            self.vacant.push(index);
            surplus -= 1;
        }
    }

    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.active && slot.generation == handle.generation)
            .and_then(|slot| slot.entity.as_ref())
    }

    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.active && slot.generation == handle.generation)
            .and_then(|slot| slot.entity.as_mut())
    }

    pub fn is_active(&self, handle: PoolHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn available_count(&self) -> usize {
        self.free.len()
    }

    pub fn total_constructed(&self) -> usize {
        self.active_count + self.free.len()
    }

    /// Target size; also the budget callers use to bound live entities.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// How many more entities fit under the target size.
    pub fn headroom(&self) -> usize {
        self.capacity.saturating_sub(self.active_count)
    }

    fn construct(&mut self) -> usize {
        let entity = (self.factory)();
        match self.vacant.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.entity = Some(entity);
                slot.generation = slot.generation.wrapping_add(1);
                index
            }
            None => {
                self.slots.push(Slot {
                    entity: Some(entity),
                    generation: 0,
                    active: false,
                });
                self.slots.len() - 1
            }
        }
    }
}

//! Specialized collection types

/// Fixed-capacity slot table with a free list
///
/// Items live in a dense vector indexed by a `u16` slot number. Slot 0 is
/// permanently reserved so that a zeroed handle can never name a live item.
/// Freed slots are recycled most-recently-freed first.
#[derive(Debug)]
pub struct SlotTable<T> {
    items: Vec<Option<T>>,
    free_slots: Vec<u16>,
}

impl<T> SlotTable<T> {
    /// Create a table with `capacity` slots, including the reserved slot 0
    pub fn with_capacity(capacity: u16) -> Self {
        let capacity = capacity.max(1);
        let mut items = Vec::with_capacity(usize::from(capacity));
        items.resize_with(usize::from(capacity), || None);

        Self {
            items,
            // Popped from the back, so slot 1 is handed out first
            free_slots: (1..capacity).rev().collect(),
        }
    }

    /// Insert an item into a free slot and return the slot number
    ///
    /// Returns the item back if every usable slot is occupied.
    pub fn insert(&mut self, item: T) -> Result<u16, T> {
        match self.free_slots.pop() {
            Some(slot) => {
                self.items[usize::from(slot)] = Some(item);
                Ok(slot)
            }
            None => Err(item),
        }
    }

    /// Remove the item in `slot`, returning it to the free list
    pub fn remove(&mut self, slot: u16) -> Option<T> {
        if slot == 0 {
            return None;
        }

        let item = self.items.get_mut(usize::from(slot))?.take()?;
        self.free_slots.push(slot);
        Some(item)
    }

    /// Get an item by slot
    pub fn get(&self, slot: u16) -> Option<&T> {
        if slot == 0 {
            return None;
        }
        self.items.get(usize::from(slot))?.as_ref()
    }

    /// Get a mutable reference to an item by slot
    pub fn get_mut(&mut self, slot: u16) -> Option<&mut T> {
        if slot == 0 {
            return None;
        }
        self.items.get_mut(usize::from(slot))?.as_mut()
    }

    /// Slot numbers of all occupied slots, in ascending order
    pub fn occupied(&self) -> Vec<u16> {
        self.items
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, item)| item.is_some())
            .map(|(slot, _)| slot as u16)
            .collect()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.items.len() - 1 - self.free_slots.len()
    }

    /// Whether no slot is occupied
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of slots, including the reserved slot 0
    pub fn capacity(&self) -> usize {
        self.items.len()
    }
}

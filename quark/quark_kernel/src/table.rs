//! The handle table.
//!
//! One table per kernel maps handle values to owned objects. Every entry
//! records its owner, and all lookups are owner-checked: a handle only
//! resolves for the process it was minted for, which is what makes handles
//! capabilities rather than plain ids.
//!
//! The table is the single critical section for ownership changes. Batch
//! removal (handle transfer) validates and removes under one lock
//! acquisition, so a transfer either happens entirely or not at all, and no
//! observer ever sees a half-moved message.
//!
//! Slots are recycled through a free list. Vacating a slot bumps its
//! generation, which invalidates every handle minted for the previous
//! occupant; a stale handle therefore fails cleanly instead of resolving to
//! whatever object reused the slot.

use parking_lot::Mutex;

use quark_core::{Handle, HandleError, Koid};

use crate::object::KernelObject;

struct Entry {
    owner: Koid,
    object: KernelObject,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

struct TableState {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

/// Generation 0 is reserved so no handle value is ever 0.
fn next_generation(generation: u32) -> u32 {
    match generation.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}

impl TableState {
    fn alloc_locked(&mut self, owner: Koid, object: KernelObject) -> Handle {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 1,
                    entry: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.entry = Some(Entry { owner, object });
        self.live += 1;
        Handle::from_parts(index, slot.generation)
    }

    fn validate_locked(&self, caller: Koid, handle: Handle) -> Result<(), HandleError> {
        let slot = self
            .slots
            .get(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .ok_or(HandleError::Invalid(handle))?;
        match slot.entry.as_ref() {
            Some(entry) if entry.owner == caller => Ok(()),
            _ => Err(HandleError::Invalid(handle)),
        }
    }

    fn get_locked(&self, caller: Koid, handle: Handle) -> Result<KernelObject, HandleError> {
        self.validate_locked(caller, handle)?;
        match self.slots[handle.index() as usize].entry.as_ref() {
            Some(entry) => Ok(entry.object.clone()),
            None => Err(HandleError::Invalid(handle)),
        }
    }

    fn remove_locked(&mut self, caller: Koid, handle: Handle) -> Result<KernelObject, HandleError> {
        self.validate_locked(caller, handle)?;
        let slot = &mut self.slots[handle.index() as usize];
        let entry = match slot.entry.take() {
            Some(entry) => entry,
            None => return Err(HandleError::Invalid(handle)),
        };
        slot.generation = next_generation(slot.generation);
        self.free.push(handle.index());
        self.live -= 1;
        Ok(entry.object)
    }
}

/// The kernel's handle table.
pub struct HandleTable {
    state: Mutex<TableState>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TableState {
                slots: Vec::new(),
                free: Vec::new(),
                live: 0,
            }),
        }
    }

    /// Mint a handle for `object`, owned by `owner`.
    ///
    /// Never returns [`Handle::INVALID`]; the table grows as needed.
    pub fn alloc(&self, owner: Koid, object: KernelObject) -> Handle {
        self.state.lock().alloc_locked(owner, object)
    }

    /// Resolve a handle to its object without consuming it.
    pub fn get(&self, caller: Koid, handle: Handle) -> Result<KernelObject, HandleError> {
        self.state.lock().get_locked(caller, handle)
    }

    /// Remove a handle, detaching its object from the table.
    ///
    /// The handle value never resolves again, even if the slot is reused.
    pub fn remove(&self, caller: Koid, handle: Handle) -> Result<KernelObject, HandleError> {
        self.state.lock().remove_locked(caller, handle)
    }

    /// Remove a batch of handles, all or nothing.
    ///
    /// Validation and removal happen under one lock acquisition: if any
    /// handle is unknown, stale, not owned by `caller`, or listed twice,
    /// nothing is removed.
    pub fn remove_many(
        &self,
        caller: Koid,
        handles: &[Handle],
    ) -> Result<Vec<KernelObject>, HandleError> {
        let mut state = self.state.lock();

        for (position, &handle) in handles.iter().enumerate() {
            if handles[..position].contains(&handle) {
                return Err(HandleError::Invalid(handle));
            }
            state.validate_locked(caller, handle)?;
        }

        let mut objects = Vec::with_capacity(handles.len());
        for &handle in handles {
            objects.push(state.remove_locked(caller, handle)?);
        }
        Ok(objects)
    }

    /// Mint handles for objects arriving by transfer, under one lock
    /// acquisition, preserving order.
    pub fn transfer_in(&self, owner: Koid, objects: Vec<KernelObject>) -> Vec<Handle> {
        let mut state = self.state.lock();
        objects
            .into_iter()
            .map(|object| state.alloc_locked(owner, object))
            .collect()
    }

    /// Check whether a handle currently resolves for `caller`.
    pub fn contains(&self, caller: Koid, handle: Handle) -> bool {
        self.state.lock().validate_locked(caller, handle).is_ok()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.state.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Endpoint;

    fn owner() -> Koid {
        Koid::from_raw(100)
    }

    fn object(koid: u64) -> KernelObject {
        let (a, _b) = Endpoint::create_pair(Koid::from_raw(koid), Koid::from_raw(koid + 1000));
        KernelObject::Channel(a)
    }

    #[test]
    fn test_alloc_get_remove() {
        let table = HandleTable::new();
        let handle = table.alloc(owner(), object(1));

        assert!(!handle.is_invalid());
        assert_eq!(table.get(owner(), handle).unwrap().koid(), Koid::from_raw(1));
        assert_eq!(table.len(), 1);

        let removed = table.remove(owner(), handle).unwrap();
        assert_eq!(removed.koid(), Koid::from_raw(1));
        assert_eq!(table.len(), 0);
        assert_eq!(
            table.get(owner(), handle).unwrap_err(),
            HandleError::Invalid(handle)
        );
    }

    #[test]
    fn test_stale_handle_rejected_after_slot_reuse() {
        let table = HandleTable::new();
        let first = table.alloc(owner(), object(1));
        table.remove(owner(), first).unwrap();

        // The slot is recycled with a bumped generation
        let second = table.alloc(owner(), object(2));
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);

        assert!(table.get(owner(), first).is_err());
        assert_eq!(
            table.get(owner(), second).unwrap().koid(),
            Koid::from_raw(2)
        );
    }

    #[test]
    fn test_owner_mismatch_rejected() {
        let table = HandleTable::new();
        let handle = table.alloc(owner(), object(1));

        let stranger = Koid::from_raw(999);
        assert_eq!(
            table.get(stranger, handle).unwrap_err(),
            HandleError::Invalid(handle)
        );
        assert_eq!(
            table.remove(stranger, handle).unwrap_err(),
            HandleError::Invalid(handle)
        );
        // Still owned and resolvable by the real owner
        assert!(table.contains(owner(), handle));
    }

    #[test]
    fn test_remove_many_is_atomic() {
        let table = HandleTable::new();
        let first = table.alloc(owner(), object(1));
        let second = table.alloc(owner(), object(2));
        let bogus = Handle::from_parts(7, 9);

        let result = table.remove_many(owner(), &[first, bogus, second]);
        assert_eq!(result.unwrap_err(), HandleError::Invalid(bogus));

        // Nothing was removed
        assert!(table.contains(owner(), first));
        assert!(table.contains(owner(), second));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_remove_many_rejects_duplicates() {
        let table = HandleTable::new();
        let handle = table.alloc(owner(), object(1));

        let result = table.remove_many(owner(), &[handle, handle]);
        assert_eq!(result.unwrap_err(), HandleError::Invalid(handle));
        assert!(table.contains(owner(), handle));
    }

    #[test]
    fn test_remove_many_removes_all() {
        let table = HandleTable::new();
        let first = table.alloc(owner(), object(1));
        let second = table.alloc(owner(), object(2));

        let objects = table.remove_many(owner(), &[first, second]).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].koid(), Koid::from_raw(1));
        assert_eq!(objects[1].koid(), Koid::from_raw(2));
        assert!(table.is_empty());
    }

    #[test]
    fn test_transfer_in_preserves_order_and_identity() {
        let table = HandleTable::new();
        let receiver = Koid::from_raw(200);

        let handles = table.transfer_in(receiver, vec![object(5), object(6)]);
        assert_eq!(handles.len(), 2);
        assert_eq!(
            table.get(receiver, handles[0]).unwrap().koid(),
            Koid::from_raw(5)
        );
        assert_eq!(
            table.get(receiver, handles[1]).unwrap().koid(),
            Koid::from_raw(6)
        );
    }

    #[test]
    fn test_empty_batch() {
        let table = HandleTable::new();
        assert!(table.remove_many(owner(), &[]).unwrap().is_empty());
        assert!(table.transfer_in(owner(), Vec::new()).is_empty());
    }
}

//! # Open-Addressed Hash Table
//!
//! This module implements the hash table that backs both string interning
//! (see [`crate::object::Interner`]) and the VM's global-variable store.
//!
//! ## Design
//! - Open addressing with linear probing, keyed by [`Rc<ObjString>`](crate::object::ObjString).
//! - Load factor is kept at or below `MAX_LOAD` (0.75); crossing it grows the
//!   backing array, doubling capacity starting from [`INITIAL_CAPACITY`].
//! - Deletions leave a [`Slot::Tombstone`] so later probes for other keys
//!   keep working; `find_entry` remembers the first tombstone it sees but
//!   keeps walking past it, so a lookup for a key inserted after the
//!   tombstone still succeeds.
//!
//! A three-variant `Slot` enum stands in for the source's trick of
//! overlaying the tombstone marker onto the value representation. There is
//! no tag bit to steal here, so the enum is the direct translation.

use std::rc::Rc;

use crate::object::ObjString;

const MAX_LOAD: f64 = 0.75;
const INITIAL_CAPACITY: usize = 8;

/// One slot of the backing array.
enum Slot<V> {
    Empty,
    Tombstone,
    Occupied(Rc<ObjString>, V),
}

/// Open-addressed hash table keyed by interned strings.
///
/// `count` includes tombstones, matching the source: deletions do not
/// decrement it, only a full rehash (which discards tombstones) resets it
/// to the live entry count.
pub struct Table<V> {
    entries: Vec<Slot<V>>,
    count: usize,
}

impl<V: Clone> Default for Table<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> Table<V> {
    pub fn new() -> Self {
        Table {
            entries: Vec::new(),
            count: 0,
        }
    }

    /// Number of occupied slots, including tombstones.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Locate the slot a `key` belongs in, honoring tombstones.
    ///
    /// Returns the index of an existing occupied slot for `key`, or the
    /// index of the first tombstone/empty slot seen along the probe chain
    /// (tombstones are preferred so inserts reclaim them).
    fn find_entry(entries: &[Slot<V>], key: &Rc<ObjString>) -> usize {
        let capacity = entries.len();
        let mut index = (key.hash as usize) % capacity;
        let mut tombstone: Option<usize> = None;

        loop {
            match &entries[index] {
                Slot::Empty => return tombstone.unwrap_or(index),
                Slot::Tombstone => {
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Slot::Occupied(k, _) => {
                    if Rc::ptr_eq(k, key) {
                        return index;
                    }
                }
            }
            index = (index + 1) % capacity;
        }
    }

    fn grow(&mut self, capacity: usize) {
        let mut new_entries: Vec<Slot<V>> = Vec::with_capacity(capacity);
        new_entries.resize_with(capacity, || Slot::Empty);

        let mut live = 0;
        for slot in self.entries.drain(..) {
            if let Slot::Occupied(key, val) = slot {
                let index = Self::find_entry(&new_entries, &key);
                new_entries[index] = Slot::Occupied(key, val);
                live += 1;
            }
        }

        self.entries = new_entries;
        self.count = live;
    }

    /// Insert or overwrite `key`. Returns `true` if `key` was not already present.
    pub fn set(&mut self, key: Rc<ObjString>, val: V) -> bool {
        if self.entries.is_empty() {
            self.grow(INITIAL_CAPACITY);
        } else if (self.count + 1) as f64 > self.entries.len() as f64 * MAX_LOAD {
            self.grow(self.entries.len() * 2);
        }

        let index = Self::find_entry(&self.entries, &key);
        let is_new = matches!(self.entries[index], Slot::Empty);
        if is_new {
            self.count += 1;
        }
        self.entries[index] = Slot::Occupied(key, val);
        is_new
    }

    pub fn get(&self, key: &Rc<ObjString>) -> Option<&V> {
        if self.count == 0 {
            return None;
        }
        match &self.entries[Self::find_entry(&self.entries, key)] {
            Slot::Occupied(_, v) => Some(v),
            _ => None,
        }
    }

    pub fn contains(&self, key: &Rc<ObjString>) -> bool {
        self.get(key).is_some()
    }

    /// Mark `key`'s slot a tombstone. Does not decrement `count` (§9).
    pub fn delete(&mut self, key: &Rc<ObjString>) -> bool {
        if self.count == 0 {
            return false;
        }
        let index = Self::find_entry(&self.entries, key);
        if matches!(self.entries[index], Slot::Occupied(..)) {
            self.entries[index] = Slot::Tombstone;
            true
        } else {
            false
        }
    }

    /// Content-equality probe used by the string interner: look for a
    /// previously-interned string with identical bytes and hash, without
    /// needing an `Rc<ObjString>` to compare pointers against yet.
    ///
    /// Advances past tombstones (the source's equivalent loops forever on
    /// one, not reproduced here, see DESIGN.md).
    pub fn find_string(&self, chars: &str, hash: u32) -> Option<Rc<ObjString>> {
        if self.count == 0 {
            return None;
        }
        let capacity = self.entries.len();
        let mut index = (hash as usize) % capacity;
        loop {
            match &self.entries[index] {
                Slot::Empty => return None,
                Slot::Tombstone => {}
                Slot::Occupied(key, _) => {
                    if key.hash == hash && key.chars.as_str() == chars {
                        return Some(key.clone());
                    }
                }
            }
            index = (index + 1) % capacity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn intern(s: &str) -> Rc<ObjString> {
        Rc::new(ObjString::new(s.to_string()))
    }

    #[test]
    fn set_and_get_round_trips() {
        let mut table: Table<Value> = Table::new();
        let key = intern("answer");
        assert!(table.set(key.clone(), Value::Number(42.0)));
        match table.get(&key) {
            Some(Value::Number(n)) => assert_eq!(*n, 42.0),
            _ => panic!("expected Number(42.0)"),
        }
    }

    #[test]
    fn re_set_same_key_is_not_new() {
        let mut table: Table<Value> = Table::new();
        let key = intern("x");
        assert!(table.set(key.clone(), Value::Nil));
        assert!(!table.set(key, Value::Bool(true)));
    }

    #[test]
    fn delete_then_reinsert_reuses_tombstone_slot() {
        let mut table: Table<Value> = Table::new();
        let a = intern("a");
        let b = intern("b");
        table.set(a.clone(), Value::Nil);
        table.set(b.clone(), Value::Nil);
        assert!(table.delete(&a));
        assert!(table.get(&a).is_none());
        // b must still resolve even though probing may cross a's tombstone.
        assert!(table.get(&b).is_some());
    }

    #[test]
    fn grows_past_load_factor() {
        let mut table: Table<Value> = Table::new();
        let keys: Vec<_> = (0..64).map(|i| intern(&format!("k{i}"))).collect();
        for k in &keys {
            table.set(k.clone(), Value::Nil);
        }
        for k in &keys {
            assert!(table.get(k).is_some());
        }
    }

    #[test]
    fn find_string_dedupes_by_content() {
        let mut interned: Table<()> = Table::new();
        let a = intern("hello");
        interned.set(a.clone(), ());
        let found = interned.find_string("hello", a.hash);
        assert!(found.is_some());
        assert!(Rc::ptr_eq(&found.unwrap(), &a));
    }
}

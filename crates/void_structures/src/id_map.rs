//! IdMap - open-addressing `u64 -> u64` table
//!
//! Keys and values live in two parallel arrays. Lookups probe linearly from
//! `key % capacity`, wrapping around, until they hit the key, an empty slot,
//! or have visited every slot.
//!
//! ```text
//!          +---+---+---+---+---+
//!  Keys    | 0 | 1 | 2 |...| n |
//!          +---+---+---+---+---+
//!  Values  | 0 | 1 | 2 |...| n |
//!          +---+---+---+---+---+
//! ```
//!
//! Removal leaves a tombstone so probe chains stay intact. Tombstones count
//! toward the load factor (0.7) and are dropped by the next rehash. A rehash
//! doubles the capacity when the live entries alone would cross the load
//! factor, and otherwise rebuilds at the same size to clear tombstones.

use std::collections::TryReserveError;

/// Marker for a slot that never held a key
pub const EMPTY: u64 = u64::MAX;
/// Marker for a slot whose key was removed
pub const TOMBSTONE: u64 = u64::MAX - 1;

const INITIAL_CAPACITY: usize = 16;
const MAX_LOAD_FACTOR: f32 = 0.7;

/// Open-addressing map from 64-bit keys to 64-bit values
#[derive(Clone, Default)]
pub struct IdMap {
    keys: Vec<u64>,
    values: Vec<u64>,
    /// Live entries
    len: usize,
    /// Live entries plus tombstones
    used: usize,
}

impl IdMap {
    /// Create an empty map; no memory is allocated until the first insert
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots in the table
    #[inline]
    pub fn capacity(&self) -> usize {
        self.keys.len()
    }

    /// Find the slot holding `key`, skipping tombstones
    fn find(&self, key: u64) -> Option<usize> {
        let n = self.keys.len();
        if n == 0 || key == EMPTY || key == TOMBSTONE {
            return None;
        }

        let first = (key % n as u64) as usize;
        let mut idx = first;
        loop {
            match self.keys[idx] {
                k if k == key => return Some(idx),
                EMPTY => return None,
                _ => {}
            }
            idx = (idx + 1) % n;
            if idx == first {
                return None;
            }
        }
    }

    /// Find where `key` should be written: its current slot, or else the
    /// first tombstone on its probe chain, or else the empty slot ending it
    fn find_insert_slot(&self, key: u64) -> Option<usize> {
        let n = self.keys.len();
        if n == 0 {
            return None;
        }

        let first = (key % n as u64) as usize;
        let mut idx = first;
        let mut reusable = None;
        loop {
            match self.keys[idx] {
                k if k == key => return Some(idx),
                EMPTY => return reusable.or(Some(idx)),
                TOMBSTONE => {
                    if reusable.is_none() {
                        reusable = Some(idx);
                    }
                }
                _ => {}
            }
            idx = (idx + 1) % n;
            if idx == first {
                return reusable;
            }
        }
    }

    /// Get the value for `key`
    pub fn get(&self, key: u64) -> Option<u64> {
        self.find(key).map(|idx| self.values[idx])
    }

    /// Get the value for `key`, or `default` if absent
    pub fn lookup(&self, key: u64, default: u64) -> u64 {
        self.get(key).unwrap_or(default)
    }

    /// Check if `key` is present
    pub fn contains(&self, key: u64) -> bool {
        self.find(key).is_some()
    }

    /// Insert or overwrite `key -> value`
    ///
    /// # Panics
    /// If `key` is [`EMPTY`] or [`TOMBSTONE`].
    pub fn insert(&mut self, key: u64, value: u64) -> Result<(), TryReserveError> {
        assert!(key != EMPTY && key != TOMBSTONE, "IdMap key {key:#x} is reserved");

        if let Some(idx) = self.find(key) {
            self.values[idx] = value;
            return Ok(());
        }

        if self.keys.is_empty() {
            self.rehash(INITIAL_CAPACITY)?;
        } else if self.exceeds_load(self.used + 1) {
            // Mostly tombstones: purge them at the current size instead of doubling
            let capacity = if self.exceeds_load(self.len + 1) {
                self.keys.len() * 2
            } else {
                self.keys.len()
            };
            self.rehash(capacity)?;
        }

        loop {
            match self.find_insert_slot(key) {
                Some(idx) => {
                    if self.keys[idx] == EMPTY {
                        self.used += 1;
                    }
                    self.keys[idx] = key;
                    self.values[idx] = value;
                    self.len += 1;
                    return Ok(());
                }
                // Every slot is live; only reachable with tiny tables
                None => self.rehash(self.keys.len() * 2)?,
            }
        }
    }

    /// Remove `key`, returning its value
    pub fn remove(&mut self, key: u64) -> Option<u64> {
        let idx = self.find(key)?;
        self.keys[idx] = TOMBSTONE;
        self.len -= 1;
        Some(std::mem::replace(&mut self.values[idx], 0))
    }

    /// Remove every entry, keeping the allocation
    pub fn clear(&mut self) {
        self.keys.fill(EMPTY);
        self.values.fill(0);
        self.len = 0;
        self.used = 0;
    }

    /// Iterate over live `(key, value)` pairs in slot order
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.keys
            .iter()
            .zip(self.values.iter())
            .filter(|(k, _)| **k != EMPTY && **k != TOMBSTONE)
            .map(|(k, v)| (*k, *v))
    }

    #[inline]
    fn exceeds_load(&self, used: usize) -> bool {
        used as f32 / self.keys.len() as f32 > MAX_LOAD_FACTOR
    }

    /// Rebuild the table at `new_capacity`, reinserting live entries and
    /// dropping tombstones
    ///
    /// The new arrays are fully built before they replace the old ones, so an
    /// allocation failure leaves the map exactly as it was.
    fn rehash(&mut self, new_capacity: usize) -> Result<(), TryReserveError> {
        let mut keys = Vec::new();
        keys.try_reserve_exact(new_capacity)?;
        keys.resize(new_capacity, EMPTY);
        let mut values = Vec::new();
        values.try_reserve_exact(new_capacity)?;
        values.resize(new_capacity, 0);

        for (key, value) in self.iter() {
            let mut idx = (key % new_capacity as u64) as usize;
            while keys[idx] != EMPTY {
                idx = (idx + 1) % new_capacity;
            }
            keys[idx] = key;
            values[idx] = value;
        }

        self.keys = keys;
        self.values = values;
        self.used = self.len;
        Ok(())
    }
}

impl core::fmt::Debug for IdMap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_map() {
        let map = IdMap::new();
        assert_eq!(map.get(1), None);
        assert_eq!(map.lookup(1, 99), 99);
        assert!(!map.contains(1));
        assert_eq!(map.capacity(), 0);
    }

    #[test]
    fn test_insert_lookup_overwrite() {
        let mut map = IdMap::new();
        map.insert(b'h' as u64, 1).unwrap();
        map.insert(b'e' as u64, 2).unwrap();
        map.insert(b'h' as u64, 3).unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map.lookup(b'h' as u64, 0), 3);
        assert_eq!(map.lookup(b'e' as u64, 0), 2);
        assert_eq!(map.lookup(b'H' as u64, 0), 0);
        assert_eq!(map.capacity(), 16);
    }

    #[test]
    fn test_remove_leaves_chain_intact() {
        let mut map = IdMap::new();
        // Three keys that collide on slot 1 of a 16-slot table
        map.insert(1, 10).unwrap();
        map.insert(17, 20).unwrap();
        map.insert(33, 30).unwrap();

        assert_eq!(map.remove(17), Some(20));
        assert_eq!(map.get(17), None);
        assert_eq!(map.get(33), Some(30));

        // Re-adding 33 must update in place, not land in the tombstone
        map.insert(33, 31).unwrap();
        assert_eq!(map.remove(33), Some(31));
        assert_eq!(map.get(33), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_growth_rehashes_live_entries() {
        let mut map = IdMap::new();
        for k in 0..100u64 {
            map.insert(k * 7, k).unwrap();
        }
        for k in (0..100u64).step_by(2) {
            map.remove(k * 7);
        }
        for k in 100..200u64 {
            map.insert(k * 7, k).unwrap();
        }

        assert_eq!(map.len(), 150);
        assert!(map.capacity().is_power_of_two());
        assert!((map.len() as f32) / (map.capacity() as f32) <= MAX_LOAD_FACTOR);
        for k in 0..200u64 {
            let expected = if k < 100 && k % 2 == 0 { None } else { Some(k) };
            assert_eq!(map.get(k * 7), expected, "key {}", k * 7);
        }
    }

    #[test]
    fn test_tombstone_churn_does_not_fill_table() {
        let mut map = IdMap::new();
        for k in 0..10_000u64 {
            map.insert(k, k).unwrap();
            map.remove(k);
        }
        assert!(map.is_empty());
        assert!(map.capacity() <= 64);
        assert_eq!(map.get(9_999), None);
    }

    #[test]
    fn test_matches_reference_model() {
        // Deterministic pseudo-random add/remove sequence
        let mut state = 0x2545_f491_4f6c_dd1du64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        let mut map = IdMap::new();
        let mut model: HashMap<u64, u64> = HashMap::new();
        for _ in 0..20_000 {
            let r = next();
            let key = r % 512;
            if r & (1 << 40) == 0 {
                map.insert(key, r).unwrap();
                model.insert(key, r);
            } else {
                assert_eq!(map.remove(key), model.remove(&key));
            }
        }

        assert_eq!(map.len(), model.len());
        for key in 0..512 {
            assert_eq!(map.get(key), model.get(&key).copied());
        }
    }

    #[test]
    fn test_clear_and_iter() {
        let mut map = IdMap::new();
        map.insert(1, 2).unwrap();
        map.insert(3, 4).unwrap();
        let mut pairs: Vec<_> = map.iter().collect();
        pairs.sort();
        assert_eq!(pairs, vec![(1, 2), (3, 4)]);

        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.iter().count(), 0);
        map.insert(5, 6).unwrap();
        assert_eq!(map.get(5), Some(6));
    }

    #[test]
    #[should_panic]
    fn test_reserved_key_panics() {
        let mut map = IdMap::new();
        let _ = map.insert(EMPTY, 1);
    }
}

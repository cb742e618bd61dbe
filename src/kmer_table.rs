
use crate::errors::{GraphError, GraphResult};
use crate::kmer::KmerKey;

/// Initial prime capacity for a fresh table.
const INITIAL_CAPACITY: usize = 37;

/// Keys usable in the open-addressing tables.
pub trait TableKey: Clone + PartialEq {
    /// Polynomial hash over the key's symbol values.
    fn table_hash(&self) -> u64;
}

impl TableKey for KmerKey {
    fn table_hash(&self) -> u64 {
        let mut h: u64 = 0;
        for &b in self.bases() {
            h = h.wrapping_mul(65599).wrapping_add(b as u64);
        }
        h.wrapping_mul(65599).wrapping_add(self.number() as u64)
    }
}

impl TableKey for (KmerKey, KmerKey) {
    fn table_hash(&self) -> u64 {
        self.0.table_hash()
            .wrapping_mul(65599)
            .wrapping_add(self.1.table_hash())
    }
}

#[derive(Clone)]
enum Slot<K, V> {
    Empty,
    /// Tombstone left behind by a removal so other probe chains stay valid.
    Deleted,
    Occupied {
        key: K,
        value: V,
        order: u64
    }
}

/// Open-addressing hash table with prime capacity, quadratic-step probing,
/// tombstoned deletion, and a per-table insertion-order counter that
/// survives growth. Inserting a key that is already present reports
/// `AlreadyExists`; callers use that as a get-or-create signal.
pub struct KmerTable<K: TableKey, V> {
    slots: Vec<Slot<K, V>>,
    len: usize,
    tombstones: usize,
    next_order: u64
}

/// Table mapping a k-mer occurrence to a vertex.
pub type VertexTable<V> = KmerTable<KmerKey, V>;
/// Table mapping a (source, dest) k-mer pair to an edge.
pub type EdgeTable<V> = KmerTable<(KmerKey, KmerKey), V>;

/// Next prime at or above `n`, by trial division.
fn next_prime(n: usize) -> usize {
    let mut candidate = if n <= 2 { 2 } else { n | 1 };
    loop {
        let mut is_prime = candidate >= 2;
        let mut d = 3;
        while d * d <= candidate {
            if candidate % d == 0 {
                is_prime = false;
                break;
            }
            d += 2;
        }
        if candidate == 2 || (is_prime && candidate % 2 != 0) {
            return candidate;
        }
        candidate += 2;
    }
}

impl<K: TableKey, V> KmerTable<K, V> {
    pub fn new() -> KmerTable<K, V> {
        KmerTable::with_capacity(INITIAL_CAPACITY)
    }

    /// Creates a table whose capacity is the next prime at or above `capacity`.
    pub fn with_capacity(capacity: usize) -> KmerTable<K, V> {
        let prime_capacity = next_prime(capacity.max(INITIAL_CAPACITY));
        let mut slots = Vec::with_capacity(prime_capacity);
        slots.resize_with(prime_capacity, || Slot::Empty);
        KmerTable {
            slots,
            len: 0,
            tombstones: 0,
            next_order: 0
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Probes for `key`, returning the slot index of the match or of the
    /// first empty slot, with the first tombstone seen along the way.
    fn probe(&self, key: &K) -> (Option<usize>, Option<usize>) {
        let capacity = self.slots.len();
        let mut index = (key.table_hash() % capacity as u64) as usize;
        let mut first_deleted: Option<usize> = None;
        for attempt in 0..capacity {
            match &self.slots[index] {
                Slot::Empty => {
                    return (Some(index), first_deleted);
                },
                Slot::Deleted => {
                    if first_deleted.is_none() {
                        first_deleted = Some(index);
                    }
                },
                Slot::Occupied { key: occupant, .. } => {
                    if occupant == key {
                        return (Some(index), first_deleted);
                    }
                }
            };
            index = (index + 2 * attempt + 1) % capacity;
        }
        (None, first_deleted)
    }

    /// Inserts without growing.
    fn insert_no_grow(&mut self, key: K, value: V, order: u64) -> GraphResult<()> {
        let (found, first_deleted) = self.probe(&key);
        let target = match found {
            Some(index) => {
                if let Slot::Occupied { .. } = self.slots[index] {
                    return Err(GraphError::AlreadyExists);
                }
                // prefer reusing a tombstone over the empty slot
                match first_deleted {
                    Some(deleted_index) => {
                        self.tombstones -= 1;
                        deleted_index
                    },
                    None => index
                }
            },
            None => {
                match first_deleted {
                    Some(deleted_index) => {
                        self.tombstones -= 1;
                        deleted_index
                    },
                    None => {
                        return Err(GraphError::TableFull);
                    }
                }
            }
        };
        self.slots[target] = Slot::Occupied { key, value, order };
        self.len += 1;
        Ok(())
    }

    /// Inserts `key` → `value`. Grows transparently when the table reaches
    /// half load or probing finds no free slot; existing associations and
    /// their orders are preserved across growth.
    pub fn insert(&mut self, key: K, value: V) -> GraphResult<()>
    where V: Clone {
        if 2 * (self.len + self.tombstones) >= self.slots.len() {
            self.grow();
        }
        let order = self.next_order;
        loop {
            match self.insert_no_grow(key.clone(), value.clone(), order) {
                Ok(()) => {
                    self.next_order += 1;
                    return Ok(());
                },
                Err(GraphError::TableFull) => {
                    self.grow();
                },
                Err(e) => {
                    return Err(e);
                }
            };
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        match self.probe(key) {
            (Some(index), _) => {
                match &self.slots[index] {
                    Slot::Occupied { value, .. } => Some(value),
                    _ => None
                }
            },
            _ => None
        }
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        match self.probe(key) {
            (Some(index), _) => {
                match &mut self.slots[index] {
                    Slot::Occupied { value, .. } => Some(value),
                    _ => None
                }
            },
            _ => None
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Removes `key`, leaving a tombstone in its slot.
    pub fn remove(&mut self, key: &K) -> GraphResult<V> {
        let index = match self.probe(key) {
            (Some(index), _) => index,
            _ => {
                return Err(GraphError::NotFound);
            }
        };
        if !matches!(self.slots[index], Slot::Occupied { .. }) {
            return Err(GraphError::NotFound);
        }
        let removed = std::mem::replace(&mut self.slots[index], Slot::Deleted);
        self.len -= 1;
        self.tombstones += 1;
        match removed {
            Slot::Occupied { value, .. } => Ok(value),
            _ => unreachable!()
        }
    }

    /// All entries sorted by insertion order, for deterministic dumps.
    pub fn ordered_entries(&self) -> Vec<(&K, &V)> {
        let mut entries: Vec<(u64, &K, &V)> = self.slots.iter()
            .filter_map(|slot| {
                match slot {
                    Slot::Occupied { key, value, order } => Some((*order, key, value)),
                    _ => None
                }
            })
            .collect();
        entries.sort_by_key(|&(order, _, _)| order);
        entries.into_iter()
            .map(|(_, key, value)| (key, value))
            .collect()
    }

    /// Rehashes into the next prime at or above double the capacity.
    fn grow(&mut self) {
        let new_capacity = next_prime(2 * self.slots.len() + 1);
        let mut new_slots: Vec<Slot<K, V>> = Vec::with_capacity(new_capacity);
        new_slots.resize_with(new_capacity, || Slot::Empty);
        let old_slots = std::mem::replace(&mut self.slots, new_slots);
        self.len = 0;
        self.tombstones = 0;
        for slot in old_slots.into_iter() {
            if let Slot::Occupied { key, value, order } = slot {
                // capacity doubled, so re-probing cannot run out of slots
                self.insert_no_grow(key, value, order)
                    .unwrap_or_else(|_| panic!("rehash cannot collide or fill"));
            }
        }
    }
}

impl<K: TableKey, V> Default for KmerTable<K, V> {
    fn default() -> Self {
        KmerTable::new()
    }
}

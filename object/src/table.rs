use crate::{ObjRef, Value};

const TABLE_MAX_LOAD: f64 = 0.75;

/// FNV-1a over the string's bytes.
pub fn hash_string(chars: &str) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for &byte in chars.as_bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

/// An interned string used as a table key, with its hash cached so the table
/// never has to reach into the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key {
    pub string: ObjRef,
    pub hash: u32,
}

/// One bucket. Empty is `key: None, value: Nil`; a tombstone is
/// `key: None, value: Bool(true)`.
#[derive(Debug, Clone, Copy)]
struct Entry {
    key: Option<ObjRef>,
    hash: u32,
    value: Value,
}

impl Entry {
    const EMPTY: Entry = Entry {
        key: None,
        hash: 0,
        value: Value::Nil,
    };

    #[inline(always)]
    fn is_tombstone(&self) -> bool {
        self.key.is_none() && !self.value.is_nil()
    }
}

/// Open-addressing hash table from interned strings to values.
///
/// Linear probing over a power-of-two capacity. Deleted buckets become
/// tombstones, which keep probe sequences intact and count toward the load
/// factor until the next resize drops them.
#[derive(Debug, Clone, Default)]
pub struct Table {
    /// Live entries plus tombstones.
    count: usize,
    entries: Vec<Entry>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Occupied buckets including tombstones.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.key.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes owned by the bucket array, for heap accounting.
    pub fn owned_bytes(&self) -> usize {
        self.entries.capacity() * size_of::<Entry>()
    }

    pub fn get(&self, key: Key) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        let entry = &self.entries[find_entry(&self.entries, key)];
        entry.key.map(|_| entry.value)
    }

    pub fn contains(&self, key: Key) -> bool {
        self.get(key).is_some()
    }

    /// Insert or overwrite. Returns `true` if the key was not present.
    pub fn set(&mut self, key: Key, value: Value) -> bool {
        if (self.count + 1) as f64 > self.capacity() as f64 * TABLE_MAX_LOAD {
            let capacity = grow_capacity(self.capacity());
            self.adjust_capacity(capacity);
        }

        let idx = find_entry(&self.entries, key);
        let entry = &mut self.entries[idx];
        let is_new_key = entry.key.is_none();
        // Reusing a tombstone does not change the count.
        if is_new_key && entry.value.is_nil() {
            self.count += 1;
        }

        *entry = Entry {
            key: Some(key.string),
            hash: key.hash,
            value,
        };
        is_new_key
    }

    /// Remove `key`, leaving a tombstone. Returns `true` if it was present.
    pub fn delete(&mut self, key: Key) -> bool {
        if self.count == 0 {
            return false;
        }
        let idx = find_entry(&self.entries, key);
        let entry = &mut self.entries[idx];
        if entry.key.is_none() {
            return false;
        }
        *entry = Entry {
            key: None,
            hash: 0,
            value: Value::Bool(true),
        };
        true
    }

    /// Copy every live entry of `self` into `to`, overwriting.
    pub fn add_all(&self, to: &mut Table) {
        for (key, value) in self.iter() {
            to.set(key, value);
        }
    }

    /// Look up an interned string by content, before it exists as a key.
    ///
    /// `resolve` maps a key back to its characters.
    pub fn find_string<'s>(
        &self,
        chars: &str,
        hash: u32,
        resolve: impl Fn(ObjRef) -> Option<&'s str>,
    ) -> Option<ObjRef> {
        if self.count == 0 {
            return None;
        }
        let mask = self.capacity() - 1;
        let mut index = hash as usize & mask;
        loop {
            let entry = &self.entries[index];
            match entry.key {
                None if entry.value.is_nil() => return None,
                None => {}
                Some(key) => {
                    if entry.hash == hash
                        && resolve(key).is_some_and(|s| s.len() == chars.len() && s == chars)
                    {
                        return Some(key);
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    /// Delete every entry whose key is not marked.
    pub fn remove_white(&mut self, is_marked: impl Fn(ObjRef) -> bool) {
        for entry in self.entries.iter_mut() {
            if let Some(key) = entry.key {
                if !is_marked(key) {
                    *entry = Entry {
                        key: None,
                        hash: 0,
                        value: Value::Bool(true),
                    };
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, Value)> + '_ {
        self.entries.iter().filter_map(|e| {
            e.key.map(|string| {
                (
                    Key {
                        string,
                        hash: e.hash,
                    },
                    e.value,
                )
            })
        })
    }

    fn adjust_capacity(&mut self, capacity: usize) {
        let mut entries = vec![Entry::EMPTY; capacity];
        self.count = 0;
        for old in &self.entries {
            let Some(string) = old.key else { continue };
            let key = Key {
                string,
                hash: old.hash,
            };
            let idx = find_entry(&entries, key);
            entries[idx] = *old;
            self.count += 1;
        }
        self.entries = entries;
    }
}

fn grow_capacity(capacity: usize) -> usize {
    if capacity < 8 { 8 } else { capacity * 2 }
}

/// Index of the bucket holding `key`, or of the bucket an insert should use:
/// the first tombstone seen, else the empty bucket ending the probe.
fn find_entry(entries: &[Entry], key: Key) -> usize {
    let mask = entries.len() - 1;
    let mut index = key.hash as usize & mask;
    let mut tombstone = None;
    loop {
        let entry = &entries[index];
        match entry.key {
            Some(k) if k == key.string => return index,
            Some(_) => {}
            None if entry.is_tombstone() => {
                tombstone.get_or_insert(index);
            }
            None => return tombstone.unwrap_or(index),
        }
        index = (index + 1) & mask;
    }
}

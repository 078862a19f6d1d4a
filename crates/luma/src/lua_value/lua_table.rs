// Table storage: a lazily allocated array part for the 1..n prefix and an
// ahash map for everything else. Nil assignment deletes; nil and NaN keys
// are rejected by the VM layer before reaching raw_set.

use super::LuaValue;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Default)]
pub struct LuaTable {
    array: Option<Vec<LuaValue>>,
    hash: Option<HashMap<LuaValue, LuaValue, ahash::RandomState>>,
    metatable: Option<Rc<RefCell<LuaTable>>>,
}

impl LuaTable {
    pub fn new() -> Self {
        LuaTable {
            array: None,
            hash: None,
            metatable: None,
        }
    }

    pub fn metatable(&self) -> Option<Rc<RefCell<LuaTable>>> {
        self.metatable.clone()
    }

    pub fn set_metatable(&mut self, mt: Option<Rc<RefCell<LuaTable>>>) {
        self.metatable = mt;
    }

    fn array_index(key: &LuaValue) -> Option<usize> {
        match key.as_integer() {
            Some(i) if i >= 1 => Some(i as usize),
            _ => None,
        }
    }

    /// Raw read, no metamethods. Missing keys read as nil.
    pub fn raw_get(&self, key: &LuaValue) -> LuaValue {
        if let Some(idx) = Self::array_index(key) {
            if let Some(arr) = &self.array {
                if idx <= arr.len() {
                    return arr[idx - 1].clone();
                }
            }
            // Fall through for integer keys beyond the array part: an
            // integral float key must find the same slot as its int twin.
            return self
                .hash
                .as_ref()
                .and_then(|h| h.get(&LuaValue::Integer(idx as i64)).cloned())
                .unwrap_or(LuaValue::Nil);
        }
        self.hash
            .as_ref()
            .and_then(|h| h.get(key).cloned())
            .unwrap_or(LuaValue::Nil)
    }

    /// Raw write, no metamethods. Writing nil removes the entry.
    pub fn raw_set(&mut self, key: LuaValue, value: LuaValue) {
        if let Some(idx) = Self::array_index(&key) {
            let arr = self.array.get_or_insert_with(Vec::new);
            if idx <= arr.len() {
                arr[idx - 1] = value;
                if idx == arr.len() {
                    // Trim a trailing nil so the array part stays dense-ish.
                    while matches!(arr.last(), Some(LuaValue::Nil)) {
                        arr.pop();
                    }
                }
                return;
            }
            if idx == arr.len() + 1 {
                if value.is_nil() {
                    return;
                }
                arr.push(value);
                // Migrate any hash entries that now extend the array part.
                if let Some(hash) = &mut self.hash {
                    let mut next = arr.len() as i64 + 1;
                    while let Some(v) = hash.remove(&LuaValue::Integer(next)) {
                        arr.push(v);
                        next += 1;
                    }
                }
                return;
            }
            // Sparse integer key: store normalized in the hash part.
            let hash = self.hash.get_or_insert_with(HashMap::default);
            if value.is_nil() {
                hash.remove(&LuaValue::Integer(idx as i64));
            } else {
                hash.insert(LuaValue::Integer(idx as i64), value);
            }
            return;
        }

        let hash = self.hash.get_or_insert_with(HashMap::default);
        if value.is_nil() {
            hash.remove(&key);
        } else {
            hash.insert(key, value);
        }
    }

    pub fn raw_get_int(&self, idx: i64) -> LuaValue {
        self.raw_get(&LuaValue::Integer(idx))
    }

    pub fn raw_set_int(&mut self, idx: i64, value: LuaValue) {
        self.raw_set(LuaValue::Integer(idx), value)
    }

    pub fn raw_get_str(&self, key: &str) -> LuaValue {
        self.hash
            .as_ref()
            .and_then(|h| h.get(&LuaValue::str(key)).cloned())
            .unwrap_or(LuaValue::Nil)
    }

    pub fn raw_set_str(&mut self, key: &str, value: LuaValue) {
        self.raw_set(LuaValue::str(key), value)
    }

    /// A border of the table: some `n` with `t[n] ~= nil` and `t[n+1] == nil`
    /// (0 when `t[1] == nil`). The `#` operator returns this.
    pub fn border(&self) -> i64 {
        let mut n = self
            .array
            .as_ref()
            .map(|arr| {
                let mut len = arr.len();
                while len > 0 && arr[len - 1].is_nil() {
                    len -= 1;
                }
                len
            })
            .unwrap_or(0) as i64;
        if let Some(hash) = &self.hash {
            while hash.contains_key(&LuaValue::Integer(n + 1)) {
                n += 1;
            }
        }
        n
    }

    /// Total number of stored entries (both parts).
    pub fn entry_count(&self) -> usize {
        let array_live = self
            .array
            .as_ref()
            .map(|a| a.iter().filter(|v| !v.is_nil()).count())
            .unwrap_or(0);
        array_live + self.hash.as_ref().map(|h| h.len()).unwrap_or(0)
    }

    /// Stateless iteration for `next`. `None` key starts the traversal;
    /// returns `None` when exhausted. Order over the hash part is undefined
    /// and stable only while the table is not mutated.
    pub fn next(&self, key: Option<&LuaValue>) -> Option<(LuaValue, LuaValue)> {
        let array_len = self.array.as_ref().map(|a| a.len()).unwrap_or(0);

        let hash_first = || {
            self.hash.as_ref().and_then(|h| {
                h.iter()
                    .next()
                    .map(|(k, v)| (k.clone(), v.clone()))
            })
        };

        let key = match key {
            None => {
                // First non-nil array slot, else first hash entry.
                if let Some(arr) = &self.array {
                    for (i, v) in arr.iter().enumerate() {
                        if !v.is_nil() {
                            return Some((LuaValue::Integer(i as i64 + 1), v.clone()));
                        }
                    }
                }
                return hash_first();
            }
            Some(k) => k,
        };

        if let Some(idx) = Self::array_index(key) {
            if idx <= array_len {
                if let Some(arr) = &self.array {
                    for (i, v) in arr.iter().enumerate().skip(idx) {
                        if !v.is_nil() {
                            return Some((LuaValue::Integer(i as i64 + 1), v.clone()));
                        }
                    }
                }
                return hash_first();
            }
        }

        // Resume inside the hash part: scan to the key, return its successor.
        let hash = self.hash.as_ref()?;
        let probe = if let Some(idx) = Self::array_index(key) {
            LuaValue::Integer(idx as i64)
        } else {
            key.clone()
        };
        let mut iter = hash.iter();
        for (k, _) in iter.by_ref() {
            if *k == probe {
                return iter.next().map(|(k, v)| (k.clone(), v.clone()));
            }
        }
        None
    }

    /// Snapshot of all pairs, array part first. Used by the GC mark pass and
    /// by host-side decoding.
    pub fn iter_all(&self) -> Vec<(LuaValue, LuaValue)> {
        let mut out = Vec::with_capacity(self.entry_count());
        if let Some(arr) = &self.array {
            for (i, v) in arr.iter().enumerate() {
                if !v.is_nil() {
                    out.push((LuaValue::Integer(i as i64 + 1), v.clone()));
                }
            }
        }
        if let Some(hash) = &self.hash {
            for (k, v) in hash.iter() {
                out.push((k.clone(), v.clone()));
            }
        }
        out
    }

    /// Shift-insert into the sequence part (for `table.insert(t, pos, v)`).
    pub fn sequence_insert(&mut self, pos: i64, value: LuaValue) {
        let border = self.border();
        let mut i = border;
        while i >= pos {
            let prev = self.raw_get_int(i);
            self.raw_set_int(i + 1, prev);
            i -= 1;
        }
        self.raw_set_int(pos, value);
    }

    /// Shift-remove from the sequence part (for `table.remove(t, pos)`).
    pub fn sequence_remove(&mut self, pos: i64) -> LuaValue {
        let border = self.border();
        let removed = self.raw_get_int(pos);
        let mut i = pos;
        while i < border {
            let next = self.raw_get_int(i + 1);
            self.raw_set_int(i, next);
            i += 1;
        }
        if border >= pos {
            self.raw_set_int(border, LuaValue::Nil);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn border_of_dense_sequence() {
        let mut t = LuaTable::new();
        for i in 1..=5 {
            t.raw_set_int(i, LuaValue::Integer(i * 10));
        }
        assert_eq!(t.border(), 5);
        assert_eq!(t.raw_get_int(3), LuaValue::Integer(30));
    }

    #[test]
    fn nil_assignment_removes() {
        let mut t = LuaTable::new();
        t.raw_set_str("k", LuaValue::Integer(1));
        t.raw_set_str("k", LuaValue::Nil);
        assert!(t.raw_get_str("k").is_nil());
        assert_eq!(t.entry_count(), 0);
    }

    #[test]
    fn hash_part_migrates_into_array() {
        let mut t = LuaTable::new();
        t.raw_set_int(2, LuaValue::Integer(2));
        t.raw_set_int(3, LuaValue::Integer(3));
        assert_eq!(t.border(), 0);
        t.raw_set_int(1, LuaValue::Integer(1));
        assert_eq!(t.border(), 3);
    }

    #[test]
    fn float_key_aliases_integer_key() {
        let mut t = LuaTable::new();
        t.raw_set(LuaValue::Float(2.0), LuaValue::str("two"));
        assert_eq!(t.raw_get_int(2), LuaValue::str("two"));
    }

    #[test]
    fn next_walks_everything() {
        let mut t = LuaTable::new();
        t.raw_set_int(1, LuaValue::Integer(10));
        t.raw_set_int(2, LuaValue::Integer(20));
        t.raw_set_str("x", LuaValue::Integer(30));
        let mut seen = 0;
        let mut key: Option<LuaValue> = None;
        while let Some((k, _)) = t.next(key.as_ref()) {
            seen += 1;
            key = Some(k);
        }
        assert_eq!(seen, 3);
    }
}

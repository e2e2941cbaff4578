// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! A wrapper around a `typed_generational_arena::Arena` that also provides fast lookup by name.
//!
//! Schema types are stored in a `MappedArena` and refer to each other by name (and can be resolved
//! to an arena index). Since no type holds a direct link to another, cyclic type graphs such as
//! `Post -> User -> Post` need no special treatment while registering types.

use std::{collections::HashMap, ops};

use serde::{Deserialize, Serialize};

use typed_generational_arena::{Arena, IgnoreGeneration, Index};

pub type SerializableSlab<T> = Arena<T, usize, IgnoreGeneration>;
pub type SerializableSlabIndex<T> = Index<T, usize, IgnoreGeneration>;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MappedArena<V> {
    values: SerializableSlab<V>,
    map: HashMap<String, SerializableSlabIndex<V>>,
}

impl<V> MappedArena<V> {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn get_id(&self, key: &str) -> Option<SerializableSlabIndex<V>> {
        self.map.get(key).copied()
    }

    pub fn get_by_key(&self, key: &str) -> Option<&V> {
        self.get_id(key).map(|id| &self[id])
    }

    /// Add a value under `key`.
    ///
    /// Returns `Err` with the existing index if a value is already registered under the key (the
    /// arena is left untouched in that case).
    pub fn try_add(
        &mut self,
        key: &str,
        value: V,
    ) -> Result<SerializableSlabIndex<V>, SerializableSlabIndex<V>> {
        if let Some(existing) = self.get_id(key) {
            return Err(existing);
        }

        let id = self.values.insert(value);
        self.map.insert(key.to_string(), id);
        Ok(id)
    }

    pub fn iter(&self) -> typed_generational_arena::Iter<'_, V, usize, IgnoreGeneration> {
        self.values.iter()
    }
}

impl<V> Default for MappedArena<V> {
    fn default() -> Self {
        MappedArena {
            values: SerializableSlab::new(),
            map: HashMap::default(),
        }
    }
}

impl<V> ops::Index<SerializableSlabIndex<V>> for MappedArena<V> {
    type Output = V;

    #[inline]
    fn index(&self, id: SerializableSlabIndex<V>) -> &V {
        &self.values[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_keys() {
        let mut arena = MappedArena::default();

        assert!(arena.try_add("Post", 1).is_ok());
        assert!(arena.try_add("Post", 2).is_err());
        assert_eq!(arena.get_by_key("Post"), Some(&1));
        assert_eq!(arena.len(), 1);
    }
}

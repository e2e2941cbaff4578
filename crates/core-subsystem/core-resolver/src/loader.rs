// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Request-scoped batching of data fetches ("dataloader").
//!
//! Resolvers queue keys on a loader through [`LoaderHandle::load`] and get a deferred value back.
//! At the end of each wave, the engine flushes every loader with queued keys: the keys are
//! deduplicated and handed to [`BatchLoader::load`] in as few calls as the batch-size cap allows.
//! Results are memoized for the lifetime of the coordinator, so a key is fetched at most once per
//! operation.

use std::{
    any::{Any, TypeId, type_name},
    collections::{BTreeMap, HashMap},
    fmt::Debug,
    hash::Hash,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use futures::{FutureExt, future::BoxFuture, future::join_all};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{
    error::FieldError,
    value::{Deferred, FieldValue, Slot},
};

/// A batch-fetch function over keys of one kind.
#[async_trait]
pub trait BatchLoader: Send + Sync + 'static {
    type Key: Eq + Hash + Clone + Debug + Send + Sync + 'static;

    /// Identifies the loader in logs and statistics.
    fn name(&self) -> &'static str;

    /// Fetch the values for `keys` (deduplicated, never empty).
    ///
    /// Keys missing from the returned map resolve to a not-found error. Returning `Err` fails every
    /// key of the batch.
    async fn load(
        &self,
        keys: &[Self::Key],
    ) -> Result<HashMap<Self::Key, Result<Value, FieldError>>, FieldError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoaderStats {
    /// Number of calls made to [`BatchLoader::load`]
    pub batch_calls: usize,
    /// Number of keys across those calls
    pub keys_loaded: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct LoaderQueue<K> {
    /// Every key requested so far, loaded or not
    slots: HashMap<K, Slot>,
    /// Keys requested since the last flush
    queued: Vec<(K, Slot)>,
}

pub(crate) struct LoaderState<L: BatchLoader> {
    loader: Arc<L>,
    max_batch_size: Option<usize>,
    queue: Mutex<LoaderQueue<L::Key>>,
    batch_calls: AtomicUsize,
    keys_loaded: AtomicUsize,
}

impl<L: BatchLoader> LoaderState<L> {
    fn new(loader: Arc<L>, max_batch_size: Option<usize>) -> Self {
        Self {
            loader,
            max_batch_size,
            queue: Mutex::new(LoaderQueue {
                slots: HashMap::new(),
                queued: vec![],
            }),
            batch_calls: AtomicUsize::new(0),
            keys_loaded: AtomicUsize::new(0),
        }
    }

    fn enqueue(&self, key: L::Key) -> Slot {
        let mut queue = lock(&self.queue);

        if let Some(slot) = queue.slots.get(&key) {
            return slot.clone();
        }

        let slot = Slot::default();
        queue.slots.insert(key.clone(), slot.clone());
        queue.queued.push((key, slot.clone()));
        slot
    }

    async fn flush_queued(&self) {
        let queued = std::mem::take(&mut lock(&self.queue).queued);
        if queued.is_empty() {
            return;
        }

        let batch_size = self.max_batch_size.unwrap_or(queued.len()).max(1);
        join_all(queued.chunks(batch_size).map(|batch| self.load_batch(batch))).await;
    }

    async fn load_batch(&self, batch: &[(L::Key, Slot)]) {
        let name = self.loader.name();
        let keys = batch.iter().map(|(key, _)| key.clone()).collect::<Vec<_>>();

        self.batch_calls.fetch_add(1, Ordering::Relaxed);
        self.keys_loaded.fetch_add(keys.len(), Ordering::Relaxed);
        debug!(loader = name, keys = keys.len(), "Loading batch");

        match self.loader.load(&keys).await {
            Ok(mut values) => {
                for (key, slot) in batch {
                    let value = values
                        .remove(key)
                        .unwrap_or_else(|| Err(FieldError::not_found(name, key)));
                    let _ = slot.set(value);
                }
            }
            Err(error) => {
                debug!(loader = name, %error, "Batch failed");
                for (_, slot) in batch {
                    let _ = slot.set(Err(error.clone()));
                }
            }
        }
    }
}

trait PendingLoads: Send + Sync {
    fn name(&self) -> &'static str;
    fn has_queued(&self) -> bool;
    fn flush(&self) -> BoxFuture<'_, ()>;
    fn stats(&self) -> LoaderStats;
    fn as_any(&self) -> &dyn Any;
}

impl<L: BatchLoader> PendingLoads for LoaderState<L> {
    fn name(&self) -> &'static str {
        self.loader.name()
    }

    fn has_queued(&self) -> bool {
        !lock(&self.queue).queued.is_empty()
    }

    fn flush(&self) -> BoxFuture<'_, ()> {
        self.flush_queued().boxed()
    }

    fn stats(&self) -> LoaderStats {
        LoaderStats {
            batch_calls: self.batch_calls.load(Ordering::Relaxed),
            keys_loaded: self.keys_loaded.load(Ordering::Relaxed),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

trait LoaderFactory: Send + Sync {
    fn create(&self, max_batch_size: Option<usize>) -> Box<dyn PendingLoads>;
}

struct RegisteredLoader<L>(Arc<L>);

impl<L: BatchLoader> LoaderFactory for RegisteredLoader<L> {
    fn create(&self, max_batch_size: Option<usize>) -> Box<dyn PendingLoads> {
        Box::new(LoaderState::new(self.0.clone(), max_batch_size))
    }
}

/// The loaders available to resolvers, keyed by loader type. Built once along with the engine.
#[derive(Clone, Default)]
pub struct LoaderRegistry {
    loaders: HashMap<TypeId, Arc<dyn LoaderFactory>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `loader`, replacing any earlier loader of the same type.
    pub fn register<L: BatchLoader>(&mut self, loader: L) -> &mut Self {
        self.loaders
            .insert(TypeId::of::<L>(), Arc::new(RegisteredLoader(Arc::new(loader))));
        self
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    /// A fresh coordinator, with no queued or memoized keys.
    pub fn coordinator(&self, max_batch_size: Option<usize>) -> BatchCoordinator {
        BatchCoordinator {
            loaders: self
                .loaders
                .iter()
                .map(|(type_id, factory)| (*type_id, factory.create(max_batch_size)))
                .collect(),
        }
    }
}

/// The per-operation state of every registered loader.
pub struct BatchCoordinator {
    loaders: HashMap<TypeId, Box<dyn PendingLoads>>,
}

impl BatchCoordinator {
    pub(crate) fn handle<L: BatchLoader>(&self) -> LoaderHandle<'_, L> {
        LoaderHandle {
            state: self
                .loaders
                .get(&TypeId::of::<L>())
                .and_then(|loader| loader.as_any().downcast_ref::<LoaderState<L>>()),
        }
    }

    pub(crate) fn has_queued(&self) -> bool {
        self.loaders.values().any(|loader| loader.has_queued())
    }

    /// Flush every loader with queued keys, concurrently.
    #[instrument(level = "debug", skip_all)]
    pub(crate) async fn flush_all(&self) {
        let flushes = self
            .loaders
            .values()
            .filter(|loader| loader.has_queued())
            .map(|loader| loader.flush());

        join_all(flushes).await;
    }

    pub fn stats(&self) -> BTreeMap<&'static str, LoaderStats> {
        self.loaders
            .values()
            .map(|loader| (loader.name(), loader.stats()))
            .collect()
    }
}

pub struct LoaderHandle<'a, L: BatchLoader> {
    state: Option<&'a LoaderState<L>>,
}

impl<L: BatchLoader> LoaderHandle<'_, L> {
    pub fn load(&self, key: L::Key) -> FieldValue {
        match self.state {
            Some(state) => {
                FieldValue::Deferred(Deferred::new(state.loader.name(), state.enqueue(key)))
            }
            None => FieldValue::Error(FieldError::internal(format!(
                "Loader {} is not registered",
                type_name::<L>()
            ))),
        }
    }

    pub fn load_many(&self, keys: impl IntoIterator<Item = L::Key>) -> FieldValue {
        FieldValue::List(keys.into_iter().map(|key| self.load(key)).collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Squares;

    #[async_trait]
    impl BatchLoader for Squares {
        type Key = i64;

        fn name(&self) -> &'static str {
            "squares"
        }

        async fn load(
            &self,
            keys: &[i64],
        ) -> Result<HashMap<i64, Result<Value, FieldError>>, FieldError> {
            Ok(keys
                .iter()
                .filter(|key| **key >= 0)
                .map(|key| (*key, Ok(json!(key * key))))
                .collect())
        }
    }

    fn coordinator(max_batch_size: Option<usize>) -> BatchCoordinator {
        let mut registry = LoaderRegistry::new();
        registry.register(Squares);
        registry.coordinator(max_batch_size)
    }

    fn settled(mut value: FieldValue) -> FieldValue {
        assert!(value.settle());
        value
    }

    #[tokio::test]
    async fn deduplicates_and_memoizes() {
        let coordinator = coordinator(None);
        let loader = coordinator.handle::<Squares>();

        let first = loader.load(3);
        let again = loader.load(3);
        let missing = loader.load(-1);
        assert!(coordinator.has_queued());

        coordinator.flush_all().await;

        assert!(matches!(settled(first), FieldValue::Value(v) if v == json!(9)));
        assert!(matches!(settled(again), FieldValue::Value(v) if v == json!(9)));
        assert!(matches!(
            settled(missing),
            FieldValue::Error(FieldError::NotFound { loader: "squares", .. })
        ));

        // Already loaded: no new batch
        let later = loader.load(3);
        assert!(!coordinator.has_queued());
        assert!(matches!(settled(later), FieldValue::Value(v) if v == json!(9)));

        assert_eq!(
            coordinator.stats()["squares"],
            LoaderStats {
                batch_calls: 1,
                keys_loaded: 2
            }
        );
    }

    #[tokio::test]
    async fn splits_batches_by_size() {
        let coordinator = coordinator(Some(2));
        let values = coordinator.handle::<Squares>().load_many(0..5);

        coordinator.flush_all().await;

        let FieldValue::List(items) = settled(values) else {
            panic!("expected a list");
        };
        assert_eq!(items.len(), 5);
        assert_eq!(coordinator.stats()["squares"].batch_calls, 3);
    }

    #[test]
    fn unregistered_loader_is_an_internal_error() {
        let coordinator = LoaderRegistry::new().coordinator(None);

        assert!(matches!(
            coordinator.handle::<Squares>().load(1),
            FieldValue::Error(FieldError::Internal(_))
        ));
    }
}

//! Optimistic view state.
//!
//! An [`OptimisticList`] is the cached copy of one entity collection that a
//! view renders. Mutations publish their projected value before the write is
//! awaited and all end in one settle step: confirmed patches
//! are dropped (or replaced by the server's canonical record), rejected ones
//! restore the previous value of their own target only.
//!
//! At most one patch per entity is in flight. A second mutation on the same
//! entity waits for the first to settle and starts from the settled value.
//! When a rollback can no longer be applied because the list was replaced
//! meanwhile, the list is refetched through its [`Reload`] source.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::{ClientError, Result};
use crate::models::Entity;

/// Authoritative source for a list
#[async_trait]
pub trait Reload<E>: Send + Sync {
    async fn reload(&self) -> Result<Vec<E>>;
}

/// A local change awaiting server confirmation
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticPatch<E> {
    pub target_id: String,
    pub previous_value: E,
    pub new_value: E,
}

#[derive(Debug)]
enum Mutation<E> {
    Update(OptimisticPatch<E>),
    Remove { index: usize, previous: E },
}

impl<E: Entity> Mutation<E> {
    fn target_id(&self) -> String {
        match self {
            Mutation::Update(patch) => patch.target_id.clone(),
            Mutation::Remove { previous, .. } => previous.key(),
        }
    }
}

enum Outcome<E> {
    Confirmed(Option<E>),
    Rejected,
}

#[derive(Debug)]
enum Settled<E> {
    Done(Option<E>),
    RolledBack,
    /// Rollback no longer applies to the current list
    Stale,
}

/// A mutation that was started against the view
struct Started<E> {
    generation: u64,
    mutation: Mutation<E>,
}

struct ViewState<E> {
    items: Vec<E>,
    /// Keys of `items` plus targets of unsettled removals, in list order
    order: Vec<String>,
    generation: u64,
    pending: HashSet<String>,
    closed: bool,
}

impl<E: Entity> ViewState<E> {
    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.key() == id)
    }

    /// Where a removed entry goes back: right after the closest entry that
    /// preceded it and is still shown
    fn restore_index(&self, id: &str, fallback: usize) -> usize {
        let Some(slot) = self.order.iter().position(|key| key == id) else {
            return fallback.min(self.items.len());
        };
        self.order[..slot]
            .iter()
            .rev()
            .find_map(|key| self.position(key))
            .map_or(0, |index| index + 1)
    }

    fn forget(&mut self, id: &str) {
        self.order.retain(|key| key != id);
    }
}

fn keys<E: Entity>(items: &[E]) -> Vec<String> {
    items.iter().map(Entity::key).collect()
}

pub struct OptimisticList<E: Entity> {
    state: Mutex<ViewState<E>>,
    published: watch::Sender<Vec<E>>,
    entity_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    source: Option<Arc<dyn Reload<E>>>,
}

impl<E: Entity> OptimisticList<E> {
    pub fn new(items: Vec<E>) -> Self {
        let (published, _) = watch::channel(items.clone());
        Self {
            state: Mutex::new(ViewState {
                order: keys(&items),
                items,
                generation: 0,
                pending: HashSet::new(),
                closed: false,
            }),
            published,
            entity_locks: Mutex::new(HashMap::new()),
            source: None,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn Reload<E>>) -> Self {
        self.source = Some(source);
        self
    }

    /// Build a list from its source's current contents
    pub async fn load(source: Arc<dyn Reload<E>>) -> Result<Self> {
        let items = source.reload().await?;
        Ok(Self::new(items).with_source(source))
    }

    fn state(&self) -> MutexGuard<'_, ViewState<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &ViewState<E>) {
        self.published.send_replace(state.items.clone());
    }

    /// What the view currently displays
    pub fn snapshot(&self) -> Vec<E> {
        self.state().items.clone()
    }

    pub fn get(&self, id: &str) -> Option<E> {
        let state = self.state();
        state.position(id).map(|i| state.items[i].clone())
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<E>> {
        self.published.subscribe()
    }

    /// True while a mutation on `id` awaits confirmation
    pub fn is_pending(&self, id: &str) -> bool {
        self.state().pending.contains(id)
    }

    /// Detach the view; later settlements leave the list untouched
    pub fn close(&self) {
        self.state().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Install authoritative contents. In-flight rollbacks against the old
    /// contents become stale.
    pub fn replace(&self, items: Vec<E>) {
        let mut state = self.state();
        if state.closed {
            return;
        }
        state.order = keys(&items);
        state.items = items;
        state.generation += 1;
        self.publish(&state);
    }

    pub async fn reload(&self) -> Result<()> {
        let Some(source) = self.source.clone() else {
            return Err(ClientError::config("list has no reload source"));
        };
        let items = source.reload().await?;
        self.replace(items);
        Ok(())
    }

    /// Replace the target with `transform(target)` right away, then run
    /// `commit`. Returns the settled value: the server's canonical record when
    /// the commit returned one, the projected value otherwise.
    pub async fn apply_optimistic<T, F, Fut, R>(&self, target_id: &str, transform: T, commit: F) -> Result<E>
    where
        T: FnOnce(&E) -> E,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R>>,
        R: Into<Option<E>>,
    {
        let lock = self.entity_lock(target_id);
        let result = {
            let _turn = lock.lock().await;
            self.run_update(target_id, transform, commit).await
        };
        self.release_entity_lock(target_id, lock);
        result
    }

    /// Remove the target right away, then run `commit`; on failure the
    /// target is put back where it was.
    pub async fn remove_optimistic<F, Fut>(&self, target_id: &str, commit: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let lock = self.entity_lock(target_id);
        let result = {
            let _turn = lock.lock().await;
            self.run_remove(target_id, commit).await
        };
        self.release_entity_lock(target_id, lock);
        result
    }

    async fn run_update<T, F, Fut, R>(&self, target_id: &str, transform: T, commit: F) -> Result<E>
    where
        T: FnOnce(&E) -> E,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R>>,
        R: Into<Option<E>>,
    {
        let started = self.begin_update(target_id, transform)?;
        let outcome: Result<Option<E>> = commit().await.map(Into::into);
        let projected = match &started.mutation {
            Mutation::Update(patch) => patch.new_value.clone(),
            Mutation::Remove { previous, .. } => previous.clone(),
        };

        match outcome {
            Ok(canonical) => match self.settle(&started, Outcome::Confirmed(canonical)) {
                Settled::Done(value) => Ok(value.unwrap_or(projected)),
                _ => Ok(projected),
            },
            Err(err) => self.fail(&started, err).await,
        }
    }

    async fn run_remove<F, Fut>(&self, target_id: &str, commit: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let started = self.begin_remove(target_id)?;
        match commit().await {
            Ok(()) => {
                self.settle(&started, Outcome::Confirmed(None));
                Ok(())
            }
            Err(err) => self.fail(&started, err).await,
        }
    }

    async fn fail<V>(&self, started: &Started<E>, err: ClientError) -> Result<V> {
        let target = started.mutation.target_id();
        match self.settle(started, Outcome::Rejected) {
            Settled::Stale => {
                tracing::warn!("Rollback of '{}' no longer applies, refetching list", target);
                self.refetch_after_stale(&target).await?;
                Err(err)
            }
            _ => {
                tracing::debug!("Rolled back '{}': {}", target, err);
                Err(err)
            }
        }
    }

    async fn refetch_after_stale(&self, target: &str) -> Result<()> {
        let Some(source) = self.source.clone() else {
            return Err(ClientError::RollbackFailure {
                target: target.to_string(),
                reason: "list changed and has no reload source".to_string(),
            });
        };

        match source.reload().await {
            Ok(items) => {
                self.replace(items);
                Ok(())
            }
            Err(e) => Err(ClientError::RollbackFailure {
                target: target.to_string(),
                reason: format!("refetch failed: {}", e),
            }),
        }
    }

    fn begin_update<T>(&self, target_id: &str, transform: T) -> Result<Started<E>>
    where
        T: FnOnce(&E) -> E,
    {
        let mut state = self.state();
        let index = state
            .position(target_id)
            .ok_or_else(|| ClientError::UnknownEntity(target_id.to_string()))?;

        let previous_value = state.items[index].clone();
        let new_value = transform(&previous_value);
        state.items[index] = new_value.clone();
        state.pending.insert(target_id.to_string());
        self.publish(&state);

        Ok(Started {
            generation: state.generation,
            mutation: Mutation::Update(OptimisticPatch {
                target_id: target_id.to_string(),
                previous_value,
                new_value,
            }),
        })
    }

    fn begin_remove(&self, target_id: &str) -> Result<Started<E>> {
        let mut state = self.state();
        let index = state
            .position(target_id)
            .ok_or_else(|| ClientError::UnknownEntity(target_id.to_string()))?;

        let previous = state.items.remove(index);
        state.pending.insert(target_id.to_string());
        self.publish(&state);

        Ok(Started {
            generation: state.generation,
            mutation: Mutation::Remove { index, previous },
        })
    }

    /// The one state transition every mutation ends with
    fn settle(&self, started: &Started<E>, outcome: Outcome<E>) -> Settled<E> {
        let mut state = self.state();
        let target = started.mutation.target_id();
        state.pending.remove(&target);

        if state.closed {
            return match outcome {
                Outcome::Confirmed(canonical) => Settled::Done(canonical),
                Outcome::Rejected => Settled::RolledBack,
            };
        }

        let current = state.generation == started.generation;

        match (&started.mutation, outcome) {
            (Mutation::Update(_), Outcome::Confirmed(canonical)) => {
                if let Some(record) = &canonical {
                    if let Some(index) = state.position(&target) {
                        state.items[index] = record.clone();
                        self.publish(&state);
                    }
                }
                Settled::Done(canonical)
            }
            (Mutation::Update(patch), Outcome::Rejected) => {
                if !current {
                    return Settled::Stale;
                }
                match state.position(&target) {
                    Some(index) => {
                        state.items[index] = patch.previous_value.clone();
                        self.publish(&state);
                        Settled::RolledBack
                    }
                    None => Settled::Stale,
                }
            }
            (Mutation::Remove { .. }, Outcome::Confirmed(_)) => {
                if current {
                    state.forget(&target);
                }
                Settled::Done(None)
            }
            (Mutation::Remove { index, previous }, Outcome::Rejected) => {
                if !current || state.position(&target).is_some() {
                    return Settled::Stale;
                }
                let at = state.restore_index(&target, *index);
                state.items.insert(at, previous.clone());
                self.publish(&state);
                Settled::RolledBack
            }
        }
    }

    fn entity_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.entity_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(id.to_string()).or_default().clone()
    }

    fn release_entity_lock(&self, id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.entity_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Held by the map and by us only: nobody is queued behind this entity
        if Arc::strong_count(&lock) == 2 {
            locks.remove(id);
        }
    }
}

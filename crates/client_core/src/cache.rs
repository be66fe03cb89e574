//! Keyed query cache with mutation-driven invalidation.
//!
//! Every read is identified by a [`QueryKey`]. A successful mutation maps to a
//! set of [`KeyScope`]s; invalidating them drops the matching entries, bumps
//! their fetch generation and publishes a [`CacheEvent`] so subscribers bound
//! to an affected key can re-request it.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use shared::{
    domain::{LayerId, WorkspaceId},
    protocol::{Account, Layer, Workspace},
};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    CurrentUser,
    Workspaces,
    Workspace(WorkspaceId),
    Layers(WorkspaceId),
    Layer(WorkspaceId, LayerId),
}

impl QueryKey {
    pub fn workspace_id(&self) -> Option<WorkspaceId> {
        match self {
            QueryKey::CurrentUser | QueryKey::Workspaces => None,
            QueryKey::Workspace(id) | QueryKey::Layers(id) | QueryKey::Layer(id, _) => Some(*id),
        }
    }
}

/// A set of keys addressed by an invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyScope {
    Exact(QueryKey),
    /// The layer list of a workspace and every single-layer entry under it.
    LayersOf(WorkspaceId),
    /// Every key that belongs to the workspace.
    WorkspaceTree(WorkspaceId),
    All,
}

impl KeyScope {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            KeyScope::Exact(exact) => exact == key,
            KeyScope::LayersOf(ws) => {
                matches!(key, QueryKey::Layers(id) | QueryKey::Layer(id, _) if id == ws)
            }
            KeyScope::WorkspaceTree(ws) => key.workspace_id() == Some(*ws),
            KeyScope::All => true,
        }
    }

    /// Whether some key could belong to both scopes.
    pub fn overlaps(&self, other: &KeyScope) -> bool {
        match (self, other) {
            (KeyScope::All, _) | (_, KeyScope::All) => true,
            (KeyScope::Exact(key), scope) | (scope, KeyScope::Exact(key)) => scope.matches(key),
            (KeyScope::LayersOf(a), KeyScope::LayersOf(b))
            | (KeyScope::LayersOf(a), KeyScope::WorkspaceTree(b))
            | (KeyScope::WorkspaceTree(a), KeyScope::LayersOf(b))
            | (KeyScope::WorkspaceTree(a), KeyScope::WorkspaceTree(b)) => a == b,
        }
    }
}

/// Server-side changes the client performed successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    CreateWorkspace,
    UpdateWorkspace(WorkspaceId),
    DeleteWorkspace(WorkspaceId),
    CreateLayer(WorkspaceId),
    UpdateLayer(WorkspaceId, LayerId),
    DeleteLayer(WorkspaceId, LayerId),
    ReingestLayer(WorkspaceId, LayerId),
    Logout,
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::CreateWorkspace => "create_workspace",
            Mutation::UpdateWorkspace(_) => "update_workspace",
            Mutation::DeleteWorkspace(_) => "delete_workspace",
            Mutation::CreateLayer(_) => "create_layer",
            Mutation::UpdateLayer(..) => "update_layer",
            Mutation::DeleteLayer(..) => "delete_layer",
            Mutation::ReingestLayer(..) => "reingest_layer",
            Mutation::Logout => "logout",
        }
    }

    /// Cache entries made stale by this mutation.
    ///
    /// Layer counts are shown both on the workspace page and in the workspace
    /// list, so layer creation and deletion reach both.
    pub fn invalidates(&self) -> Vec<KeyScope> {
        match *self {
            Mutation::CreateWorkspace => vec![KeyScope::Exact(QueryKey::Workspaces)],
            Mutation::UpdateWorkspace(ws) => vec![
                KeyScope::Exact(QueryKey::Workspaces),
                KeyScope::Exact(QueryKey::Workspace(ws)),
            ],
            Mutation::DeleteWorkspace(ws) => vec![
                KeyScope::Exact(QueryKey::Workspaces),
                KeyScope::WorkspaceTree(ws),
            ],
            Mutation::CreateLayer(ws) => vec![
                KeyScope::Exact(QueryKey::Layers(ws)),
                KeyScope::Exact(QueryKey::Workspace(ws)),
                KeyScope::Exact(QueryKey::Workspaces),
            ],
            Mutation::UpdateLayer(ws, layer) | Mutation::ReingestLayer(ws, layer) => vec![
                KeyScope::Exact(QueryKey::Layers(ws)),
                KeyScope::Exact(QueryKey::Layer(ws, layer)),
            ],
            Mutation::DeleteLayer(ws, layer) => vec![
                KeyScope::Exact(QueryKey::Layers(ws)),
                KeyScope::Exact(QueryKey::Layer(ws, layer)),
                KeyScope::Exact(QueryKey::Workspace(ws)),
                KeyScope::Exact(QueryKey::Workspaces),
            ],
            Mutation::Logout => vec![KeyScope::All],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Account(Account),
    Workspaces(Vec<Workspace>),
    Workspace(Workspace),
    Layers(Vec<Layer>),
    Layer(Layer),
}

/// Conversion between a query result and its cached representation.
pub trait Cacheable: Clone + Sized {
    fn into_cached(self) -> CachedValue;
    fn from_cached(value: &CachedValue) -> Option<Self>;
}

macro_rules! cacheable {
    ($ty:ty, $variant:ident) => {
        impl Cacheable for $ty {
            fn into_cached(self) -> CachedValue {
                CachedValue::$variant(self)
            }

            fn from_cached(value: &CachedValue) -> Option<Self> {
                match value {
                    CachedValue::$variant(inner) => Some(inner.clone()),
                    _ => None,
                }
            }
        }
    };
}

cacheable!(Account, Account);
cacheable!(Vec<Workspace>, Workspaces);
cacheable!(Workspace, Workspace);
cacheable!(Vec<Layer>, Layers);
cacheable!(Layer, Layer);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Invalidated {
        scopes: Vec<KeyScope>,
        cause: Option<Mutation>,
    },
    Stored(QueryKey),
}

/// Proof that a fetch started at a given generation of its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    key: QueryKey,
    generation: u64,
}

struct CacheEntry {
    value: CachedValue,
    stored_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<QueryKey, CacheEntry>,
    generations: HashMap<QueryKey, u64>,
}

pub struct QueryCache {
    inner: Mutex<CacheState>,
    ttl: Duration,
    events: broadcast::Sender<CacheEvent>,
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Mutex::new(CacheState::default()),
            ttl,
            events,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh cached value for `key`; expired entries count as misses.
    pub async fn get<T: Cacheable>(&self, key: &QueryKey) -> Option<T> {
        let guard = self.inner.lock().await;
        guard
            .entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .and_then(|entry| T::from_cached(&entry.value))
    }

    pub async fn contains(&self, key: &QueryKey) -> bool {
        self.get_raw(key).await.is_some()
    }

    pub async fn get_raw(&self, key: &QueryKey) -> Option<CachedValue> {
        let guard = self.inner.lock().await;
        guard
            .entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn begin_fetch(&self, key: QueryKey) -> FetchTicket {
        let mut guard = self.inner.lock().await;
        let generation = *guard.generations.entry(key).or_insert(0);
        FetchTicket { key, generation }
    }

    /// Stores a fetched value unless its key was invalidated after the fetch
    /// began. Returns whether the value was stored.
    pub async fn complete_fetch(&self, ticket: FetchTicket, value: CachedValue) -> bool {
        {
            let mut guard = self.inner.lock().await;
            let current = guard.generations.get(&ticket.key).copied().unwrap_or(0);
            if current != ticket.generation {
                debug!(
                    key = ?ticket.key,
                    started = ticket.generation,
                    current,
                    "cache: discarding response invalidated in flight"
                );
                return false;
            }
            guard.entries.insert(
                ticket.key,
                CacheEntry {
                    value,
                    stored_at: Instant::now(),
                },
            );
        }
        let _ = self.events.send(CacheEvent::Stored(ticket.key));
        true
    }

    pub async fn invalidate(&self, scopes: Vec<KeyScope>, cause: Option<Mutation>) -> usize {
        let dropped = {
            let mut guard = self.inner.lock().await;
            let before = guard.entries.len();
            guard
                .entries
                .retain(|key, _| !scopes.iter().any(|scope| scope.matches(key)));
            for (key, generation) in guard.generations.iter_mut() {
                if scopes.iter().any(|scope| scope.matches(key)) {
                    *generation += 1;
                }
            }
            before - guard.entries.len()
        };
        debug!(
            ?scopes,
            cause = cause.map(|m| m.name()),
            dropped,
            "cache: invalidated"
        );
        let _ = self.events.send(CacheEvent::Invalidated { scopes, cause });
        dropped
    }

    pub async fn invalidate_for(&self, mutation: Mutation) -> usize {
        self.invalidate(mutation.invalidates(), Some(mutation)).await
    }

    /// Subscription that yields only invalidations touching `keys`.
    pub fn subscribe(&self, keys: impl IntoIterator<Item = QueryKey>) -> CacheSubscription {
        self.subscribe_scopes(keys.into_iter().map(KeyScope::Exact))
    }

    /// Subscription bound to whole scopes, e.g. every key of a workspace,
    /// including layer ids the subscriber has not seen yet.
    pub fn subscribe_scopes(&self, scopes: impl IntoIterator<Item = KeyScope>) -> CacheSubscription {
        let mut subscription = CacheSubscription {
            scopes: Vec::new(),
            rx: self.events.subscribe(),
        };
        for scope in scopes {
            subscription.bind_scope(scope);
        }
        subscription
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    /// Bound scopes hit by the invalidation.
    pub scopes: Vec<KeyScope>,
    /// Exact keys among `scopes`.
    pub keys: Vec<QueryKey>,
    pub cause: Option<Mutation>,
}

impl Invalidation {
    fn new(scopes: Vec<KeyScope>, cause: Option<Mutation>) -> Self {
        let keys = scopes
            .iter()
            .filter_map(|scope| match scope {
                KeyScope::Exact(key) => Some(*key),
                _ => None,
            })
            .collect();
        Self { scopes, keys, cause }
    }
}

pub struct CacheSubscription {
    scopes: Vec<KeyScope>,
    rx: broadcast::Receiver<CacheEvent>,
}

impl CacheSubscription {
    pub fn scopes(&self) -> &[KeyScope] {
        &self.scopes
    }

    pub fn bind(&mut self, key: QueryKey) {
        self.bind_scope(KeyScope::Exact(key));
    }

    pub fn bind_scope(&mut self, scope: KeyScope) {
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
    }

    /// Waits for the next invalidation overlapping a bound scope. A lagged
    /// receiver reports every bound scope as invalidated. Returns `None` once
    /// the cache is dropped.
    pub async fn next(&mut self) -> Option<Invalidation> {
        loop {
            match self.rx.recv().await {
                Ok(CacheEvent::Invalidated { scopes, cause }) => {
                    let hit: Vec<KeyScope> = self
                        .scopes
                        .iter()
                        .filter(|bound| scopes.iter().any(|scope| scope.overlaps(bound)))
                        .copied()
                        .collect();
                    if !hit.is_empty() {
                        return Some(Invalidation::new(hit, cause));
                    }
                }
                Ok(CacheEvent::Stored(_)) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "cache: subscriber lagged, reporting all bound scopes");
                    return Some(Invalidation::new(self.scopes.clone(), None));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;

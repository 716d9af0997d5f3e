//! Shared fixtures for reconciler tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kubegame_core::cluster::kind_of;
use kubegame_core::{
    BoxFuture, ClusterApi, ClusterError, ClusterObject, CreateOutcome, DatabaseSpec, Game,
    GameSpec, Lookup, ObjectKey, OperatorConfig, World, WorldSpec,
};
use kubegame_state::ObjectStore;

pub const NAMESPACE: &str = "default";

pub fn game(name: &str, username: &str, password: &str) -> Game {
    let mut game = Game::new(
        name,
        GameSpec {
            database: DatabaseSpec {
                username: username.to_string(),
                password: password.to_string(),
            },
        },
    );
    game.metadata.namespace = Some(NAMESPACE.to_string());
    game
}

pub fn world(name: &str, game: &str, description: &str) -> World {
    let mut world = World::new(
        name,
        WorldSpec {
            game: game.to_string(),
            description: description.to_string(),
        },
    );
    world.metadata.namespace = Some(NAMESPACE.to_string());
    world
}

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::new(NAMESPACE, name)
}

pub fn store() -> ObjectStore {
    ObjectStore::open_in_memory().unwrap()
}

pub fn config() -> Arc<OperatorConfig> {
    Arc::new(OperatorConfig::default())
}

/// Wraps an [`ObjectStore`] and injects failures per kind.
pub struct FaultyCluster {
    pub inner: ObjectStore,
    failing_gets: Mutex<HashSet<String>>,
    racing_creates: Mutex<HashSet<String>>,
    get_delay: Mutex<Option<Duration>>,
}

impl FaultyCluster {
    pub fn new(inner: ObjectStore) -> Self {
        Self {
            inner,
            failing_gets: Mutex::new(HashSet::new()),
            racing_creates: Mutex::new(HashSet::new()),
            get_delay: Mutex::new(None),
        }
    }

    /// Every get of `kind` fails with a transport error.
    pub fn fail_gets_of(&self, kind: &str) {
        self.failing_gets.lock().unwrap().insert(kind.to_string());
    }

    /// Gets of `kind` succeed again.
    pub fn heal_gets_of(&self, kind: &str) {
        self.failing_gets.lock().unwrap().remove(kind);
    }

    /// The next create of `kind` loses a race: the object appears, but the
    /// caller is told it already existed.
    pub fn race_create_of(&self, kind: &str) {
        self.racing_creates.lock().unwrap().insert(kind.to_string());
    }

    /// Every get sleeps for `delay` before answering.
    pub fn slow_gets(&self, delay: Duration) {
        *self.get_delay.lock().unwrap() = Some(delay);
    }
}

impl ClusterApi for FaultyCluster {
    fn get<'a, K: ClusterObject>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Lookup<K>> {
        Box::pin(async move {
            let delay = *self.get_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let kind = kind_of::<K>();
            if self.failing_gets.lock().unwrap().contains(&kind) {
                return Lookup::Failed(ClusterError::Transport(format!(
                    "injected failure reading {kind} {namespace}/{name}"
                )));
            }
            self.inner.get(namespace, name).await
        })
    }

    fn create<'a, K: ClusterObject>(
        &'a self,
        object: &'a K,
    ) -> BoxFuture<'a, Result<CreateOutcome<K>, ClusterError>> {
        Box::pin(async move {
            let racing = self.racing_creates.lock().unwrap().remove(&kind_of::<K>());
            if racing {
                let _ = self.inner.create(object).await?;
                return Ok(CreateOutcome::AlreadyExists);
            }
            self.inner.create(object).await
        })
    }

    fn update_status<'a, K: ClusterObject>(
        &'a self,
        object: &'a K,
    ) -> BoxFuture<'a, Result<K, ClusterError>> {
        self.inner.update_status(object)
    }
}

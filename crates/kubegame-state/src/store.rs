//! ObjectStore: redb-backed object persistence for kubegame.
//!
//! Provides typed create/read/status/delete operations over namespaced
//! cluster objects. The store supports both on-disk and in-memory backends
//! (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use kubegame_core::cluster::kind_of;
use kubegame_core::{BoxFuture, ClusterApi, ClusterError, ClusterObject, CreateOutcome, Lookup};

use crate::error::{StateError, StateResult};
use crate::tables::OBJECTS;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Only the metadata of a stored object, for owner walks.
#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    metadata: ObjectMeta,
}

/// Thread-safe object store backed by redb.
#[derive(Clone)]
pub struct ObjectStore {
    db: Arc<Database>,
}

impl ObjectStore {
    /// Open (or create) a persistent object store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "object store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory object store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory object store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(OBJECTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Get an object by namespace and name.
    pub fn get_object<K: ClusterObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> StateResult<Option<K>> {
        let key = object_key(&kind_of::<K>(), namespace, name);
        match self.read_value(&key)? {
            Some(value) => Ok(Some(
                serde_json::from_value(value).map_err(map_err!(Deserialize))?,
            )),
            None => Ok(None),
        }
    }

    /// List objects of one kind, optionally restricted to a namespace.
    pub fn list_objects<K: ClusterObject>(&self, namespace: Option<&str>) -> StateResult<Vec<K>> {
        let kind = kind_of::<K>();
        let prefix = match namespace {
            Some(ns) => format!("{kind}/{ns}/"),
            None => format!("{kind}/"),
        };
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(OBJECTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let object: K =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(object);
            }
        }
        Ok(results)
    }

    /// Total number of stored objects across all kinds.
    pub fn len(&self) -> StateResult<usize> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(OBJECTS).map_err(map_err!(Table))?;
        let mut count = 0;
        for entry in table.iter().map_err(map_err!(Read))? {
            entry.map_err(map_err!(Read))?;
            count += 1;
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> StateResult<bool> {
        Ok(self.len()? == 0)
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Create an object. Returns `None` if one with the same identity exists.
    pub fn create_object<K: ClusterObject>(&self, object: &K) -> StateResult<Option<K>> {
        let key = identity_key(object)?;
        let mut value = serde_json::to_value(object).map_err(map_err!(Serialize))?;
        stamp_created(&mut value)?;
        let bytes = serde_json::to_vec(&value).map_err(map_err!(Serialize))?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(OBJECTS).map_err(map_err!(Table))?;
            let exists = table
                .get(key.as_str())
                .map_err(map_err!(Read))?
                .is_some();
            if exists {
                debug!(%key, "object already exists");
                return Ok(None);
            }
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "object created");

        Ok(Some(
            serde_json::from_value(value).map_err(map_err!(Deserialize))?,
        ))
    }

    /// Insert or replace an object wholesale, the way an external actor
    /// applying a manifest would. Server-assigned fields are filled in when
    /// missing and `resourceVersion` is bumped.
    pub fn put_object<K: ClusterObject>(&self, object: &K) -> StateResult<K> {
        let key = identity_key(object)?;
        let mut value = serde_json::to_value(object).map_err(map_err!(Serialize))?;
        let previous = self.read_value(&key)?;
        match previous.as_ref().and_then(|p| p.get("metadata")) {
            Some(previous_meta) => {
                let meta = metadata_mut(&mut value)?;
                for field in ["uid", "creationTimestamp", "resourceVersion"] {
                    if let Some(v) = previous_meta.get(field) {
                        meta.entry(field).or_insert_with(|| v.clone());
                    }
                }
                bump_resource_version(&mut value)?;
            }
            None => stamp_created(&mut value)?,
        }
        self.write_value(&key, &value)?;
        serde_json::from_value(value).map_err(map_err!(Deserialize))
    }

    /// Replace only the `status` of an existing object.
    pub fn write_status<K: ClusterObject>(&self, object: &K) -> StateResult<K> {
        let key = identity_key(object)?;
        let mut stored = self
            .read_value(&key)?
            .ok_or_else(|| StateError::NotFound(key.clone()))?;
        let incoming = serde_json::to_value(object).map_err(map_err!(Serialize))?;
        let status = incoming.get("status").cloned().unwrap_or(Value::Null);

        stored
            .as_object_mut()
            .ok_or_else(|| StateError::Invalid(format!("{key} is not a JSON object")))?
            .insert("status".to_string(), status);
        bump_resource_version(&mut stored)?;
        self.write_value(&key, &stored)?;
        debug!(%key, "status written");

        serde_json::from_value(stored).map_err(map_err!(Deserialize))
    }

    /// Set `deletionTimestamp` on an object without removing it, the state
    /// an object is in while finalizers run. Returns false if absent.
    pub fn mark_deleting<K: ClusterObject>(&self, namespace: &str, name: &str) -> StateResult<bool> {
        let key = object_key(&kind_of::<K>(), namespace, name);
        let Some(mut value) = self.read_value(&key)? else {
            return Ok(false);
        };
        metadata_mut(&mut value)?.insert(
            "deletionTimestamp".to_string(),
            Value::String(now_rfc3339()),
        );
        self.write_value(&key, &value)?;
        Ok(true)
    }

    /// Delete an object and, transitively, every object whose
    /// `ownerReferences` point at a deleted object's uid.
    ///
    /// Returns the keys removed, owner first. Empty if the object was absent.
    pub fn delete_object<K: ClusterObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> StateResult<Vec<String>> {
        let root = object_key(&kind_of::<K>(), namespace, name);
        let entries = self.scan_metadata()?;

        let Some(root_meta) = entries
            .iter()
            .find(|(key, _)| *key == root)
            .map(|(_, meta)| meta)
        else {
            return Ok(Vec::new());
        };

        let mut doomed = vec![root.clone()];
        let mut frontier: Vec<String> = root_meta.uid.iter().cloned().collect();
        while let Some(uid) = frontier.pop() {
            for (key, meta) in &entries {
                if doomed.contains(key) {
                    continue;
                }
                let owned = meta
                    .owner_references
                    .iter()
                    .flatten()
                    .any(|r| r.uid == uid);
                if owned {
                    doomed.push(key.clone());
                    frontier.extend(meta.uid.iter().cloned());
                }
            }
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(OBJECTS).map_err(map_err!(Table))?;
            for key in &doomed {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%root, removed = doomed.len(), "object deleted with dependents");
        Ok(doomed)
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn read_value(&self, key: &str) -> StateResult<Option<Value>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(OBJECTS).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
            )),
            None => Ok(None),
        }
    }

    fn write_value(&self, key: &str, value: &Value) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(OBJECTS).map_err(map_err!(Table))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn scan_metadata(&self) -> StateResult<Vec<(String, ObjectMeta)>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(OBJECTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let envelope: Envelope =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push((key.value().to_string(), envelope.metadata));
        }
        Ok(results)
    }
}

impl ClusterApi for ObjectStore {
    fn get<'a, K: ClusterObject>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Lookup<K>> {
        Box::pin(async move {
            Lookup::from_result(self.get_object(namespace, name).map_err(ClusterError::from))
        })
    }

    fn create<'a, K: ClusterObject>(
        &'a self,
        object: &'a K,
    ) -> BoxFuture<'a, Result<CreateOutcome<K>, ClusterError>> {
        Box::pin(async move {
            match self.create_object(object)? {
                Some(created) => Ok(CreateOutcome::Created(created)),
                None => Ok(CreateOutcome::AlreadyExists),
            }
        })
    }

    fn update_status<'a, K: ClusterObject>(
        &'a self,
        object: &'a K,
    ) -> BoxFuture<'a, Result<K, ClusterError>> {
        Box::pin(async move { Ok(self.write_status(object)?) })
    }
}

/// `{kind}/{namespace}/{name}`.
pub fn object_key(kind: &str, namespace: &str, name: &str) -> String {
    format!("{kind}/{namespace}/{name}")
}

fn identity_key<K: ClusterObject>(object: &K) -> StateResult<String> {
    let meta = object.meta();
    let name = meta
        .name
        .as_deref()
        .ok_or_else(|| StateError::Invalid("object has no name".to_string()))?;
    let namespace = meta
        .namespace
        .as_deref()
        .ok_or_else(|| StateError::Invalid(format!("{name} has no namespace")))?;
    Ok(object_key(&kind_of::<K>(), namespace, name))
}

fn metadata_mut(value: &mut Value) -> StateResult<&mut Map<String, Value>> {
    value
        .as_object_mut()
        .ok_or_else(|| StateError::Invalid("object is not a JSON map".to_string()))?
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| StateError::Invalid("metadata is not a JSON map".to_string()))
}

/// Fill the fields an API server assigns on create.
fn stamp_created(value: &mut Value) -> StateResult<()> {
    let meta = metadata_mut(value)?;
    meta.entry("uid")
        .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
    meta.entry("creationTimestamp")
        .or_insert_with(|| Value::String(now_rfc3339()));
    meta.insert("resourceVersion".to_string(), Value::String("1".to_string()));
    Ok(())
}

fn bump_resource_version(value: &mut Value) -> StateResult<()> {
    let meta = metadata_mut(value)?;
    let current = meta
        .get("resourceVersion")
        .and_then(Value::as_str)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    meta.insert(
        "resourceVersion".to_string(),
        Value::String((current + 1).to_string()),
    );
    Ok(())
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

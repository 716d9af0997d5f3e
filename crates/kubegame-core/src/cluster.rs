//! The narrow slice of the orchestration platform the reconcilers consume.
//!
//! Reads return a three-way [`Lookup`] so every call site has to decide
//! separately what absence and failure mean for it. Creates return a
//! [`CreateOutcome`] so a lost create-if-absent race is visible as a value
//! instead of an error.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;

use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Boxed, sendable future used by the injectable cluster and store traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Namespaced kinds the cluster interface can read and write.
pub trait ClusterObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Serialize
    + DeserializeOwned
    + Debug
    + Send
    + Sync
    + 'static
{
}

impl<K> ClusterObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Serialize
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static
{
}

/// Errors reported by a cluster backend.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid object: {0}")]
    Invalid(String),

    #[error("codec error: {0}")]
    Codec(String),
}

/// Result of reading a single object.
#[derive(Debug)]
#[must_use]
pub enum Lookup<T> {
    Found(T),
    Absent,
    Failed(ClusterError),
}

impl<T> Lookup<T> {
    /// Fold a backend's `Result<Option<T>>` into a lookup.
    pub fn from_result(result: Result<Option<T>, ClusterError>) -> Self {
        match result {
            Ok(Some(value)) => Lookup::Found(value),
            Ok(None) => Lookup::Absent,
            Err(e) => Lookup::Failed(e),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Lookup::Absent)
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }
}

/// Result of a create call that did not fail outright.
#[derive(Debug)]
#[must_use]
pub enum CreateOutcome<K> {
    /// The object was created; this is the server's copy (uid populated).
    Created(K),
    /// An object with the same identity already existed.
    AlreadyExists,
}

/// Cluster operations used by the reconcilers.
///
/// Implementations must report a missing object as [`Lookup::Absent`], never
/// as [`Lookup::Failed`], and a name collision on create as
/// [`CreateOutcome::AlreadyExists`].
pub trait ClusterApi: Send + Sync {
    /// Read one object by namespace and name.
    fn get<'a, K: ClusterObject>(&'a self, namespace: &'a str, name: &'a str)
    -> BoxFuture<'a, Lookup<K>>;

    /// Create an object. The object's namespace must be set.
    fn create<'a, K: ClusterObject>(
        &'a self,
        object: &'a K,
    ) -> BoxFuture<'a, Result<CreateOutcome<K>, ClusterError>>;

    /// Persist the `status` of an existing object through its status subresource.
    fn update_status<'a, K: ClusterObject>(
        &'a self,
        object: &'a K,
    ) -> BoxFuture<'a, Result<K, ClusterError>>;
}

/// Kind name of a cluster object, e.g. `"Deployment"`.
pub fn kind_of<K: ClusterObject>() -> String {
    K::kind(&()).into_owned()
}

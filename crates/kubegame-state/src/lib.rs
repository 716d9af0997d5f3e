//! kubegame-state: embedded object store for kubegame.
//!
//! Backed by [redb](https://docs.rs/redb), it stores namespaced cluster
//! objects (Games, Worlds, Deployments, Services) and implements
//! [`kubegame_core::ClusterApi`] so the reconcilers can run against it
//! without an API server.
//!
//! # Architecture
//!
//! Objects are JSON-serialized into one redb table keyed by
//! `{kind}/{namespace}/{name}`. The store plays the API server's part for
//! the fields the reconcilers depend on: it assigns `uid`,
//! `resourceVersion` and `creationTimestamp` on create, writes only the
//! `status` field on status updates, and deletes dependents transitively
//! by walking `ownerReferences` when an owner is deleted.
//!
//! The `ObjectStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::ObjectStore;

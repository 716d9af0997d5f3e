//! kubegame-controller: reconcilers for the Game and World kinds.
//!
//! A [`GameReconciler`] provisions a Postgres Deployment and Service per
//! Game and marks the Game ready. A [`WorldReconciler`] records each World
//! as a row in its Game's database once that Game is ready.
//!
//! Both are generic over [`ClusterApi`](kubegame_core::ClusterApi), so the
//! same code runs against the API server ([`KubeCluster`]) and against the
//! embedded `kubegame-state` object store in tests.
//!
//! # Architecture
//!
//! ```text
//! GameReconciler
//!   ├── ClusterApi (Game, Deployment, Service)
//!   └── materialize (pure Deployment/Service builders)
//! WorldReconciler
//!   ├── ClusterApi (World, Game, Service)
//!   └── StoreConnector → WorldStore (worlds table)
//! ```
//!
//! Every external call runs under a [`ReconcileGuard`], which aborts the
//! reconciliation on shutdown or when its deadline passes.

pub mod backoff;
pub mod error;
pub mod game;
pub mod guard;
pub mod kube_cluster;
pub mod materialize;
pub mod outcome;
pub mod world;

pub use backoff::RetryBackoff;
pub use error::{ReconcileError, ReconcileResult};
pub use game::GameReconciler;
pub use guard::ReconcileGuard;
pub use kube_cluster::KubeCluster;
pub use outcome::ReconcileOutcome;
pub use world::WorldReconciler;

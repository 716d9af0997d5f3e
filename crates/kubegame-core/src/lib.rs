pub mod cluster;
pub mod config;
pub mod owner;
pub mod types;

pub use cluster::{BoxFuture, ClusterApi, ClusterError, ClusterObject, CreateOutcome, Lookup};
pub use config::{AppEnvironment, ConfigError, DatabaseConfig, OperatorConfig, ReadinessGate};
pub use owner::{OwnerError, is_controlled_by, set_controller_owner};
pub use types::*;

//! Store connector: engine selection, connection targets and a per-target
//! connection cache.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

use kubegame_core::{BoxFuture, Credentials, OperatorConfig};

use crate::error::{StoreError, StoreResult};
use crate::record::WorldStore;

/// Relational engine behind a connection string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreEngine {
    Postgres,
}

impl StoreEngine {
    /// URL scheme of the engine's connection strings.
    pub fn scheme(self) -> &'static str {
        match self {
            StoreEngine::Postgres => "postgresql",
        }
    }
}

impl FromStr for StoreEngine {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreEngine::Postgres),
            _ => Err(StoreError::UnsupportedEngine(s.to_string())),
        }
    }
}

impl fmt::Display for StoreEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreEngine::Postgres => write!(f, "postgres"),
        }
    }
}

/// Everything needed to open one store connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub engine: StoreEngine,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub credentials: Credentials,
}

impl ConnectTarget {
    /// Resolve a target for `host` under the operator configuration.
    ///
    /// In development the configured development host and port replace the
    /// supplied host and the production port. Explicit `credentials` win;
    /// without them the configured admin credentials are used.
    pub fn resolve(
        config: &OperatorConfig,
        host: &str,
        credentials: Option<Credentials>,
    ) -> StoreResult<Self> {
        let engine: StoreEngine = config.database.engine.parse()?;
        let credentials = credentials
            .or_else(|| config.database.admin.clone())
            .ok_or(StoreError::MissingCredentials)?;
        let host = if config.environment.is_development() {
            config.database.development_host.clone()
        } else {
            host.to_string()
        };
        Ok(Self {
            engine,
            host,
            port: config.effective_port(),
            database: config.database.name.clone(),
            credentials,
        })
    }

    /// Connection URL, credentials percent-encoded.
    pub fn dsn(&self) -> StoreResult<Url> {
        let raw = format!(
            "{}://{}:{}/{}",
            self.engine.scheme(),
            self.host,
            self.port,
            self.database
        );
        let mut url = Url::parse(&raw).map_err(|e| StoreError::InvalidUrl(format!("{raw}: {e}")))?;
        url.set_username(&self.credentials.username)
            .map_err(|_| StoreError::InvalidUrl(format!("{raw}: cannot carry a username")))?;
        url.set_password(Some(&self.credentials.password))
            .map_err(|_| StoreError::InvalidUrl(format!("{raw}: cannot carry a password")))?;
        Ok(url)
    }

    /// Cache key: connections are shared per (engine, host, port, database, user).
    pub fn cache_key(&self) -> String {
        format!(
            "{}://{}@{}:{}/{}",
            self.engine, self.credentials.username, self.host, self.port, self.database
        )
    }
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// Opens store handles. Reconcilers take one as a parameter so tests can
/// hand them in-memory stores.
pub trait StoreConnector: Send + Sync {
    /// Open (or reuse) a store for `target`.
    fn connect<'a>(
        &'a self,
        target: &'a ConnectTarget,
    ) -> BoxFuture<'a, StoreResult<Arc<dyn WorldStore>>>;

    /// Forget any handle held for `target`; the next connect opens a new one.
    fn invalidate<'a>(&'a self, target: &'a ConnectTarget) -> BoxFuture<'a, ()> {
        let _ = target;
        Box::pin(async {})
    }
}

/// Caches store handles per target in front of another connector.
pub struct CachedConnector<C> {
    inner: C,
    stores: RwLock<HashMap<String, Arc<dyn WorldStore>>>,
}

impl<C: StoreConnector> CachedConnector<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// Number of cached handles.
    pub async fn len(&self) -> usize {
        self.stores.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.stores.read().await.is_empty()
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: StoreConnector> StoreConnector for CachedConnector<C> {
    fn connect<'a>(
        &'a self,
        target: &'a ConnectTarget,
    ) -> BoxFuture<'a, StoreResult<Arc<dyn WorldStore>>> {
        Box::pin(async move {
            let key = target.cache_key();
            if let Some(store) = self.stores.read().await.get(&key) {
                debug!(%key, "reusing cached store connection");
                return Ok(Arc::clone(store));
            }

            let opened = self.inner.connect(target).await?;
            let mut stores = self.stores.write().await;
            // Another reconciliation may have connected while we were opening.
            let store = stores.entry(key.clone()).or_insert(opened);
            info!(%key, "store connection cached");
            Ok(Arc::clone(store))
        })
    }

    fn invalidate<'a>(&'a self, target: &'a ConnectTarget) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let key = target.cache_key();
            if self.stores.write().await.remove(&key).is_some() {
                info!(%key, "store connection invalidated");
            }
            self.inner.invalidate(target).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnector;
    use kubegame_core::AppEnvironment;

    fn config() -> OperatorConfig {
        let mut config = OperatorConfig::default();
        config.database.name = "kubegame".to_string();
        config.database.port = 6543;
        config.database.development_port = 15432;
        config
    }

    fn target(host: &str) -> ConnectTarget {
        ConnectTarget::resolve(&config(), host, Some(Credentials::new("u", "p"))).unwrap()
    }

    #[test]
    fn engine_selector_accepts_postgres_only() {
        assert_eq!("postgres".parse::<StoreEngine>().unwrap(), StoreEngine::Postgres);
        assert_eq!("PostgreSQL".parse::<StoreEngine>().unwrap(), StoreEngine::Postgres);
        assert!(matches!(
            "mysql".parse::<StoreEngine>(),
            Err(StoreError::UnsupportedEngine(ref e)) if e == "mysql"
        ));
    }

    #[test]
    fn production_target_uses_service_host() {
        let target = target("g1-postgres.default.svc");
        assert_eq!(target.host, "g1-postgres.default.svc");
        assert_eq!(target.port, 6543);
        assert_eq!(target.database, "kubegame");
        assert_eq!(
            target.dsn().unwrap().as_str(),
            "postgresql://u:p@g1-postgres.default.svc:6543/kubegame"
        );
    }

    #[test]
    fn development_target_uses_local_override() {
        let mut config = config();
        config.environment = AppEnvironment::Development;
        let target =
            ConnectTarget::resolve(&config, "g1-postgres.default.svc", Some(Credentials::new("u", "p")))
                .unwrap();
        assert_eq!(target.host, "localhost");
        assert_eq!(target.port, 15432);
    }

    #[test]
    fn admin_credentials_fill_in_when_none_given() {
        let mut config = config();
        config.database.admin = Some(Credentials::new("admin", "secret"));
        let target = ConnectTarget::resolve(&config, "db", None).unwrap();
        assert_eq!(target.credentials.username, "admin");

        let explicit = ConnectTarget::resolve(&config, "db", Some(Credentials::new("u", "p"))).unwrap();
        assert_eq!(explicit.credentials.username, "u");
    }

    #[test]
    fn no_credentials_at_all_is_an_error() {
        let result = ConnectTarget::resolve(&config(), "db", None);
        assert!(matches!(result, Err(StoreError::MissingCredentials)));
    }

    #[test]
    fn unsupported_engine_is_rejected_at_resolve() {
        let mut config = config();
        config.database.engine = "oracle".to_string();
        let result = ConnectTarget::resolve(&config, "db", Some(Credentials::new("u", "p")));
        assert!(matches!(result, Err(StoreError::UnsupportedEngine(_))));
    }

    #[test]
    fn credentials_are_percent_encoded() {
        let mut target = target("db");
        target.credentials = Credentials::new("user@corp", "p@ss/word");
        let dsn = target.dsn().unwrap();
        assert_eq!(dsn.username(), "user%40corp");
        assert_eq!(dsn.password(), Some("p%40ss%2Fword"));
    }

    #[test]
    fn malformed_host_is_invalid_url() {
        let target = target("[::1");
        assert!(matches!(target.dsn(), Err(StoreError::InvalidUrl(_))));
    }

    #[test]
    fn display_hides_password() {
        let target = target("db");
        let shown = format!("{target} {target:?}");
        assert!(shown.contains("u@db:6543/kubegame"));
        assert!(!shown.contains(":p@"));
    }

    #[tokio::test]
    async fn cache_reuses_and_invalidates() {
        let cached = CachedConnector::new(MemoryConnector::new());
        let target = target("db");

        cached.connect(&target).await.unwrap();
        cached.connect(&target).await.unwrap();
        assert_eq!(cached.inner().connect_count(), 1);
        assert_eq!(cached.len().await, 1);

        cached.invalidate(&target).await;
        assert!(cached.is_empty().await);
        assert_eq!(cached.inner().invalidation_count(), 1);

        cached.connect(&target).await.unwrap();
        assert_eq!(cached.inner().connect_count(), 2);
    }

    #[tokio::test]
    async fn cache_is_keyed_per_target() {
        let cached = CachedConnector::new(MemoryConnector::new());
        cached.connect(&target("g1-postgres.default.svc")).await.unwrap();
        cached.connect(&target("g2-postgres.default.svc")).await.unwrap();
        assert_eq!(cached.len().await, 2);
    }

    #[tokio::test]
    async fn failed_connect_is_not_cached() {
        let connector = MemoryConnector::new();
        connector.refuse_connections(true);
        let cached = CachedConnector::new(connector);

        let result = cached.connect(&target("db")).await;
        assert!(matches!(result, Err(StoreError::Connect(_))));
        assert!(cached.is_empty().await);
    }
}

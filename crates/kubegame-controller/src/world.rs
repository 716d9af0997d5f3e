//! World reconciler: records a World in its Game's database.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use kubegame_core::{
    ClusterApi, Credentials, Game, Lookup, ObjectKey, OperatorConfig, World,
};
use kubegame_persistence::{
    ConnectTarget, InsertOutcome, StoreConnector, WORLD_TABLE, WorldRecord,
};

use crate::error::{ReconcileError, ReconcileResult};
use crate::guard::ReconcileGuard;
use crate::outcome::ReconcileOutcome;

/// Converges one World at a time.
///
/// The World's `spec.game` is resolved in the World's own namespace. Nothing
/// is written until that Game is ready and its Service exists.
pub struct WorldReconciler<C, S> {
    cluster: Arc<C>,
    connector: Arc<S>,
    config: Arc<OperatorConfig>,
}

impl<C, S> WorldReconciler<C, S>
where
    C: ClusterApi,
    S: StoreConnector,
{
    pub fn new(cluster: Arc<C>, connector: Arc<S>, config: Arc<OperatorConfig>) -> Self {
        Self {
            cluster,
            connector,
            config,
        }
    }

    pub async fn reconcile(
        &self,
        key: &ObjectKey,
        guard: &ReconcileGuard,
    ) -> ReconcileResult<ReconcileOutcome> {
        let world = match guard
            .guarded(self.cluster.get::<World>(&key.namespace, &key.name))
            .await?
        {
            Lookup::Found(world) => world,
            Lookup::Absent => {
                debug!(world = %key, "world not found, nothing to do");
                return Ok(ReconcileOutcome::Absent);
            }
            Lookup::Failed(e) => return Err(e.into()),
        };

        let game_key = ObjectKey::new(key.namespace.clone(), world.spec.game.clone());
        let game = match guard
            .guarded(self.cluster.get::<Game>(&game_key.namespace, &game_key.name))
            .await?
        {
            Lookup::Found(game) => game,
            Lookup::Absent => {
                info!(world = %key, game = %game_key, "referenced game does not exist");
                return Ok(ReconcileOutcome::ParentMissing);
            }
            Lookup::Failed(e) => return Err(e.into()),
        };

        if !game.is_ready() {
            debug!(world = %key, game = %game_key, "game not ready yet");
            return Ok(ReconcileOutcome::WaitingOnParent);
        }

        let service_key = ObjectKey::new(key.namespace.clone(), game.postgres_name());
        let service = match guard
            .guarded(
                self.cluster
                    .get::<Service>(&service_key.namespace, &service_key.name),
            )
            .await?
        {
            Lookup::Found(service) => service,
            Lookup::Absent => {
                return Err(ReconcileError::MissingInfrastructure {
                    kind: "Service".to_string(),
                    key: service_key,
                });
            }
            Lookup::Failed(e) => return Err(e.into()),
        };

        let host = format!("{}.{}.svc", service.name_any(), service_key.namespace);
        let credentials = self
            .config
            .database
            .admin
            .clone()
            .unwrap_or_else(|| Credentials::from(&game.spec.database));
        let target = ConnectTarget::resolve(&self.config, &host, Some(credentials))?;
        let record = WorldRecord::from(&world);

        match self.persist(&target, &record, guard).await {
            Ok(InsertOutcome::Inserted) => {
                info!(world = %key, store = %target, "world recorded");
            }
            Ok(InsertOutcome::AlreadyPresent) => {
                debug!(world = %key, "world already recorded");
            }
            Err(ReconcileError::Store(e)) => {
                warn!(world = %key, store = %target, error = %e, "store failure, dropping cached connection");
                self.connector.invalidate(&target).await;
                return Err(e.into());
            }
            Err(e) => return Err(e),
        }

        Ok(ReconcileOutcome::Converged)
    }

    async fn persist(
        &self,
        target: &ConnectTarget,
        record: &WorldRecord,
        guard: &ReconcileGuard,
    ) -> ReconcileResult<InsertOutcome> {
        let store = guard.guarded(self.connector.connect(target)).await??;

        if !guard.guarded(store.table_exists(WORLD_TABLE)).await?? {
            guard.guarded(store.create_world_table()).await??;
            info!(store = %target, table = WORLD_TABLE, "table created");
        }

        Ok(guard.guarded(store.insert_world(record)).await??)
    }
}

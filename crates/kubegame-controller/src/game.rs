//! Game reconciler. Provisions the Postgres Deployment and Service for a
//! Game and marks it ready.
//!
//! Ownership chain: Game → Deployment → Service. Deleting a Game removes
//! both through the owner references set here.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use tracing::{debug, info};

use kubegame_core::cluster::kind_of;
use kubegame_core::{
    ClusterApi, ClusterObject, CreateOutcome, Game, GameStatus, Lookup, ObjectKey,
    OperatorConfig, ReadinessGate, set_controller_owner,
};

use crate::error::{ReconcileError, ReconcileResult};
use crate::guard::ReconcileGuard;
use crate::materialize::{postgres_deployment, postgres_service};
use crate::outcome::ReconcileOutcome;

/// Converges one Game at a time. Safe to run repeatedly on the same key.
pub struct GameReconciler<C> {
    cluster: Arc<C>,
    config: Arc<OperatorConfig>,
}

impl<C: ClusterApi> GameReconciler<C> {
    pub fn new(cluster: Arc<C>, config: Arc<OperatorConfig>) -> Self {
        Self { cluster, config }
    }

    pub async fn reconcile(
        &self,
        key: &ObjectKey,
        guard: &ReconcileGuard,
    ) -> ReconcileResult<ReconcileOutcome> {
        let game = match guard
            .guarded(self.cluster.get::<Game>(&key.namespace, &key.name))
            .await?
        {
            Lookup::Found(game) => game,
            Lookup::Absent => {
                debug!(game = %key, "game not found, nothing to do");
                return Ok(ReconcileOutcome::Absent);
            }
            Lookup::Failed(e) => return Err(e.into()),
        };

        if game.is_terminating() {
            info!(game = %key, "game is being deleted, leaving cleanup to owner references");
            return Ok(ReconcileOutcome::Terminating);
        }

        let gate = self.config.reconcile.readiness;
        let game = match gate {
            ReadinessGate::Eager => self.mark_ready(game, key, guard).await?,
            ReadinessGate::AfterProvisioning => game,
        };

        let deployment = self.ensure_deployment(&game, key, guard).await?;
        self.ensure_service(&game, &deployment, key, guard).await?;

        if gate == ReadinessGate::AfterProvisioning {
            self.mark_ready(game, key, guard).await?;
        }

        debug!(game = %key, "game converged");
        Ok(ReconcileOutcome::Converged)
    }

    async fn mark_ready(
        &self,
        mut game: Game,
        key: &ObjectKey,
        guard: &ReconcileGuard,
    ) -> ReconcileResult<Game> {
        if game.is_ready() {
            debug!(game = %key, "game already ready");
            return Ok(game);
        }
        game.status = Some(GameStatus { ready: true });
        let game = guard.guarded(self.cluster.update_status(&game)).await??;
        info!(game = %key, "game marked ready");
        Ok(game)
    }

    async fn ensure_deployment(
        &self,
        game: &Game,
        key: &ObjectKey,
        guard: &ReconcileGuard,
    ) -> ReconcileResult<Deployment> {
        let name = game.postgres_name();
        match guard
            .guarded(self.cluster.get::<Deployment>(&key.namespace, &name))
            .await?
        {
            Lookup::Found(deployment) => {
                debug!(game = %key, deployment = %name, "deployment present");
                Ok(deployment)
            }
            Lookup::Failed(e) => Err(e.into()),
            Lookup::Absent => {
                let mut deployment = postgres_deployment(game, &self.config);
                set_controller_owner(game, &mut deployment)?;
                create_if_absent(self.cluster.as_ref(), deployment, guard).await
            }
        }
    }

    async fn ensure_service(
        &self,
        game: &Game,
        deployment: &Deployment,
        key: &ObjectKey,
        guard: &ReconcileGuard,
    ) -> ReconcileResult<Service> {
        let name = game.postgres_name();
        match guard
            .guarded(self.cluster.get::<Service>(&key.namespace, &name))
            .await?
        {
            Lookup::Found(service) => {
                debug!(game = %key, service = %name, "service present");
                Ok(service)
            }
            Lookup::Failed(e) => Err(e.into()),
            Lookup::Absent => {
                let mut service = postgres_service(game, &self.config);
                set_controller_owner(deployment, &mut service)?;
                create_if_absent(self.cluster.as_ref(), service, guard).await
            }
        }
    }
}

/// Create `object`; a name collision means another reconciliation won the
/// race, so read back and continue with its copy.
async fn create_if_absent<C, K>(
    cluster: &C,
    object: K,
    guard: &ReconcileGuard,
) -> ReconcileResult<K>
where
    C: ClusterApi,
    K: ClusterObject,
{
    let key = ObjectKey::of(&object);
    let kind = kind_of::<K>();

    match guard.guarded(cluster.create(&object)).await?? {
        CreateOutcome::Created(created) => {
            info!(%kind, object = %key, "created");
            Ok(created)
        }
        CreateOutcome::AlreadyExists => {
            debug!(%kind, object = %key, "already exists, reading it back");
            match guard
                .guarded(cluster.get::<K>(&key.namespace, &key.name))
                .await?
            {
                Lookup::Found(existing) => Ok(existing),
                Lookup::Absent => Err(ReconcileError::Vanished { kind, key }),
                Lookup::Failed(e) => Err(e.into()),
            }
        }
    }
}

//! Event-driven dispatch of the Game and World reconcilers.
//!
//! Each kind gets a kube runtime [`Controller`], which never runs two
//! reconciliations of the same object at once. Success waits for the next
//! change; failure requeues with a per-object exponential delay.

use std::sync::Arc;

use futures::{StreamExt, future};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::controller::{self, Action};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{Controller, watcher};
use kube::{Api, Client, Resource, ResourceExt};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use kubegame_controller::{
    GameReconciler, KubeCluster, ReconcileError, ReconcileGuard, ReconcileResult, RetryBackoff,
    WorldReconciler,
};
use kubegame_core::{GAME_LABEL, Game, ObjectKey, OperatorConfig, World, postgres_name};
use kubegame_persistence::{CachedConnector, PgConnector};

type GameContext = Context<GameReconciler<KubeCluster>>;
type WorldContext = Context<WorldReconciler<KubeCluster, CachedConnector<PgConnector>>>;

/// State shared by every reconciliation of one kind.
pub struct Context<R> {
    reconciler: R,
    backoff: RetryBackoff,
    config: Arc<OperatorConfig>,
    shutdown: watch::Receiver<bool>,
}

impl<R> Context<R> {
    pub fn new(reconciler: R, config: Arc<OperatorConfig>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            reconciler,
            backoff: RetryBackoff::from_config(&config),
            config,
            shutdown,
        }
    }

    fn guard(&self) -> ReconcileGuard {
        ReconcileGuard::new(self.shutdown.clone(), Some(self.config.reconcile_timeout()))
    }
}

/// Run both controllers until `shutdown` flips to true.
pub async fn run(
    client: Client,
    config: Arc<OperatorConfig>,
    namespace: Option<String>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let namespace = namespace.as_deref();
    let cluster = Arc::new(KubeCluster::new(client.clone()));
    let connector = Arc::new(CachedConnector::new(PgConnector::from_config(&config)));

    let game_ctx: Arc<GameContext> = Arc::new(Context::new(
        GameReconciler::new(Arc::clone(&cluster), Arc::clone(&config)),
        Arc::clone(&config),
        shutdown.clone(),
    ));
    let world_ctx: Arc<WorldContext> = Arc::new(Context::new(
        WorldReconciler::new(Arc::clone(&cluster), connector, Arc::clone(&config)),
        Arc::clone(&config),
        shutdown.clone(),
    ));

    // ── Game controller ────────────────────────────────────────

    // The Service is owned by the Deployment, so `owns` cannot see it; map
    // it back to its Game through the label instead.
    let games = Controller::new(api::<Game>(&client, namespace), watcher::Config::default())
        .owns(api::<Deployment>(&client, namespace), watcher::Config::default())
        .watches(
            api::<Service>(&client, namespace),
            watcher::Config::default().labels(GAME_LABEL),
            |service: Service| game_of_service(&service),
        )
        .graceful_shutdown_on(shutdown_trigger(shutdown.clone()))
        .run(reconcile_game, error_policy::<Game, _>, Arc::clone(&game_ctx))
        .for_each(|result| {
            log_result("Game", result, &game_ctx.backoff);
            future::ready(())
        });

    // ── World controller ───────────────────────────────────────

    let world_controller =
        Controller::new(api::<World>(&client, namespace), watcher::Config::default());
    let known_worlds = world_controller.store();
    let worlds = world_controller
        .watches(
            api::<Game>(&client, namespace),
            watcher::Config::default(),
            move |game: Game| worlds_referencing(&known_worlds.state(), &game),
        )
        .graceful_shutdown_on(shutdown_trigger(shutdown))
        .run(reconcile_world, error_policy::<World, _>, Arc::clone(&world_ctx))
        .for_each(|result| {
            log_result("World", result, &world_ctx.backoff);
            future::ready(())
        });

    info!(namespace = namespace.unwrap_or("<all>"), "controllers started");
    tokio::join!(games, worlds);
    info!("controllers stopped");
    Ok(())
}

async fn reconcile_game(game: Arc<Game>, ctx: Arc<GameContext>) -> ReconcileResult<Action> {
    let key = ObjectKey::of(game.as_ref());
    let outcome = ctx.reconciler.reconcile(&key, &ctx.guard()).await?;
    ctx.backoff.reset(&key);
    debug!(game = %key, %outcome, "reconciled");
    Ok(Action::await_change())
}

async fn reconcile_world(world: Arc<World>, ctx: Arc<WorldContext>) -> ReconcileResult<Action> {
    let key = ObjectKey::of(world.as_ref());
    let outcome = ctx.reconciler.reconcile(&key, &ctx.guard()).await?;
    ctx.backoff.reset(&key);
    debug!(world = %key, %outcome, "reconciled");
    Ok(Action::await_change())
}

/// Requeue a failed object after its next backoff delay.
fn error_policy<K: Resource, R>(
    object: Arc<K>,
    error: &ReconcileError,
    ctx: Arc<Context<R>>,
) -> Action {
    let key = ObjectKey::of(object.as_ref());
    let delay = ctx.backoff.next_delay(&key);
    warn!(object = %key, %error, retry_in = ?delay, "reconciliation failed");
    Action::requeue(delay)
}

/// Worlds in `game`'s namespace whose `spec.game` names it.
fn worlds_referencing(worlds: &[Arc<World>], game: &Game) -> Vec<ObjectRef<World>> {
    let name = game.name_any();
    let namespace = game.namespace();
    worlds
        .iter()
        .filter(|w| w.spec.game == name && w.namespace() == namespace)
        .map(|w| ObjectRef::from_obj(w.as_ref()))
        .collect()
}

/// The Game a Postgres Service was provisioned for, read from its label.
/// Services whose name does not match the label are ignored.
fn game_of_service(service: &Service) -> Option<ObjectRef<Game>> {
    let game = service.labels().get(GAME_LABEL)?;
    if service.name_any() != postgres_name(game) {
        return None;
    }
    let object = ObjectRef::new(game);
    Some(match service.namespace() {
        Some(ns) => object.within(&ns),
        None => object,
    })
}

fn api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Resolves once `shutdown` is set or its sender is gone.
async fn shutdown_trigger(mut shutdown: watch::Receiver<bool>) {
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        while !*shutdown.borrow_and_update() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        let _ = tx.send(());
    });
    let _ = rx.await;
}

/// Log one controller result. An object that left the watch cache will not
/// be requeued again, so its failure history is dropped here.
fn log_result<K, E1, E2>(
    kind: &str,
    result: Result<(ObjectRef<K>, Action), controller::Error<E1, E2>>,
    backoff: &RetryBackoff,
) where
    K: Resource,
    E1: std::error::Error + 'static,
    E2: std::error::Error + 'static,
{
    match result {
        Ok((object, _)) => debug!(%kind, object = %object.name, "reconcile pass finished"),
        Err(controller::Error::ReconcilerFailed(_, object)) => {
            debug!(%kind, object = %object.name, "reconcile pass failed, requeued");
        }
        Err(controller::Error::ObjectNotFound(object)) => {
            let key = ObjectKey::new(object.namespace.unwrap_or_default(), object.name);
            backoff.reset(&key);
            debug!(%kind, object = %key, "object gone, retry history dropped");
        }
        Err(e) => warn!(%kind, error = %e, "controller error"),
    }
}

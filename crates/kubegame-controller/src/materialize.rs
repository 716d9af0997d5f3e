//! Desired Deployment and Service for a Game's Postgres instance.
//!
//! Pure builders: owner references are attached by the reconciler once the
//! owner's uid is known.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, EnvVar, PodSpec, PodTemplateSpec, Service,
    ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use kubegame_core::{Game, OperatorConfig, postgres_labels, postgres_name};

/// Name shared by the container, its port, and the Service port.
pub const POSTGRES_PORT_NAME: &str = "postgres";
const STORAGE_VOLUME: &str = "postgres-storage";

fn metadata(game: &Game) -> ObjectMeta {
    let game_name = game.name_any();
    ObjectMeta {
        name: Some(postgres_name(&game_name)),
        namespace: game.namespace(),
        labels: Some(postgres_labels(&game_name)),
        ..ObjectMeta::default()
    }
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..EnvVar::default()
    }
}

/// Single-replica Postgres bootstrapped with the Game's credentials.
pub fn postgres_deployment(game: &Game, config: &OperatorConfig) -> Deployment {
    let labels = postgres_labels(&game.name_any());
    let database = &game.spec.database;

    let container = Container {
        name: "postgres".to_string(),
        image: Some(config.postgres.image.clone()),
        ports: Some(vec![ContainerPort {
            name: Some(POSTGRES_PORT_NAME.to_string()),
            container_port: config.postgres.container_port,
            protocol: Some("TCP".to_string()),
            ..ContainerPort::default()
        }]),
        env: Some(vec![
            env("POSTGRES_DB", &config.database.name),
            env("POSTGRES_USER", &database.username),
            env("POSTGRES_PASSWORD", &database.password),
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: STORAGE_VOLUME.to_string(),
            mount_path: config.postgres.data_path.clone(),
            ..VolumeMount::default()
        }]),
        ..Container::default()
    };

    Deployment {
        metadata: metadata(game),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![Volume {
                        name: STORAGE_VOLUME.to_string(),
                        empty_dir: Some(EmptyDirVolumeSource::default()),
                        ..Volume::default()
                    }]),
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

/// ClusterIP Service in front of the Postgres pods.
pub fn postgres_service(game: &Game, config: &OperatorConfig) -> Service {
    Service {
        metadata: metadata(game),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(postgres_labels(&game.name_any())),
            ports: Some(vec![ServicePort {
                name: Some(POSTGRES_PORT_NAME.to_string()),
                protocol: Some("TCP".to_string()),
                port: i32::from(config.database.port),
                target_port: Some(IntOrString::String(POSTGRES_PORT_NAME.to_string())),
                ..ServicePort::default()
            }]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

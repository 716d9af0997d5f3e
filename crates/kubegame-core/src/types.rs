//! Custom resource kinds reconciled by the operator, plus the naming rules
//! shared by everything that derives infrastructure from a Game.

use std::collections::BTreeMap;
use std::fmt;

use kube::{CustomResource, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the Game and World kinds.
pub const API_GROUP: &str = "kubegame.systemcraftsman.com";

/// Suffix appended to a Game name to name its Postgres Deployment and Service.
pub const POSTGRES_SUFFIX: &str = "-postgres";

// ── Game ──────────────────────────────────────────────────────────

/// Desired state of a Game: the credentials its Postgres instance is
/// bootstrapped with.
#[derive(CustomResource, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[kube(
    group = "kubegame.systemcraftsman.com",
    version = "v1alpha1",
    kind = "Game",
    namespaced,
    status = "GameStatus",
    shortname = "game",
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#
)]
pub struct GameSpec {
    pub database: DatabaseSpec,
}

/// Database credentials declared on a Game.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct DatabaseSpec {
    pub username: String,
    pub password: String,
}

/// Observed state of a Game, owned by the Game reconciler.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct GameStatus {
    #[serde(default)]
    pub ready: bool,
}

impl fmt::Debug for GameSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameSpec")
            .field("database", &self.database)
            .finish()
    }
}

impl fmt::Debug for DatabaseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSpec")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Game {
    /// Whether the Game's status reports its infrastructure as provisioned.
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.ready)
    }

    /// Whether the Game carries a deletion timestamp.
    pub fn is_terminating(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }

    /// Name of the Deployment and Service backing this Game.
    pub fn postgres_name(&self) -> String {
        postgres_name(&self.name_any())
    }
}

// ── World ─────────────────────────────────────────────────────────

/// Desired state of a World: the Game it belongs to and a description.
///
/// `game` is a lookup reference inside the World's namespace, not an owner.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[kube(
    group = "kubegame.systemcraftsman.com",
    version = "v1alpha1",
    kind = "World",
    namespaced,
    shortname = "world",
    printcolumn = r#"{"name":"Game","type":"string","jsonPath":".spec.game"}"#
)]
pub struct WorldSpec {
    pub game: String,
    #[serde(default)]
    pub description: String,
}

// ── Identity ──────────────────────────────────────────────────────

/// Namespace-scoped identity of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an existing object. Cluster-scoped objects get an empty namespace.
    pub fn of<K: Resource>(object: &K) -> Self {
        Self::new(object.namespace().unwrap_or_default(), object.name_any())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// ── Credentials ───────────────────────────────────────────────────

/// Username/password pair used to open a store connection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl From<&DatabaseSpec> for Credentials {
    fn from(spec: &DatabaseSpec) -> Self {
        Self::new(spec.username.clone(), spec.password.clone())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ── Naming ────────────────────────────────────────────────────────

/// `<game>-postgres`.
pub fn postgres_name(game_name: &str) -> String {
    format!("{game_name}{POSTGRES_SUFFIX}")
}

/// Label naming the Game a Postgres object was provisioned for.
pub const GAME_LABEL: &str = "game";

/// Labels shared by the Postgres Deployment, its pods, and the Service selector.
pub fn postgres_labels(game_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), postgres_name(game_name)),
        (GAME_LABEL.to_string(), game_name.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    fn game(name: &str, ready: Option<bool>) -> Game {
        let mut game = Game::new(
            name,
            GameSpec {
                database: DatabaseSpec {
                    username: "u".to_string(),
                    password: "p".to_string(),
                },
            },
        );
        game.metadata.namespace = Some("default".to_string());
        game.status = ready.map(|ready| GameStatus { ready });
        game
    }

    #[test]
    fn postgres_name_appends_suffix() {
        assert_eq!(postgres_name("g1"), "g1-postgres");
        assert_eq!(game("g1", None).postgres_name(), "g1-postgres");
    }

    #[test]
    fn labels_carry_app_and_game() {
        let labels = postgres_labels("g1");
        assert_eq!(labels.get("app").map(String::as_str), Some("g1-postgres"));
        assert_eq!(labels.get("game").map(String::as_str), Some("g1"));
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn missing_status_is_not_ready() {
        assert!(!game("g1", None).is_ready());
        assert!(!game("g1", Some(false)).is_ready());
        assert!(game("g1", Some(true)).is_ready());
    }

    #[test]
    fn status_without_ready_field_defaults_to_false() {
        let status: GameStatus = serde_json::from_str("{}").unwrap();
        assert!(!status.ready);
    }

    #[test]
    fn world_description_is_optional() {
        let spec: WorldSpec = serde_json::from_str(r#"{"game":"g1"}"#).unwrap();
        assert_eq!(spec.game, "g1");
        assert!(spec.description.is_empty());
    }

    #[test]
    fn object_key_display() {
        let key = ObjectKey::of(&game("g1", None));
        assert_eq!(key, ObjectKey::new("default", "g1"));
        assert_eq!(key.to_string(), "default/g1");
    }

    #[test]
    fn debug_output_redacts_passwords() {
        let rendered = format!("{:?}", game("g1", None).spec);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("\"p\""));

        let creds = Credentials::new("admin", "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[test]
    fn crds_use_the_kubegame_group() {
        let crd = Game::crd();
        assert_eq!(crd.spec.group, API_GROUP);
        assert_eq!(crd.spec.names.kind, "Game");
        assert_eq!(World::crd().spec.names.kind, "World");
    }
}

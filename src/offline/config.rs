use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the offline controller.
///
/// Partition names are derived here and nowhere else.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Origin every relative URL is resolved against.
    pub origin: String,
    /// Prefix shared by every partition this application owns.
    pub cache_prefix: String,
    pub cache_version: String,
    /// Application shell, fetched and stored at install time.
    pub shell_manifest: Vec<String>,
    pub shell_root: String,
    pub cacheable_api_routes: Vec<String>,
    #[serde(with = "millis")]
    pub network_timeout: Duration,
    /// How long a drain may hold a queue entry before others may reclaim it.
    #[serde(with = "millis")]
    pub queue_lease: Duration,
    pub sync_tag: String,
    pub periodic_sync_tag: String,
    pub periodic_refresh_path: String,
    pub push_defaults: PushDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushDefaults {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub url: String,
}

impl Default for PushDefaults {
    fn default() -> Self {
        Self {
            title: "Toolbox".to_string(),
            body: "You have a new notification".to_string(),
            icon: "/icons/icon-192x192.png".to_string(),
            url: "/".to_string(),
        }
    }
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:5000".to_string(),
            cache_prefix: "toolbox".to_string(),
            cache_version: "v1".to_string(),
            shell_manifest: [
                "/",
                "/manifest.json",
                "/icons/icon-192x192.png",
                "/icons/icon-512x512.png",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            shell_root: "/".to_string(),
            cacheable_api_routes: [
                "/api/user",
                "/api/todos",
                "/api/notes",
                "/api/habits",
                "/api/flashcard-decks",
                "/api/voice-recordings",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            network_timeout: Duration::from_secs(10),
            queue_lease: Duration::from_secs(300),
            sync_tag: "sync-offline-actions".to_string(),
            periodic_sync_tag: "refresh-api-cache".to_string(),
            periodic_refresh_path: "/api/todos".to_string(),
            push_defaults: PushDefaults::default(),
        }
    }
}

impl OfflineConfig {
    pub fn static_cache_name(&self) -> String {
        format!("{}-static-{}", self.cache_prefix, self.cache_version)
    }

    pub fn dynamic_cache_name(&self) -> String {
        format!("{}-dynamic-{}", self.cache_prefix, self.cache_version)
    }

    pub fn current_cache_names(&self) -> [String; 2] {
        [self.static_cache_name(), self.dynamic_cache_name()]
    }

    /// True for partitions created by any version of this application.
    pub fn owns_cache(&self, name: &str) -> bool {
        name.starts_with(&format!("{}-", self.cache_prefix))
    }

    /// A route matches itself and anything nested below it.
    pub fn is_cacheable_api(&self, path: &str) -> bool {
        self.cacheable_api_routes.iter().any(|route| {
            path == route
                || path
                    .strip_prefix(route.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

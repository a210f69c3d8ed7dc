//! Push notifications and the open application windows they point at.

use crate::offline::config::PushDefaults;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

pub const ACTION_OPEN: &str = "open";
pub const ACTION_DISMISS: &str = "dismiss";

#[derive(Debug, Default, Deserialize)]
struct PushPayload {
    title: Option<String>,
    body: Option<String>,
    icon: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    /// Absolute URL opened or focused on click.
    pub url: String,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    /// Builds a notification from a raw push payload, filling gaps from
    /// `defaults`. A payload that is not JSON is logged and ignored.
    pub fn from_push(payload: Option<&[u8]>, defaults: &PushDefaults, origin: &str) -> Self {
        let parsed = match payload {
            Some(bytes) if !bytes.is_empty() => match serde_json::from_slice::<PushPayload>(bytes) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(error = %e, "malformed push payload, using defaults");
                    PushPayload::default()
                }
            },
            _ => PushPayload::default(),
        };

        let target = parsed.url.unwrap_or_else(|| defaults.url.clone());
        Self {
            title: parsed.title.unwrap_or_else(|| defaults.title.clone()),
            body: parsed.body.unwrap_or_else(|| defaults.body.clone()),
            icon: parsed.icon.unwrap_or_else(|| defaults.icon.clone()),
            url: absolutize(origin, &target),
            actions: vec![
                NotificationAction {
                    action: ACTION_OPEN.to_string(),
                    title: "Open".to_string(),
                },
                NotificationAction {
                    action: ACTION_DISMISS.to_string(),
                    title: "Dismiss".to_string(),
                },
            ],
        }
    }
}

fn absolutize(origin: &str, target: &str) -> String {
    match reqwest::Url::parse(origin).and_then(|base| base.join(target)) {
        Ok(url) => url.to_string(),
        Err(_) => target.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientWindow {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClickOutcome {
    Dismissed,
    Focused(ClientWindow),
    Opened(Option<ClientWindow>),
}

/// Application windows controlled by this origin.
#[async_trait]
pub trait Clients: Send + Sync {
    async fn windows(&self) -> Vec<ClientWindow>;
    async fn focus(&self, id: &str) -> bool;
    async fn open_window(&self, url: &str) -> Option<ClientWindow>;
    /// Takes control of every open window without waiting for a reload.
    async fn claim(&self);
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Window registry for runs without a browser attached.
#[derive(Default)]
pub struct HeadlessClients {
    windows: RwLock<Vec<ClientWindow>>,
}

impl HeadlessClients {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, url: &str) -> ClientWindow {
        let window = ClientWindow {
            id: Uuid::new_v4().to_string(),
            url: url.to_string(),
        };
        self.windows.write().await.push(window.clone());
        window
    }
}

#[async_trait]
impl Clients for HeadlessClients {
    async fn windows(&self) -> Vec<ClientWindow> {
        self.windows.read().await.clone()
    }

    async fn focus(&self, id: &str) -> bool {
        let found = self.windows.read().await.iter().any(|w| w.id == id);
        tracing::debug!(id, found, "focus window");
        found
    }

    async fn open_window(&self, url: &str) -> Option<ClientWindow> {
        Some(self.register(url).await)
    }

    async fn claim(&self) {
        let count = self.windows.read().await.len();
        tracing::debug!(count, "claimed clients");
    }
}

/// Writes notifications to the log.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn show(&self, notification: &Notification) -> anyhow::Result<()> {
        tracing::info!(
            title = %notification.title,
            body = %notification.body,
            url = %notification.url,
            "notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "http://localhost:5000";

    #[test]
    fn test_missing_fields_use_defaults() {
        let defaults = PushDefaults::default();
        let notification = Notification::from_push(Some(br#"{"title":"Habit due"}"#.as_slice()), &defaults, ORIGIN);

        assert_eq!(notification.title, "Habit due");
        assert_eq!(notification.body, defaults.body);
        assert_eq!(notification.icon, defaults.icon);
        assert_eq!(notification.url, "http://localhost:5000/");
        let actions: Vec<&str> = notification.actions.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(actions, vec![ACTION_OPEN, ACTION_DISMISS]);
    }

    #[test]
    fn test_malformed_payload_falls_back() {
        let defaults = PushDefaults::default();
        let notification = Notification::from_push(Some(b"not json".as_slice()), &defaults, ORIGIN);
        assert_eq!(notification.title, defaults.title);

        let empty = Notification::from_push(None, &defaults, ORIGIN);
        assert_eq!(empty, notification);
    }

    #[test]
    fn test_relative_target_is_resolved() {
        let payload: &[u8] = br#"{"url":"/tools/flashcards"}"#;
        let notification = Notification::from_push(Some(payload), &PushDefaults::default(), ORIGIN);
        assert_eq!(notification.url, "http://localhost:5000/tools/flashcards");
    }

    #[tokio::test]
    async fn test_headless_clients_track_windows() {
        let clients = HeadlessClients::new();
        let window = clients.register("http://localhost:5000/notes").await;

        assert!(clients.focus(&window.id).await);
        assert!(!clients.focus("missing").await);
        clients.open_window("http://localhost:5000/").await;
        assert_eq!(clients.windows().await.len(), 2);
    }
}

//! User-facing notice surfaces
//!
//! Two surfaces: a transient notice that never blocks, and an alert that
//! offers a set of actions and resolves to the one picked.

use async_trait::async_trait;
use log::info;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeDuration {
    Short,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStyle {
    Default,
    Cancel,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertAction {
    pub text: String,
    pub style: ActionStyle,
}

impl AlertAction {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: ActionStyle::Default,
        }
    }

    pub fn cancel(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: ActionStyle::Cancel,
        }
    }
}

/// A blocking choice dialog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub actions: Vec<AlertAction>,
}

impl Alert {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            actions: Vec::new(),
        }
    }

    /// Informational alert with a single OK button
    pub fn info(title: impl Into<String>) -> Self {
        Self::new(title, "").with_action(AlertAction::new("OK"))
    }

    pub fn with_action(mut self, action: AlertAction) -> Self {
        self.actions.push(action);
        self
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Show a transient notice; returns immediately
    fn notice(&self, message: &str, duration: NoticeDuration);

    /// Show an alert and wait for the user. `None` means it was dismissed.
    async fn alert(&self, alert: Alert) -> Option<usize>;
}

/// Notifier for hosts without a screen: everything goes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier {
    answer: Option<usize>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every alert with the given action index
    pub fn answering(index: usize) -> Self {
        Self {
            answer: Some(index),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn notice(&self, message: &str, duration: NoticeDuration) {
        info!("Notice ({:?}): {}", duration, message);
    }

    async fn alert(&self, alert: Alert) -> Option<usize> {
        let chosen = self.answer.filter(|i| *i < alert.actions.len());
        info!(
            "Alert '{}': {} -> {:?}",
            alert.title,
            alert.message,
            chosen.map(|i| alert.actions[i].text.as_str())
        );
        chosen
    }
}

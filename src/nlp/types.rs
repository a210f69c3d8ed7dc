use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured task extracted from free-form text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTask {
    pub title: String,
    pub tags: Vec<String>,
    pub labels: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub reminder_date: Option<DateTime<Utc>>,
    pub priority: Level,
    pub urgency: Level,
    pub importance: Level,
    pub estimated_duration: Option<u32>,
    pub is_recurring: bool,
    pub recurring_pattern: Option<RecurringPattern>,
    pub category: Option<Category>,
    pub original_text: String,
}

impl ParsedTask {
    pub(crate) fn blank(original_text: &str) -> Self {
        Self {
            title: String::new(),
            tags: Vec::new(),
            labels: Vec::new(),
            due_date: None,
            reminder_date: None,
            priority: Level::Medium,
            urgency: Level::Medium,
            importance: Level::Medium,
            estimated_duration: None,
            is_recurring: false,
            recurring_pattern: None,
            category: None,
            original_text: original_text.to_string(),
        }
    }

    /// Priority, urgency and importance always move together.
    pub(crate) fn set_level(&mut self, level: Level) {
        self.priority = level;
        self.urgency = level;
        self.importance = level;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceKind {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringPattern {
    #[serde(rename = "type")]
    pub kind: RecurrenceKind,
    pub interval: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Work,
    Personal,
    Health,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_camel_case_fields() {
        let mut task = ParsedTask::blank("read book");
        task.title = "read book".to_string();
        task.recurring_pattern = Some(RecurringPattern {
            kind: RecurrenceKind::Weekly,
            interval: 2,
        });
        task.is_recurring = true;

        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["originalText"], "read book");
        assert_eq!(json["isRecurring"], true);
        assert_eq!(json["priority"], "medium");
        assert_eq!(json["recurringPattern"]["type"], "weekly");
        assert_eq!(json["recurringPattern"]["interval"], 2);
        assert!(json["dueDate"].is_null());
    }

    #[test]
    fn test_set_level_moves_all_three_axes() {
        let mut task = ParsedTask::blank("");
        task.set_level(Level::High);
        assert_eq!(task.priority, Level::High);
        assert_eq!(task.urgency, Level::High);
        assert_eq!(task.importance, Level::High);
    }
}

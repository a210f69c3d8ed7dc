use crate::nlp::types::{Category, RecurrenceKind};
use serde::{Deserialize, Serialize};

/// Keyword data driving the priority, recurrence and category passes.
///
/// Matching is case-insensitive. Order inside `recurrence_rules` and
/// `categories` is significant: the first hit wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordTables {
    pub high_priority: Vec<String>,
    pub low_priority: Vec<String>,
    /// Words that mark a task as recurring even when no rule below resolves.
    pub recurrence_triggers: Vec<String>,
    pub recurrence_rules: Vec<RecurrenceRule>,
    pub categories: Vec<CategoryRule>,
    /// Substring that turns on reminder extraction.
    pub reminder_marker: String,
    pub reminder_lead_minutes: i64,
    pub fallback_title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub phrases: Vec<String>,
    pub kind: RecurrenceKind,
    pub interval: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: Category,
    pub keywords: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

impl Default for KeywordTables {
    fn default() -> Self {
        Self {
            high_priority: words(&[
                "urgent",
                "asap",
                "important",
                "critical",
                "high priority",
                "emergency",
            ]),
            low_priority: words(&["maybe", "sometime", "when possible", "low priority"]),
            recurrence_triggers: words(&["daily", "weekly", "monthly", "yearly", "every"]),
            recurrence_rules: vec![
                RecurrenceRule {
                    phrases: words(&["daily", "every day"]),
                    kind: RecurrenceKind::Daily,
                    interval: 1,
                },
                RecurrenceRule {
                    phrases: words(&["weekly", "every week"]),
                    kind: RecurrenceKind::Weekly,
                    interval: 1,
                },
                RecurrenceRule {
                    phrases: words(&["monthly", "every month"]),
                    kind: RecurrenceKind::Monthly,
                    interval: 1,
                },
                RecurrenceRule {
                    phrases: words(&["every other day"]),
                    kind: RecurrenceKind::Daily,
                    interval: 2,
                },
                RecurrenceRule {
                    phrases: words(&["every other week"]),
                    kind: RecurrenceKind::Weekly,
                    interval: 2,
                },
            ],
            categories: vec![
                CategoryRule {
                    category: Category::Work,
                    keywords: words(&["meeting", "call", "project", "work", "office", "client"]),
                },
                CategoryRule {
                    category: Category::Personal,
                    keywords: words(&["home", "family", "personal", "buy", "grocery"]),
                },
                CategoryRule {
                    category: Category::Health,
                    keywords: words(&["doctor", "gym", "exercise", "health", "appointment"]),
                },
            ],
            reminder_marker: "remind".to_string(),
            reminder_lead_minutes: 30,
            fallback_title: "New Task".to_string(),
        }
    }
}

/// Returns true when any of `keywords` occurs in the already lowercased text.
pub(crate) fn contains_any(lowered: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|k| !k.is_empty() && lowered.contains(&k.to_lowercase()))
}

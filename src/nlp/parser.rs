use crate::nlp::dates;
use crate::nlp::keywords::{KeywordTables, contains_any};
use crate::nlp::types::{Level, ParsedTask, RecurringPattern};
use chrono::{DateTime, Duration, Local};
use once_cell::sync::Lazy;
use regex::Regex;

static TAG_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").unwrap());

static LABEL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\w+)").unwrap());

static DURATION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s*(minute|min|hour|hr)s?").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static DEFAULT_PARSER: Lazy<TaskParser> = Lazy::new(TaskParser::default);

/// Parses with the built-in keyword tables.
pub fn parse(input: &str) -> ParsedTask {
    DEFAULT_PARSER.parse(input)
}

/// Turns free-form task text into a [`ParsedTask`].
///
/// The parser holds only immutable keyword data and compiled patterns, so a
/// single instance can be shared freely between threads.
pub struct TaskParser {
    keywords: KeywordTables,
    /// Priority keywords, longest first, removed as plain substrings.
    priority_strippers: Vec<Regex>,
    /// Recurrence triggers, removed on word boundaries.
    recurrence_strippers: Vec<Regex>,
}

impl Default for TaskParser {
    fn default() -> Self {
        Self::new(KeywordTables::default())
    }
}

impl TaskParser {
    pub fn new(keywords: KeywordTables) -> Self {
        let mut priority_words: Vec<&String> = keywords
            .high_priority
            .iter()
            .chain(keywords.low_priority.iter())
            .filter(|w| !w.is_empty())
            .collect();
        priority_words.sort_by_key(|w| std::cmp::Reverse(w.len()));

        let priority_strippers = priority_words
            .into_iter()
            .filter_map(|w| Regex::new(&format!("(?i){}", regex::escape(w))).ok())
            .collect();

        let recurrence_strippers = keywords
            .recurrence_triggers
            .iter()
            .filter(|w| !w.is_empty())
            .filter_map(|w| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(w))).ok())
            .collect();

        Self {
            keywords,
            priority_strippers,
            recurrence_strippers,
        }
    }

    pub fn keywords(&self) -> &KeywordTables {
        &self.keywords
    }

    pub fn parse(&self, input: &str) -> ParsedTask {
        self.parse_at(input, Local::now())
    }

    /// Same as [`TaskParser::parse`], with relative dates resolved against `now`.
    pub fn parse_at(&self, input: &str, now: DateTime<Local>) -> ParsedTask {
        let mut task = ParsedTask::blank(input);
        let lowered = input.to_lowercase();

        // Tags and labels
        task.tags = TAG_PATTERN
            .captures_iter(input)
            .map(|cap| cap[1].to_string())
            .collect();
        task.labels = LABEL_PATTERN
            .captures_iter(input)
            .map(|cap| cap[1].to_string())
            .collect();
        let mut working = TAG_PATTERN.replace_all(input, "").to_string();
        working = LABEL_PATTERN.replace_all(&working, "").to_string();

        // Dates come from the untouched input
        let found = dates::scan(input, now);
        if let Some(first) = found.first() {
            task.due_date = Some(first.value);
            working = working.replacen(&first.text, "", 1);

            if lowered.contains(&self.keywords.reminder_marker.to_lowercase()) {
                task.reminder_date = match found.get(1) {
                    Some(second) => Some(second.value),
                    None => Some(first.value - Duration::minutes(self.keywords.reminder_lead_minutes)),
                };
            }
        }

        // Priority, urgency and importance share one keyword pass
        if contains_any(&lowered, &self.keywords.high_priority) {
            task.set_level(Level::High);
        } else if contains_any(&lowered, &self.keywords.low_priority) {
            task.set_level(Level::Low);
        }

        if let Some(caps) = DURATION_PATTERN.captures(&working) {
            let amount: Option<u32> = caps[1].parse().ok();
            let unit = caps[2].to_lowercase();
            task.estimated_duration = amount.map(|value| {
                if unit.starts_with('h') {
                    value.saturating_mul(60)
                } else {
                    value
                }
            });
            let matched = caps[0].to_string();
            working = working.replacen(&matched, "", 1);
        }

        if contains_any(&lowered, &self.keywords.recurrence_triggers) {
            task.is_recurring = true;
            // A trigger without a concrete rule stays recurring with no pattern.
            task.recurring_pattern = self
                .keywords
                .recurrence_rules
                .iter()
                .find(|rule| contains_any(&lowered, &rule.phrases))
                .map(|rule| RecurringPattern {
                    kind: rule.kind,
                    interval: rule.interval,
                });
        }

        task.category = self
            .keywords
            .categories
            .iter()
            .find(|rule| contains_any(&lowered, &rule.keywords))
            .map(|rule| rule.category);

        task.title = self.clean_title(&working);

        tracing::trace!(
            title = %task.title,
            tags = task.tags.len(),
            due = ?task.due_date,
            "parsed task text"
        );

        task
    }

    /// Strips priority and recurrence keywords and normalises whitespace.
    ///
    /// Removal repeats until nothing changes, so feeding the output back in
    /// returns it unchanged.
    pub fn clean_title(&self, text: &str) -> String {
        // Whitespace is collapsed every pass so multi-word keywords split by
        // runs of spaces are seen on the next one.
        let mut cleaned = collapse(text);
        loop {
            let mut next = cleaned.clone();
            for stripper in self.priority_strippers.iter().chain(&self.recurrence_strippers) {
                next = stripper.replace_all(&next, "").to_string();
            }
            let next = collapse(&next);
            if next == cleaned {
                break;
            }
            cleaned = next;
        }

        if cleaned.is_empty() {
            self.keywords.fallback_title.clone()
        } else {
            cleaned
        }
    }
}

fn collapse(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").to_string()
}

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// date -> item id -> completed. Habit ids and daily task ids share one namespace per day.
pub type DayLogs = BTreeMap<String, bool>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

impl Habit {
    /// Builds a habit whose id is derived from its label, the way the tracker UI does it.
    pub fn from_label(label: &str, description: &str) -> Self {
        Self {
            id: slugify(label),
            label: label.trim().to_string(),
            description: description.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTask {
    pub id: String,
    pub label: String,
    pub date: String,
}

/// The whole persisted state for one user. Every persistence operation reads or
/// writes this value in full.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    pub habits: Vec<Habit>,
    #[serde(rename = "dailyTasks")]
    pub daily_tasks: BTreeMap<String, Vec<DailyTask>>,
    pub logs: BTreeMap<String, DayLogs>,
    pub notes: BTreeMap<String, String>,
    pub pomodoro: BTreeMap<String, i64>,
}

impl Document {
    /// The empty document written on first run and restored by a reset.
    pub fn initial() -> Self {
        Self::default()
    }

    pub fn tasks_for(&self, date: &str) -> &[DailyTask] {
        self.daily_tasks
            .get(date)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_done(&self, date: &str, id: &str) -> bool {
        self.logs
            .get(date)
            .and_then(|day| day.get(id))
            .copied()
            .unwrap_or(false)
    }

    pub fn note_for(&self, date: &str) -> &str {
        self.notes.get(date).map(String::as_str).unwrap_or("")
    }

    pub fn minutes_for(&self, date: &str) -> i64 {
        self.pomodoro.get(date).copied().unwrap_or(0)
    }

    pub fn habit(&self, id: &str) -> Option<&Habit> {
        self.habits.iter().find(|h| h.id == id)
    }
}

pub fn today_key() -> String {
    date_key(Local::now().date_naive())
}

pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date_key(value: &str) -> Option<NaiveDate> {
    if value.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

pub fn is_date_key(value: &str) -> bool {
    parse_date_key(value).is_some()
}

pub fn slugify(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_document_serializes_with_camel_case_keys() {
        let json = serde_json::to_string(&Document::initial()).unwrap();
        assert_eq!(
            json,
            r#"{"habits":[],"dailyTasks":{},"logs":{},"notes":{},"pomodoro":{}}"#
        );
    }

    #[test]
    fn missing_sections_fall_back_to_empty() {
        let doc: Document = serde_json::from_str(r#"{"habits":[]}"#).unwrap();
        assert_eq!(doc, Document::initial());
        assert!(doc.tasks_for("2025-01-01").is_empty());
        assert!(!doc.is_done("2025-01-01", "run"));
        assert_eq!(doc.note_for("2025-01-01"), "");
        assert_eq!(doc.minutes_for("2025-01-01"), 0);
    }

    #[test]
    fn habit_without_description_parses() {
        let doc: Document =
            serde_json::from_str(r#"{"habits":[{"id":"run","label":"Run"}]}"#).unwrap();
        assert_eq!(doc.habit("run").map(|h| h.description.as_str()), Some(""));
    }

    #[test]
    fn slugify_joins_whitespace_runs() {
        assert_eq!(slugify("Read  10 Pages"), "read-10-pages");
        assert_eq!(slugify("  Meditate "), "meditate");
        let habit = Habit::from_label("Cold Shower", "");
        assert_eq!(habit.id, "cold-shower");
        assert_eq!(habit.label, "Cold Shower");
    }

    #[test]
    fn date_keys_are_strict() {
        assert!(is_date_key("2025-03-01"));
        assert!(!is_date_key("2025-3-1"));
        assert!(!is_date_key("2025-02-30"));
        assert!(!is_date_key("today"));
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(date_key(date), "2025-03-01");
        assert_eq!(parse_date_key("2025-03-01"), Some(date));
    }
}

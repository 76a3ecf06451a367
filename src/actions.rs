//! Pure document transforms. Every function takes the current document by
//! reference and returns a new one; the input is never modified.

use crate::models::{DailyTask, Document, Habit, today_key};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("Invalid JSON data: {0}")]
    InvalidJson(String),
    #[error("Invalid data format: {0}")]
    InvalidShape(String),
}

pub fn add_habit(doc: &Document, habit: Habit) -> Document {
    let mut next = doc.clone();
    next.habits.push(habit);
    next
}

pub fn update_habit(doc: &Document, habit: Habit) -> Document {
    let mut next = doc.clone();
    if let Some(slot) = next.habits.iter_mut().find(|h| h.id == habit.id) {
        *slot = habit;
    }
    next
}

/// Removes the habit only. Historical completion flags stay in `logs`.
pub fn delete_habit(doc: &Document, habit_id: &str) -> Document {
    let mut next = doc.clone();
    next.habits.retain(|h| h.id != habit_id);
    next
}

/// Replaces the habit list wholesale. The caller supplies the permutation.
pub fn reorder_habits(doc: &Document, habits: Vec<Habit>) -> Document {
    let mut next = doc.clone();
    next.habits = habits;
    next
}

pub fn toggle_habit(doc: &Document, date: &str, habit_id: &str) -> Document {
    flip_log(doc, date, habit_id)
}

pub fn save_note(doc: &Document, date: &str, note: &str) -> Document {
    let mut next = doc.clone();
    next.notes.insert(date.to_string(), note.to_string());
    next
}

/// Adds focused minutes to today's bucket (local calendar day).
pub fn update_pomodoro_time(doc: &Document, minutes: i64) -> Document {
    add_pomodoro_minutes(doc, &today_key(), minutes)
}

pub fn add_pomodoro_minutes(doc: &Document, date: &str, minutes: i64) -> Document {
    let mut next = doc.clone();
    let total = next.pomodoro.entry(date.to_string()).or_insert(0);
    *total = total.saturating_add(minutes);
    next
}

pub fn add_daily_task(doc: &Document, date: &str, label: &str) -> Document {
    let mut next = doc.clone();
    let task = DailyTask {
        id: new_task_id(),
        label: label.to_string(),
        date: date.to_string(),
    };
    next.daily_tasks
        .entry(date.to_string())
        .or_default()
        .push(task);
    next
}

pub fn delete_daily_task(doc: &Document, date: &str, task_id: &str) -> Document {
    let mut next = doc.clone();

    if let Some(tasks) = next.daily_tasks.get_mut(date) {
        tasks.retain(|t| t.id != task_id);
        if tasks.is_empty() {
            next.daily_tasks.remove(date);
        }
    }

    if let Some(day) = next.logs.get_mut(date) {
        day.remove(task_id);
    }

    next
}

pub fn toggle_daily_task(doc: &Document, date: &str, task_id: &str) -> Document {
    flip_log(doc, date, task_id)
}

/// Parses an exported document. `habits` must be an array and `logs` an
/// object; anything else is rejected before a document is produced.
pub fn import_data(text: &str) -> Result<Document, ImportError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ImportError::InvalidJson(e.to_string()))?;

    let Some(root) = value.as_object() else {
        return Err(ImportError::InvalidShape(
            "top level must be an object".to_string(),
        ));
    };
    if !root.get("habits").is_some_and(Value::is_array) {
        return Err(ImportError::InvalidShape(
            "`habits` must be an array".to_string(),
        ));
    }
    if !root.get("logs").is_some_and(Value::is_object) {
        return Err(ImportError::InvalidShape(
            "`logs` must be an object".to_string(),
        ));
    }

    serde_json::from_value(value).map_err(|e| ImportError::InvalidShape(e.to_string()))
}

pub fn export_data(doc: &Document) -> String {
    // Serializing plain maps and strings cannot fail.
    serde_json::to_string_pretty(doc).unwrap_or_default()
}

pub fn reset_data() -> Document {
    Document::initial()
}

fn flip_log(doc: &Document, date: &str, id: &str) -> Document {
    let mut next = doc.clone();
    let day = next.logs.entry(date.to_string()).or_default();
    let current = day.get(id).copied().unwrap_or(false);
    day.insert(id.to_string(), !current);
    next
}

fn new_task_id() -> String {
    format!("task-{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn habit(id: &str, label: &str) -> Habit {
        Habit {
            id: id.to_string(),
            label: label.to_string(),
            description: String::new(),
        }
    }

    fn sample() -> Document {
        let doc = add_habit(&Document::initial(), habit("run", "Run"));
        let doc = add_habit(&doc, habit("read", "Read"));
        let doc = toggle_habit(&doc, "2025-01-01", "run");
        let doc = add_daily_task(&doc, "2025-01-01", "Pay bills");
        let doc = save_note(&doc, "2025-01-01", "good day");
        add_pomodoro_minutes(&doc, "2025-01-01", 25)
    }

    #[test]
    fn transforms_leave_input_untouched() {
        let doc = sample();
        let before = doc.clone();
        let task_id = doc.tasks_for("2025-01-01")[0].id.clone();

        let results = vec![
            add_habit(&doc, habit("walk", "Walk")),
            update_habit(&doc, habit("run", "Run 5k")),
            delete_habit(&doc, "run"),
            reorder_habits(&doc, vec![habit("read", "Read"), habit("run", "Run")]),
            toggle_habit(&doc, "2025-01-01", "read"),
            save_note(&doc, "2025-01-01", "changed"),
            update_pomodoro_time(&doc, 5),
            add_daily_task(&doc, "2025-01-02", "Call mom"),
            delete_daily_task(&doc, "2025-01-01", &task_id),
            toggle_daily_task(&doc, "2025-01-01", &task_id),
        ];

        assert_eq!(doc, before);
        for result in results {
            assert_ne!(result, before);
        }
    }

    #[test]
    fn toggle_twice_restores_flag() {
        let doc = add_habit(&Document::initial(), habit("run", "Run"));
        let once = toggle_habit(&doc, "2025-01-01", "run");
        assert_eq!(once.logs["2025-01-01"]["run"], true);

        let twice = toggle_habit(&once, "2025-01-01", "run");
        assert_eq!(twice.logs["2025-01-01"]["run"], false);
        assert!(!twice.is_done("2025-01-01", "run"));
        assert_eq!(twice.is_done("2025-01-01", "run"), doc.is_done("2025-01-01", "run"));
    }

    #[test]
    fn update_habit_with_unknown_id_is_noop() {
        let doc = sample();
        assert_eq!(update_habit(&doc, habit("ghost", "Ghost")), doc);
    }

    #[test]
    fn update_habit_replaces_in_place() {
        let doc = sample();
        let next = update_habit(&doc, habit("run", "Run 5k"));
        assert_eq!(next.habits[0].label, "Run 5k");
        assert_eq!(next.habits.len(), 2);
    }

    #[test]
    fn delete_habit_keeps_historical_logs() {
        let doc = sample();
        let next = delete_habit(&doc, "run");
        assert!(next.habit("run").is_none());
        assert!(next.is_done("2025-01-01", "run"));
    }

    #[test]
    fn reorder_replaces_sequence_exactly() {
        let doc = sample();
        let reversed = vec![doc.habits[1].clone(), doc.habits[0].clone()];
        let next = reorder_habits(&doc, reversed.clone());
        assert_eq!(next.habits, reversed);
        let ids: Vec<_> = next.habits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["read", "run"]);
    }

    #[test]
    fn save_note_overwrites() {
        let doc = save_note(&sample(), "2025-01-01", "second");
        assert_eq!(doc.note_for("2025-01-01"), "second");
    }

    #[test]
    fn pomodoro_minutes_accumulate_for_today() {
        let doc = update_pomodoro_time(&Document::initial(), 25);
        let doc = update_pomodoro_time(&doc, 5);
        assert_eq!(doc.minutes_for(&today_key()), 30);
    }

    #[test]
    fn pomodoro_minutes_saturate_on_imported_extremes() {
        let doc = import_data(r#"{"habits":[],"logs":{},"pomodoro":{"2025-01-01":9223372036854775807}}"#)
            .unwrap();
        let doc = add_pomodoro_minutes(&doc, "2025-01-01", 1);
        assert_eq!(doc.minutes_for("2025-01-01"), i64::MAX);
        let doc = add_pomodoro_minutes(&doc, "2025-01-02", i64::MIN);
        let doc = add_pomodoro_minutes(&doc, "2025-01-02", -1);
        assert_eq!(doc.minutes_for("2025-01-02"), i64::MIN);
    }

    #[test]
    fn pomodoro_accepts_negative_minutes() {
        let doc = add_pomodoro_minutes(&Document::initial(), "2025-01-01", 10);
        let doc = add_pomodoro_minutes(&doc, "2025-01-01", -15);
        assert_eq!(doc.minutes_for("2025-01-01"), -5);
    }

    #[test]
    fn daily_tasks_get_distinct_ids() {
        let doc = add_daily_task(&Document::initial(), "2025-03-01", "Pay bills");
        let doc = add_daily_task(&doc, "2025-03-01", "Pay bills");
        let tasks = doc.tasks_for("2025-03-01");
        assert_eq!(tasks.len(), 2);
        assert_ne!(tasks[0].id, tasks[1].id);
        assert!(tasks.iter().all(|t| t.date == "2025-03-01"));
    }

    #[test]
    fn deleting_last_task_removes_date_bucket() {
        let doc = add_daily_task(&Document::initial(), "2025-03-01", "Pay bills");
        let id = doc.tasks_for("2025-03-01")[0].id.clone();
        let doc = toggle_daily_task(&doc, "2025-03-01", &id);
        assert!(doc.is_done("2025-03-01", &id));

        let doc = delete_daily_task(&doc, "2025-03-01", &id);
        assert!(!doc.daily_tasks.contains_key("2025-03-01"));
        assert!(!doc.logs["2025-03-01"].contains_key(&id));
    }

    #[test]
    fn toggle_after_delete_recreates_log_without_task() {
        let doc = add_daily_task(&Document::initial(), "2025-03-01", "Pay bills");
        let id = doc.tasks_for("2025-03-01")[0].id.clone();
        let doc = delete_daily_task(&doc, "2025-03-01", &id);
        let doc = toggle_daily_task(&doc, "2025-03-01", &id);
        assert!(doc.tasks_for("2025-03-01").is_empty());
        assert!(doc.is_done("2025-03-01", &id));
    }

    #[test]
    fn delete_unknown_task_is_harmless() {
        let doc = sample();
        assert_eq!(delete_daily_task(&doc, "2030-01-01", "task-x"), doc);
    }

    #[test]
    fn import_rejects_non_array_habits() {
        let err = import_data(r#"{"habits":{},"logs":{}}"#).unwrap_err();
        assert!(matches!(err, ImportError::InvalidShape(_)));
    }

    #[test]
    fn import_rejects_missing_logs_and_bad_json() {
        assert!(matches!(
            import_data(r#"{"habits":[]}"#),
            Err(ImportError::InvalidShape(_))
        ));
        assert!(matches!(
            import_data("not json"),
            Err(ImportError::InvalidJson(_))
        ));
    }

    #[test]
    fn import_accepts_exported_document() {
        let doc = sample();
        let imported = import_data(&export_data(&doc)).unwrap();
        assert_eq!(imported, doc);
    }

    #[test]
    fn import_fills_missing_optional_sections() {
        let doc = import_data(r#"{"habits":[{"id":"run","label":"Run","description":""}],"logs":{"2025-01-01":{"run":true}}}"#).unwrap();
        assert_eq!(doc.habits.len(), 1);
        assert!(doc.is_done("2025-01-01", "run"));
        assert!(doc.notes.is_empty());
        assert!(doc.pomodoro.is_empty());
    }

    #[test]
    fn reset_returns_initial_document() {
        assert_eq!(reset_data(), Document::initial());
    }
}

use crate::models::{Document, date_key, is_date_key, parse_date_key};
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

/// Longest heatmap window the CLI will render.
pub const MAX_HEATMAP_DAYS: u32 = 3660;

/// Achievement tiers over total active days.
const MILESTONES: [(u32, &str); 12] = [
    (1, "First Step"),
    (3, "Hat Trick"),
    (7, "Week Warrior"),
    (14, "Fortnight Fighter"),
    (21, "Habit Formed"),
    (30, "Monthly Master"),
    (60, "Two Month Titan"),
    (90, "Quarterly Champion"),
    (100, "Century Club"),
    (150, "Dedicated Soul"),
    (200, "Unstoppable Force"),
    (365, "Year of Focus"),
];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HeatmapDay {
    pub date: String,
    /// Share of current habits completed that day, 0.0 to 1.0.
    pub intensity: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HabitStreak {
    pub id: String,
    pub label: String,
    pub streak: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Summary {
    pub streak: u32,
    pub total_active_days: usize,
    pub focus_minutes: i64,
    pub focus_time: String,
    pub habits: Vec<HabitStreak>,
    pub milestones: Vec<Milestone>,
    pub months: Vec<MonthSummary>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Milestone {
    pub days: u32,
    pub label: &'static str,
    pub unlocked: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthSummary {
    /// `YYYY-MM`
    pub month: String,
    /// e.g. `January 2025`
    pub label: String,
    pub active_days: usize,
}

pub fn summarize(doc: &Document, today: NaiveDate) -> Summary {
    let focus_minutes = total_focus_minutes(doc);
    let active_days = total_active_days(doc);
    Summary {
        streak: active_streak(doc, today),
        total_active_days: active_days,
        focus_minutes,
        focus_time: format_focus_time(focus_minutes),
        habits: doc
            .habits
            .iter()
            .map(|habit| HabitStreak {
                id: habit.id.clone(),
                label: habit.label.clone(),
                streak: habit_streak(doc, &habit.id, today),
            })
            .collect(),
        milestones: milestones(active_days),
        months: monthly_summary(doc),
    }
}

/// A day is active when every current habit is checked off.
pub fn is_active_day(doc: &Document, date: &str) -> bool {
    !doc.habits.is_empty() && doc.habits.iter().all(|h| doc.is_done(date, &h.id))
}

pub fn total_active_days(doc: &Document) -> usize {
    doc.logs
        .keys()
        .filter(|date| is_date_key(date) && is_active_day(doc, date))
        .count()
}

/// Consecutive active days ending today, or ending yesterday when today is
/// still open.
pub fn active_streak(doc: &Document, today: NaiveDate) -> u32 {
    streak_by(today, |date| is_active_day(doc, date))
}

pub fn habit_streak(doc: &Document, habit_id: &str, today: NaiveDate) -> u32 {
    streak_by(today, |date| doc.is_done(date, habit_id))
}

pub fn total_focus_minutes(doc: &Document) -> i64 {
    doc.pomodoro
        .values()
        .fold(0i64, |total, minutes| total.saturating_add(*minutes))
}

pub fn milestones(active_days: usize) -> Vec<Milestone> {
    MILESTONES
        .iter()
        .map(|&(days, label)| Milestone {
            days,
            label,
            unlocked: active_days >= days as usize,
        })
        .collect()
}

/// Active days per calendar month, oldest month first. Months without an
/// active day are left out.
pub fn monthly_summary(doc: &Document) -> Vec<MonthSummary> {
    let mut months: BTreeMap<String, (String, usize)> = BTreeMap::new();
    for date in doc.logs.keys() {
        let Some(day) = parse_date_key(date) else {
            continue;
        };
        if !is_active_day(doc, date) {
            continue;
        }
        let entry = months
            .entry(day.format("%Y-%m").to_string())
            .or_insert_with(|| (day.format("%B %Y").to_string(), 0));
        entry.1 += 1;
    }
    months
        .into_iter()
        .map(|(month, (label, active_days))| MonthSummary {
            month,
            label,
            active_days,
        })
        .collect()
}

pub fn format_focus_time(minutes: i64) -> String {
    let minutes = minutes.max(0);
    format!("{}h {}m", minutes / 60, minutes % 60)
}

/// The last `days` days ending today, oldest first. The window is capped at
/// `MAX_HEATMAP_DAYS` and stops at the earliest representable date.
pub fn heatmap(doc: &Document, today: NaiveDate, days: u32) -> Vec<HeatmapDay> {
    let total = doc.habits.len();
    (0..days.min(MAX_HEATMAP_DAYS))
        .rev()
        .filter_map(|offset| today.checked_sub_days(Days::new(u64::from(offset))))
        .map(|day| {
            let date = date_key(day);
            let done = doc
                .habits
                .iter()
                .filter(|h| doc.is_done(&date, &h.id))
                .count();
            let intensity = if total > 0 {
                done as f64 / total as f64
            } else {
                0.0
            };
            HeatmapDay { date, intensity }
        })
        .collect()
}

fn streak_by<F>(today: NaiveDate, is_done: F) -> u32
where
    F: Fn(&str) -> bool,
{
    let mut streak = 0;
    if is_done(&date_key(today)) {
        streak += 1;
    }
    let mut day = today.pred_opt();
    while let Some(date) = day
        && is_done(&date_key(date))
    {
        streak += 1;
        day = date.pred_opt();
    }
    streak
}

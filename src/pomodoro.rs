use crate::config::PomodoroConfig;
use chrono::{DateTime, Duration, Local};

/// Upper bound for a single phase, whatever the config says.
const MAX_PHASE_MINUTES: u64 = 24 * 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Work,
    ShortBreak,
    LongBreak,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Work => "Focus",
            Phase::ShortBreak => "Short break",
            Phase::LongBreak => "Long break",
        }
    }
}

/// A running work/break cycle. Work phases that run to completion are
/// credited to today's focus minutes by `runtime::tick`.
#[derive(Clone, Debug, PartialEq)]
pub struct FocusSession {
    pub phase: Phase,
    pub minutes: u64,
    pub ends_at: DateTime<Local>,
    /// Work phases finished so far.
    pub completed: u64,
    pub planned: u64,
}

impl FocusSession {
    pub fn start(config: &PomodoroConfig, planned: u64, now: DateTime<Local>) -> Self {
        Self::phase(config, Phase::Work, 0, planned.max(1), now)
    }

    pub fn is_due(&self, now: DateTime<Local>) -> bool {
        now >= self.ends_at
    }

    /// The phase after this one, or `None` once the last work phase ended.
    /// No break follows the final work phase.
    pub fn advance(&self, config: &PomodoroConfig, now: DateTime<Local>) -> Option<Self> {
        match self.phase {
            Phase::Work => {
                let completed = self.completed + 1;
                if completed >= self.planned {
                    return None;
                }
                let next = break_after(config, completed);
                Some(Self::phase(config, next, completed, self.planned, now))
            }
            Phase::ShortBreak | Phase::LongBreak => Some(Self::phase(
                config,
                Phase::Work,
                self.completed,
                self.planned,
                now,
            )),
        }
    }

    fn phase(
        config: &PomodoroConfig,
        phase: Phase,
        completed: u64,
        planned: u64,
        now: DateTime<Local>,
    ) -> Self {
        let minutes = phase_minutes(config, phase);
        Self {
            phase,
            minutes,
            ends_at: now + Duration::minutes(minutes as i64),
            completed,
            planned,
        }
    }
}

/// Every `long_break_every`-th finished work phase earns a long break.
pub fn break_after(config: &PomodoroConfig, completed: u64) -> Phase {
    if config.long_break_every > 0 && completed % config.long_break_every == 0 {
        Phase::LongBreak
    } else {
        Phase::ShortBreak
    }
}

fn phase_minutes(config: &PomodoroConfig, phase: Phase) -> u64 {
    let minutes = match phase {
        Phase::Work => config.work_minutes,
        Phase::ShortBreak => config.short_break_minutes,
        Phase::LongBreak => config.long_break_minutes,
    };
    minutes.clamp(1, MAX_PHASE_MINUTES)
}

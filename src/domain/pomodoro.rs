use crate::domain::models::{PomodoroPhase, Task, UserSettings};
use serde::{Deserialize, Serialize};

/// Phase lengths and cadence after merging per-task overrides over the
/// user defaults. All timer math goes through this struct so callers
/// never look at raw settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectivePomodoro {
    pub work_minutes: i64,
    pub short_break_minutes: i64,
    pub long_break_minutes: i64,
    pub long_break_every: i64,
}

impl EffectivePomodoro {
    pub fn resolve(settings: &UserSettings, task: Option<&Task>) -> EffectivePomodoro {
        let overrides = task.map(|task| task.pomodoro).unwrap_or_default();
        EffectivePomodoro {
            work_minutes: overrides.work_minutes.unwrap_or(settings.pomodoro_work_minutes),
            short_break_minutes: overrides
                .short_break_minutes
                .unwrap_or(settings.pomodoro_short_break_minutes),
            long_break_minutes: overrides
                .long_break_minutes
                .unwrap_or(settings.pomodoro_long_break_minutes),
            long_break_every: overrides
                .long_break_every
                .unwrap_or(settings.pomodoro_long_break_every),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub next_phase: PomodoroPhase,
    pub next_cycle_count: i64,
}

/// Length of a phase in seconds. A missing/unknown phase counts as work.
/// Negative configured minutes clamp to zero.
pub fn phase_duration_seconds(phase: Option<PomodoroPhase>, effective: &EffectivePomodoro) -> i64 {
    let minutes = match phase.unwrap_or(PomodoroPhase::Work) {
        PomodoroPhase::Work => effective.work_minutes,
        PomodoroPhase::ShortBreak => effective.short_break_minutes,
        PomodoroPhase::LongBreak => effective.long_break_minutes,
    };
    minutes.max(0) * 60
}

/// Advance the state machine. Any break returns to work with the cycle
/// count untouched; completing a work phase increments the cycle and
/// earns a long break every `long_break_every`-th cycle (defaulted to 4
/// when the configured value is not positive).
pub fn next_phase(
    current: Option<PomodoroPhase>,
    cycle_count: i64,
    long_break_every: i64,
) -> PhaseTransition {
    if current != Some(PomodoroPhase::Work) {
        return PhaseTransition {
            next_phase: PomodoroPhase::Work,
            next_cycle_count: cycle_count,
        };
    }

    let every = if long_break_every > 0 { long_break_every } else { 4 };
    let next_cycle_count = cycle_count + 1;
    let next_phase = if next_cycle_count % every == 0 {
        PomodoroPhase::LongBreak
    } else {
        PomodoroPhase::ShortBreak
    };
    PhaseTransition {
        next_phase,
        next_cycle_count,
    }
}

/// Whole seconds elapsed in the current phase. While paused, the pause
/// instant stands in for "now" so the reading freezes. Non-finite inputs
/// yield zero rather than garbage.
pub fn compute_elapsed_seconds(
    phase_started_at_ms: f64,
    now_ms: f64,
    paused_at_ms: Option<f64>,
) -> i64 {
    let effective_now = match paused_at_ms {
        Some(paused) if paused.is_finite() => paused,
        Some(_) => return 0,
        None => now_ms,
    };
    if !phase_started_at_ms.is_finite() || !effective_now.is_finite() {
        return 0;
    }
    let elapsed = ((effective_now - phase_started_at_ms) / 1000.0).floor();
    if !elapsed.is_finite() || elapsed <= 0.0 {
        return 0;
    }
    elapsed as i64
}

/// On resume, shift the stored phase start forward by the paused span so
/// elapsed-time math stays continuous. With no pause instant recorded
/// there is nothing to adjust.
pub fn adjust_phase_start_for_resume(
    phase_started_at_ms: f64,
    paused_at_ms: Option<f64>,
    now_ms: f64,
) -> f64 {
    match paused_at_ms {
        Some(paused) if paused.is_finite() => phase_started_at_ms + (now_ms - paused),
        _ => phase_started_at_ms,
    }
}

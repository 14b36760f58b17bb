//! Pure, side-effect-free reward formulas (spec §4.3). No I/O; every
//! function here is deterministic given its inputs. Time arithmetic is
//! integer seconds throughout; only these formulas use floating
//! multipliers, and every result is floored to an integer before return
//! (spec §9).

use crate::model::{Priority, Task, TaskStatus};

/// Coins per second, by priority. `Low` earns and penalizes nothing.
fn rate_per_second(priority: Priority) -> f64 {
    match priority {
        Priority::High => 1.0 / 300.0,
        Priority::Normal => 1.0 / 600.0,
        Priority::Low => 0.0,
    }
}

/// Base cost in coins for a task, given its allocation and priority.
/// Floored; `High`/`Normal` are floored up to at least 1, `Low` is
/// always 0.
pub fn base_cost(task: &Task) -> i64 {
    let rate = rate_per_second(task.priority);
    if rate == 0.0 {
        return 0;
    }
    let raw = (task.allocated_seconds as f64) * rate;
    (raw.floor() as i64).max(1)
}

/// Bonus coins for a completed task.
pub fn bonus(task: &Task) -> i64 {
    if task.priority == Priority::Low {
        return 0;
    }

    let base = base_cost(task);
    let alloc = task.allocated_seconds;
    if alloc == 0 {
        return base;
    }

    let ratio = task.elapsed_seconds as f64 / alloc as f64;
    let multiplier = if ratio <= 1.0 {
        2.0 - ratio
    } else if ratio <= 2.0 {
        2.0 - (1.0 / ratio)
    } else {
        return 0;
    };

    (((base as f64) * multiplier).floor() as i64).max(1)
}

/// Penalty coins for a single task, per its terminal status (or
/// in-progress overrun state — penalties are also used to cost an
/// unclosed task during finalization, see `finalizer`).
pub fn penalty(task: &Task) -> i64 {
    if task.priority == Priority::Low {
        return 0;
    }

    let base = base_cost(task);

    match task.status {
        TaskStatus::Skipped => base,
        TaskStatus::Completed => {
            let alloc = task.allocated_seconds;
            let ratio = if alloc > 0 {
                task.elapsed_seconds as f64 / alloc as f64
            } else {
                0.0
            };
            if ratio > 2.0 { base } else { 0 }
        }
        TaskStatus::Pending | TaskStatus::Active => 0,
    }
}

/// Half the base cost, charged when a task is postponed to the next day.
pub fn postpone_penalty(task: &Task) -> i64 {
    if task.priority == Priority::Low {
        return 0;
    }
    (((base_cost(task) as f64) * 0.5).floor() as i64).max(1)
}

/// `1 + 0.1 * min(streak, 10)`, capped at 2.0 for `streak >= 10`.
pub fn streak_multiplier(streak: u32) -> f64 {
    1.0 + 0.1 * (streak.min(10) as f64)
}

/// Non-mutating preview of a day's coin outcome, given the plan's current
/// tasks and streak.
pub struct DayPreview {
    pub earned: i64,
    pub potential: i64,
    pub penalties: i64,
    pub total_earned: i64,
    pub total_potential: i64,
    pub multiplier: f64,
    pub streak: u32,
}

pub fn day_preview(plan: &crate::model::DayPlan, streak: u32) -> DayPreview {
    let mut earned = 0i64;
    let mut potential = 0i64;
    let mut penalties = 0i64;

    for task in &plan.tasks {
        match task.status {
            TaskStatus::Completed => {
                earned += bonus(task);
                penalties += penalty(task);
            }
            TaskStatus::Skipped => {
                penalties += penalty(task);
            }
            TaskStatus::Pending | TaskStatus::Active => {
                potential += base_cost(task);
            }
        }
    }

    let multiplier = streak_multiplier(streak);
    let total_earned = (((earned - penalties) as f64) * multiplier).round() as i64;
    let total_potential = (((earned + potential - penalties) as f64) * multiplier).round() as i64;

    DayPreview {
        earned,
        potential,
        penalties,
        total_earned,
        total_potential,
        multiplier,
        streak,
    }
}

//! Adapter / Query facade (spec §2 Component G, §6.3), grounded on
//! `market_view/mod.rs`'s shared-view pattern — adapted here from a
//! push-updated `RwLock` cache to a pull-based projection computed
//! directly from the live `TimerEngine` mirror, since this engine has no
//! external feed pushing updates.

use serde::Serialize;
use uuid::Uuid;

use crate::model::{Priority, TaskStatus};
use crate::timer::TimerEngine;

/// Read-only per-task projection (spec §6.3).
#[derive(Clone, Debug, Serialize)]
pub struct TaskSnapshot {
    pub id: Uuid,
    pub name: String,
    pub allocated_seconds: u64,
    pub elapsed_seconds: u64,
    pub overrun_seconds: u64,
    pub status: TaskStatus,
    pub scheduled_time: Option<String>,
    pub completed_at: Option<chrono::DateTime<chrono::Local>>,
    pub priority: Priority,
}

/// Read-only projection of the whole engine (spec §6.3).
#[derive(Clone, Debug, Serialize)]
pub struct EngineSnapshot {
    pub plan_date: chrono::NaiveDate,
    pub tasks: Vec<TaskSnapshot>,
    pub active_task_id: Option<Uuid>,
    pub procrastination_used: u64,
    pub procrastination_remaining: u64,
    pub procrastination_overrun: u64,
}

/// Produces an immutable snapshot of `engine`'s current state for
/// UI/API consumers. Never mutates the engine.
pub fn snapshot(engine: &TimerEngine) -> EngineSnapshot {
    let (ordered_tasks, active_task_id) = engine.tasks_and_active_id_snapshot();

    let tasks = ordered_tasks
        .into_iter()
        .map(|t| TaskSnapshot {
            id: t.id,
            name: t.name,
            allocated_seconds: t.allocated_seconds,
            elapsed_seconds: t.elapsed_seconds,
            overrun_seconds: t.overrun_seconds,
            status: t.status,
            scheduled_time: t.scheduled_time,
            completed_at: t.completed_at,
            priority: t.priority,
        })
        .collect();

    EngineSnapshot {
        plan_date: engine.plan_date(),
        tasks,
        active_task_id,
        procrastination_used: engine.procrastination_used(),
        procrastination_remaining: engine.procrastination_remaining(),
        procrastination_overrun: engine.procrastination_overrun(),
    }
}

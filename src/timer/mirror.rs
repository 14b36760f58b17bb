//! Ordered in-memory task mirror for one Day Plan, grounded on
//! `session/cache.rs`'s `Mutex<HashMap<Uuid, _>>` shape — adapted here
//! from a bounded RR eviction cache to a plan-scoped map with no
//! eviction (a day's task count is small and unbounded by design,
//! spec §9 "Engine's in-memory mirror as a map keyed by id").

use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::model::{DayPlan, Task};

/// Authoritative in-memory state for exactly one Day Plan: its tasks
/// keyed by id (for O(1) command dispatch) plus the scalar fields the
/// tick loop mutates every second.
pub struct TaskMirror {
    inner: Mutex<MirrorState>,
}

struct MirrorState {
    date: chrono::NaiveDate,
    tasks: HashMap<Uuid, Task>,
    active_task_id: Option<Uuid>,
    procrastination_used: u64,
}

impl TaskMirror {
    pub fn load(plan: DayPlan) -> Self {
        let active_task_id = plan
            .tasks
            .iter()
            .find(|t| t.status == crate::model::TaskStatus::Active)
            .map(|t| t.id);

        let tasks = plan.tasks.into_iter().map(|t| (t.id, t)).collect();

        Self {
            inner: Mutex::new(MirrorState {
                date: plan.date,
                tasks,
                active_task_id,
                procrastination_used: plan.procrastination_used,
            }),
        }
    }

    pub fn date(&self) -> chrono::NaiveDate {
        self.inner.lock().date
    }

    pub fn active_task_id(&self) -> Option<Uuid> {
        self.inner.lock().active_task_id
    }

    pub fn procrastination_used(&self) -> u64 {
        self.inner.lock().procrastination_used
    }

    pub fn task(&self, id: &Uuid) -> Option<Task> {
        self.inner.lock().tasks.get(id).cloned()
    }

    /// All tasks, in render order (by `position`, ties broken by id so
    /// the order is stable even between ticks).
    pub fn ordered_tasks(&self) -> Vec<Task> {
        let state = self.inner.lock();
        let mut tasks: Vec<Task> = state.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| (t.position, t.id));
        tasks
    }

    /// `ordered_tasks` and `active_task_id` taken under one lock
    /// acquisition, so a caller never observes a task list from one
    /// tick paired with an `active_task_id` from another (spec §6.3).
    pub fn ordered_tasks_and_active_id(&self) -> (Vec<Task>, Option<Uuid>) {
        let state = self.inner.lock();
        let mut tasks: Vec<Task> = state.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| (t.position, t.id));
        (tasks, state.active_task_id)
    }

    pub fn insert(&self, task: Task) {
        self.inner.lock().tasks.insert(task.id, task);
    }

    pub fn remove(&self, id: &Uuid) -> Option<Task> {
        let mut state = self.inner.lock();
        if state.active_task_id == Some(*id) {
            state.active_task_id = None;
        }
        state.tasks.remove(id)
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut TickState) -> R) -> R {
        let mut state = self.inner.lock();
        let MirrorState {
            tasks,
            active_task_id,
            procrastination_used,
            ..
        } = &mut *state;
        f(&mut TickState {
            tasks,
            active_task_id,
            procrastination_used,
        })
    }
}

/// Borrowed view handed to the tick algorithm and command handlers —
/// keeps lock-acquisition in one place (`with_state`) while letting
/// callers mutate several fields under the same critical section.
pub struct TickState<'a> {
    pub tasks: &'a mut HashMap<Uuid, Task>,
    pub active_task_id: &'a mut Option<Uuid>,
    pub procrastination_used: &'a mut u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Priority;

    fn plan_with(tasks: Vec<Task>) -> DayPlan {
        let mut plan = DayPlan::new(chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        plan.tasks = tasks;
        plan
    }

    #[test]
    fn load_picks_up_active_task_from_plan() {
        let mut t = Task::new(Uuid::new_v4(), "a", 600, None, Priority::Normal, 0);
        t.status = crate::model::TaskStatus::Active;
        let id = t.id;
        let mirror = TaskMirror::load(plan_with(vec![t]));
        assert_eq!(mirror.active_task_id(), Some(id));
    }

    #[test]
    fn ordered_tasks_respects_position() {
        let a = Task::new(Uuid::new_v4(), "a", 600, None, Priority::Normal, 2);
        let b = Task::new(Uuid::new_v4(), "b", 600, None, Priority::Normal, 1);
        let mirror = TaskMirror::load(plan_with(vec![a.clone(), b.clone()]));
        let ordered = mirror.ordered_tasks();
        assert_eq!(ordered[0].id, b.id);
        assert_eq!(ordered[1].id, a.id);
    }

    #[test]
    fn remove_clears_active_task_id_if_matched() {
        let mut t = Task::new(Uuid::new_v4(), "a", 600, None, Priority::Normal, 0);
        t.status = crate::model::TaskStatus::Active;
        let id = t.id;
        let mirror = TaskMirror::load(plan_with(vec![t]));
        mirror.remove(&id);
        assert_eq!(mirror.active_task_id(), None);
        assert!(mirror.task(&id).is_none());
    }
}

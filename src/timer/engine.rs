//! The always-on chess-clock timer engine (spec §4.1), grounded on
//! `timer.py::TimerEngine` for the tick algorithm and on
//! `backend/src/main.rs` / `scheduler/scheduler.rs` for the
//! `tokio::spawn` worker shape.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::logger::{annotate_span, warn_if_slow};
use crate::metrics::Counters;
use crate::model::{OverrunBehavior, OverrunSource, Priority, Settings, Task, TaskStatus};
use crate::store::Store;
use crate::timer::mirror::TaskMirror;

/// Owns the authoritative accounting for exactly one Day Plan (today's),
/// per spec §4.1/§5. One engine instance per running day; callers create
/// a fresh one after midnight rollover (spec §9, Open Question #4).
pub struct TimerEngine {
    store: Arc<dyn Store>,
    mirror: TaskMirror,
    settings: RwLock<Settings>,
    counters: Counters,
    save_interval_ticks: u32,
    tick_count: AtomicU32,
    running: AtomicBool,
    worker: AsyncMutex<Option<JoinHandle<()>>>,
    stop_flag: Arc<AtomicBool>,
}

impl TimerEngine {
    pub fn new(
        store: Arc<dyn Store>,
        plan: crate::model::DayPlan,
        settings: Settings,
        counters: Counters,
        save_interval_ticks: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            mirror: TaskMirror::load(plan),
            settings: RwLock::new(settings),
            counters,
            save_interval_ticks: save_interval_ticks.max(1),
            tick_count: AtomicU32::new(0),
            running: AtomicBool::new(false),
            worker: AsyncMutex::new(None),
            stop_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn replace_settings(&self, settings: Settings) {
        *self.settings.write() = settings;
    }

    pub fn settings_snapshot(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Read-only snapshot of today's tasks in render order, for the
    /// notification scheduler and the query facade.
    pub fn tasks_snapshot(&self) -> Vec<Task> {
        self.mirror.ordered_tasks()
    }

    pub fn plan_date(&self) -> chrono::NaiveDate {
        self.mirror.date()
    }

    pub fn procrastination_used(&self) -> u64 {
        self.mirror.procrastination_used()
    }

    /// The engine's real active task id (spec §6.3) — set unconditionally
    /// by `activate_task` even when the target's status transition is
    /// guarded (spec §9, Open Question #1), so this can point at a
    /// terminal task. Callers must not infer activity from task status.
    pub fn active_task_id(&self) -> Option<Uuid> {
        self.mirror.active_task_id()
    }

    /// `tasks_snapshot` and `active_task_id` taken under one lock, for
    /// callers (the query facade) that need both to describe the same
    /// instant — see `ordered_tasks_and_active_id`'s doc comment.
    pub fn tasks_and_active_id_snapshot(&self) -> (Vec<Task>, Option<Uuid>) {
        self.mirror.ordered_tasks_and_active_id()
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Begins the tick loop. Idempotent while already running (spec
    /// §4.1's `start` contract).
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        self.stop_flag.store(false, Ordering::SeqCst);
        let engine = self.clone();
        let stop_flag = self.stop_flag.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if stop_flag.load(Ordering::SeqCst) {
                    break;
                }
                engine.tick().await;
            }
        });

        // `try_lock` is safe here: `start`/`stop` are never called
        // concurrently with each other by contract (spec §5), and no
        // other path touches `worker`.
        if let Ok(mut slot) = self.worker.try_lock() {
            *slot = Some(handle);
        }
    }

    /// Requests termination and flushes pending state before returning
    /// (spec §4.1's `stop` contract).
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.stop_flag.store(true, Ordering::SeqCst);

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        self.flush().await;
    }

    // ---------------------------------------------------------------
    // Commands (spec §4.1 operations table)
    // ---------------------------------------------------------------

    pub fn add_task(
        &self,
        id: Uuid,
        name: impl Into<String>,
        allocated_seconds: i64,
        scheduled_time: Option<String>,
        priority: Priority,
        position: i64,
    ) -> Result<(), EngineError> {
        if allocated_seconds <= 0 {
            return Err(EngineError::InvalidArgument(
                "allocated_seconds must be positive".into(),
            ));
        }

        let task = Task::new(
            id,
            name,
            allocated_seconds as u64,
            scheduled_time,
            priority,
            position,
        );
        self.mirror.insert(task);
        Ok(())
    }

    /// Removes from in-memory state; deactivates if it was active.
    /// Unknown ids are silently ignored (spec §4.1 failure semantics).
    pub fn remove_task(&self, id: Uuid) {
        self.mirror.remove(&id);
    }

    pub fn update_task_meta(
        &self,
        id: Uuid,
        name: impl Into<String>,
        allocated_seconds: i64,
        scheduled_time: Option<String>,
        priority: Priority,
    ) {
        self.mirror.with_state(|state| {
            if let Some(task) = state.tasks.get_mut(&id) {
                if allocated_seconds > 0 {
                    task.allocated_seconds = allocated_seconds as u64;
                }
                task.name = name.into();
                task.scheduled_time = scheduled_time;
                task.priority = priority;
            }
        });
    }

    /// Deactivates any currently active task (Active -> Pending iff
    /// still Active), then sets `active_task_id` to `id` — the target's
    /// own status flips Pending -> Active only if it is currently
    /// Pending. Completed/Skipped targets are left untouched but still
    /// become the (inert) active id, matching the original's
    /// unconditional assignment (spec §9, Open Question #1).
    #[instrument(skip(self), target = "timer")]
    pub fn activate_task(&self, id: Uuid) {
        annotate_span("", Some(&id));
        self.mirror.with_state(|state| {
            if let Some(prev) = *state.active_task_id {
                if prev != id {
                    if let Some(prev_task) = state.tasks.get_mut(&prev) {
                        if prev_task.status == TaskStatus::Active {
                            prev_task.status = TaskStatus::Pending;
                        }
                    }
                }
            }

            if let Some(task) = state.tasks.get_mut(&id) {
                if task.status == TaskStatus::Pending {
                    task.status = TaskStatus::Active;
                }
                *state.active_task_id = Some(id);
            }
        });
    }

    /// Clears `active_task_id`; the formerly active task reverts
    /// Active -> Pending.
    pub fn deactivate(&self) {
        self.mirror.with_state(|state| {
            if let Some(id) = state.active_task_id.take() {
                if let Some(task) = state.tasks.get_mut(&id) {
                    if task.status == TaskStatus::Active {
                        task.status = TaskStatus::Pending;
                    }
                }
            }
        });
    }

    pub async fn complete_task(&self, id: Uuid) {
        self.close_task(id, TaskStatus::Completed).await;
    }

    pub async fn skip_task(&self, id: Uuid) {
        self.close_task(id, TaskStatus::Skipped).await;
    }

    async fn close_task(&self, id: Uuid, status: TaskStatus) {
        let closed = self.mirror.with_state(|state| {
            let Some(task) = state.tasks.get_mut(&id) else {
                return false;
            };
            task.status = status;
            task.completed_at = Some(crate::time_utils::now());
            if *state.active_task_id == Some(id) {
                *state.active_task_id = None;
            }
            true
        });

        if closed {
            // Flush is released from the engine lock before the store
            // call (spec §5: "flush takes the store connection, not
            // the engine lock").
            if let Some(task) = self.mirror.task(&id) {
                let date = self.mirror.date();
                if let Err(e) = self.store.upsert_task(date, &task).await {
                    warn!(error = %e, task_id = %id, "flush after close_task failed; will retry on next interval");
                }
            }
        }
    }

    pub fn procrastination_remaining(&self) -> u64 {
        let now = crate::time_utils::now();
        let until_midnight = crate::time_utils::seconds_until_midnight(now) as u64;
        let allocated: u64 = self
            .mirror
            .ordered_tasks()
            .iter()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.allocated_seconds)
            .sum();
        until_midnight.saturating_sub(allocated)
    }

    pub fn procrastination_limit(&self) -> u64 {
        let settings = self.settings.read();
        if let Some(minutes) = settings.procrastination_override_minutes {
            return minutes as u64 * 60;
        }

        let effective: u64 = self
            .mirror
            .ordered_tasks()
            .iter()
            .map(|t| t.effective_time())
            .sum();
        (crate::time_utils::SECONDS_IN_DAY as u64).saturating_sub(effective)
    }

    pub fn procrastination_overrun(&self) -> u64 {
        self.mirror
            .procrastination_used()
            .saturating_sub(self.procrastination_limit())
    }

    // ---------------------------------------------------------------
    // Tick algorithm (spec §4.1)
    // ---------------------------------------------------------------

    async fn tick(&self) {
        let settings = self.settings.read().clone();

        self.mirror.with_state(|state| {
            match *state.active_task_id {
                None => {
                    *state.procrastination_used += 1;
                }
                Some(id) => {
                    let terminal = state
                        .tasks
                        .get(&id)
                        .map(|t| t.status.is_terminal())
                        .unwrap_or(true);

                    if terminal {
                        *state.procrastination_used += 1;
                        *state.active_task_id = None;
                        return;
                    }

                    let task = state.tasks.get_mut(&id).expect("checked above");
                    task.elapsed_seconds += 1;

                    if task.elapsed_seconds > task.allocated_seconds {
                        match settings.overrun_behavior {
                            OverrunBehavior::Stop => {
                                task.elapsed_seconds -= 1;
                                *state.active_task_id = None;
                                *state.procrastination_used += 1;
                            }
                            OverrunBehavior::Continue => {
                                let overrun_prev = task.overrun_seconds;
                                let overrun_new = task.elapsed_seconds - task.allocated_seconds;
                                let delta = overrun_new - overrun_prev;
                                task.overrun_seconds = overrun_new;

                                match settings.overrun_source {
                                    OverrunSource::Procrastination => {
                                        *state.procrastination_used += delta;
                                    }
                                    OverrunSource::Proportional => {
                                        distribute_proportional(state.tasks, id, delta);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        });

        self.counters.ticks.fetch_add(1, Ordering::Relaxed);

        let count = self.tick_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count % self.save_interval_ticks == 0 {
            self.flush().await;
        }
    }

    /// Coalesces the in-memory mirror into one transactional write per
    /// task plus the procrastination counter (spec §4.1 "periodic
    /// flush"). Failures are logged, never propagated — the in-memory
    /// state remains truth until the next interval.
    async fn flush(&self) {
        let date = self.mirror.date();
        let procrastination_used = self.mirror.procrastination_used();
        let tasks = self.mirror.ordered_tasks();

        let result = warn_if_slow("engine_flush", Duration::from_millis(200), async {
            self.store
                .save_procrastination_used(date, procrastination_used)
                .await?;
            for task in &tasks {
                self.store.upsert_task(date, task).await?;
            }
            Ok::<_, anyhow::Error>(())
        })
        .await;

        match result {
            Ok(()) => {
                self.counters.flushes.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.flush_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, plan_date = %date, "periodic flush failed; retrying next interval");
            }
        }
    }
}

/// Proportional reallocation (spec §4.1): distributes `delta` overrun
/// seconds across non-terminal peer tasks (other than `active_id`) with
/// spare allocation, weighted by each peer's remaining seconds. Floor
/// division under-distributes by up to `|peers| - 1` seconds; accepted
/// (spec §9, Open Question #2 — no reconciliation).
fn distribute_proportional(tasks: &mut HashMap<Uuid, Task>, active_id: Uuid, delta: u64) {
    if delta == 0 {
        return;
    }

    let peers: Vec<Uuid> = tasks
        .iter()
        .filter(|(id, t)| {
            **id != active_id && !t.status.is_terminal() && t.allocated_seconds > t.elapsed_seconds
        })
        .map(|(id, _)| *id)
        .collect();

    if peers.is_empty() {
        return;
    }

    let total_remaining: u64 = peers
        .iter()
        .map(|id| {
            let t = &tasks[id];
            t.allocated_seconds - t.elapsed_seconds
        })
        .sum();

    if total_remaining == 0 {
        return;
    }

    for id in peers {
        let t = tasks.get_mut(&id).expect("collected from this map");
        let remaining = t.allocated_seconds - t.elapsed_seconds;
        let reduction = (delta as u128 * remaining as u128 / total_remaining as u128) as u64;
        t.allocated_seconds = t.allocated_seconds.saturating_sub(reduction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DayPlan;
    use crate::store::mock::MockStore;

    fn mk_engine(tasks: Vec<Task>, settings: Settings) -> Arc<TimerEngine> {
        let mut plan = DayPlan::new(chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        plan.tasks = tasks;
        TimerEngine::new(
            Arc::new(MockStore::new()),
            plan,
            settings,
            Counters::default(),
            10,
        )
    }

    #[tokio::test]
    async fn tick_with_no_active_task_increments_procrastination() {
        let engine = mk_engine(vec![], Settings::default());
        engine.tick().await;
        assert_eq!(engine.mirror.procrastination_used(), 1);
    }

    #[tokio::test]
    async fn tick_increments_active_task_elapsed() {
        let mut t = Task::new(Uuid::new_v4(), "a", 60, None, Priority::Normal, 0);
        t.status = TaskStatus::Active;
        let id = t.id;
        let engine = mk_engine(vec![t], Settings::default());
        engine.activate_task(id);
        engine.tick().await;
        assert_eq!(engine.mirror.task(&id).unwrap().elapsed_seconds, 1);
        assert_eq!(engine.mirror.procrastination_used(), 0);
    }

    #[tokio::test]
    async fn overrun_with_procrastination_source_scenario() {
        // Scenario 2 from spec §8.
        let mut settings = Settings::default();
        settings.overrun_behavior = OverrunBehavior::Continue;
        settings.overrun_source = OverrunSource::Procrastination;

        let mut t = Task::new(Uuid::new_v4(), "a", 60, None, Priority::Normal, 0);
        t.status = TaskStatus::Active;
        let id = t.id;
        let engine = mk_engine(vec![t], settings);
        engine.activate_task(id);

        for _ in 0..60 {
            engine.tick().await;
        }
        let task = engine.mirror.task(&id).unwrap();
        assert_eq!(task.elapsed_seconds, 60);
        assert_eq!(task.overrun_seconds, 0);
        assert_eq!(engine.mirror.procrastination_used(), 0);

        for _ in 0..30 {
            engine.tick().await;
        }
        let task = engine.mirror.task(&id).unwrap();
        assert_eq!(task.elapsed_seconds, 90);
        assert_eq!(task.overrun_seconds, 30);
        assert_eq!(engine.mirror.procrastination_used(), 30);
    }

    #[test]
    fn proportional_reallocation_two_peers_scenario() {
        // Scenario 3 from spec §8. Exercised directly against a single
        // delta=10 overrun event — per `timer.py::_tick`, the real loop
        // applies this per second with delta=1, which under-distributes
        // to zero every tick (50/250 and 200/200 both floor to 0); the
        // spec's literal numbers describe the formula's outcome for one
        // accumulated overrun event, not a 110-tick simulation.
        let a_id = Uuid::new_v4();

        let mut b = Task::new(Uuid::new_v4(), "B", 100, None, Priority::Normal, 1);
        b.elapsed_seconds = 50;
        let b_id = b.id;

        let c = Task::new(Uuid::new_v4(), "C", 200, None, Priority::Normal, 2);
        let c_id = c.id;

        let mut tasks = HashMap::new();
        tasks.insert(b_id, b);
        tasks.insert(c_id, c);

        distribute_proportional(&mut tasks, a_id, 10);

        assert_eq!(tasks[&b_id].allocated_seconds, 98);
        assert_eq!(tasks[&c_id].allocated_seconds, 192);
    }

    #[tokio::test]
    async fn overrun_stop_behavior_reverts_increment_and_falls_back_to_procrastination() {
        let mut settings = Settings::default();
        settings.overrun_behavior = OverrunBehavior::Stop;

        let mut t = Task::new(Uuid::new_v4(), "a", 5, None, Priority::Normal, 0);
        t.status = TaskStatus::Active;
        let id = t.id;
        let engine = mk_engine(vec![t], settings);
        engine.activate_task(id);

        for _ in 0..5 {
            engine.tick().await;
        }
        assert_eq!(engine.mirror.task(&id).unwrap().elapsed_seconds, 5);
        assert_eq!(engine.mirror.active_task_id(), Some(id));

        engine.tick().await;
        let task = engine.mirror.task(&id).unwrap();
        assert_eq!(task.elapsed_seconds, 5);
        assert_eq!(engine.mirror.active_task_id(), None);
        assert_eq!(engine.mirror.procrastination_used(), 1);
    }

    #[tokio::test]
    async fn activate_then_deactivate_restores_prior_status() {
        let t = Task::new(Uuid::new_v4(), "a", 60, None, Priority::Normal, 0);
        let id = t.id;
        let engine = mk_engine(vec![t], Settings::default());

        engine.activate_task(id);
        assert_eq!(engine.mirror.task(&id).unwrap().status, TaskStatus::Active);

        engine.deactivate();
        assert_eq!(engine.mirror.task(&id).unwrap().status, TaskStatus::Pending);
        assert_eq!(engine.mirror.active_task_id(), None);
    }

    #[tokio::test]
    async fn add_task_rejects_non_positive_allocation() {
        let engine = mk_engine(vec![], Settings::default());
        let err = engine
            .add_task(Uuid::new_v4(), "x", 0, None, Priority::Normal, 0)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn unknown_task_id_commands_are_no_ops() {
        let engine = mk_engine(vec![], Settings::default());
        engine.remove_task(Uuid::new_v4());
        engine.activate_task(Uuid::new_v4());
        engine.complete_task(Uuid::new_v4()).await;
        engine.skip_task(Uuid::new_v4()).await;
        // No panic means success; mirror remains empty.
        assert!(engine.mirror.ordered_tasks().is_empty());
    }
}

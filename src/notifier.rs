//! Notification Scheduler (spec §4.2), grounded on
//! `timer.py::NotificationScheduler`. An independent background worker
//! that scans the engine's task snapshot every `scan_interval` and fires
//! at-most-once reminders through a callback.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::metrics::Counters;
use crate::model::Task;
use crate::timer::TimerEngine;

/// `(title, message)` callback invoked once per task per engine
/// lifetime (spec §6.2).
pub type NotifyCallback = Arc<dyn Fn(String, String) + Send + Sync>;

pub struct NotificationScheduler {
    engine: Arc<TimerEngine>,
    callback: NotifyCallback,
    fired: Mutex<HashSet<Uuid>>,
    counters: Counters,
    scan_interval: Duration,
    worker: AsyncMutex<Option<JoinHandle<()>>>,
}

impl NotificationScheduler {
    pub fn new(
        engine: Arc<TimerEngine>,
        callback: NotifyCallback,
        counters: Counters,
        scan_interval_secs: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            callback,
            fired: Mutex::new(HashSet::new()),
            counters,
            scan_interval: Duration::from_secs(scan_interval_secs.max(1)),
            worker: AsyncMutex::new(None),
        })
    }

    pub fn start(self: &Arc<Self>) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.scan_interval);
            loop {
                ticker.tick().await;
                this.scan();
            }
        });

        if let Ok(mut slot) = self.worker.try_lock() {
            *slot = Some(handle);
        }
    }

    pub async fn stop(&self) {
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    /// One scan pass. Reads the task snapshot under the engine's lock
    /// (via `tasks_snapshot`, which clones), then invokes the callback
    /// outside any lock — a bad listener can never stall the scheduler
    /// or the tick loop (spec §5, §7).
    fn scan(&self) {
        let settings = self.engine.settings_snapshot();
        let notify_ahead_secs = settings.notify_before_minutes as i64 * 60;
        let now = crate::time_utils::now();

        let due: Vec<(String, String)> = {
            let mut fired = self.fired.lock();
            self.engine
                .tasks_snapshot()
                .into_iter()
                .filter_map(|task| due_notification(&task, now, notify_ahead_secs, &mut fired))
                .collect()
        };

        for (title, message) in due {
            self.counters.notifications_fired.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            (self.callback)(title, message);
        }
    }
}

/// Returns `Some((title, message))` and marks the task fired iff it is
/// due and has not already fired this engine lifetime. Unparseable or
/// absent `scheduled_time` is silently skipped, matching
/// `timer.py::_check`'s `try/except ValueError: continue`.
fn due_notification(
    task: &Task,
    now: chrono::DateTime<chrono::Local>,
    notify_ahead_secs: i64,
    fired: &mut HashSet<Uuid>,
) -> Option<(String, String)> {
    if task.status.is_terminal() || fired.contains(&task.id) {
        return None;
    }

    let scheduled_time = task.scheduled_time.as_deref()?;
    let scheduled = crate::time_utils::parse_scheduled_time(scheduled_time, now)?;
    let seconds_until = crate::time_utils::seconds_until(scheduled, now);

    if seconds_until < 0 || seconds_until > notify_ahead_secs {
        return None;
    }

    fired.insert(task.id);

    let title = format!("\u{23F0} Скоро: {}", task.name);
    let minutes = seconds_until / 60;
    let message = if minutes > 0 {
        format!("Через {minutes} мин. ({scheduled_time})")
    } else {
        "Уже сейчас!".to_string()
    };

    Some((title, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Priority, TaskStatus};
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> chrono::DateTime<chrono::Local> {
        chrono::Local.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap()
    }

    fn task_at(scheduled: &str) -> Task {
        Task::new(Uuid::new_v4(), "Standup", 600, Some(scheduled.to_string()), Priority::Normal, 0)
    }

    #[test]
    fn fires_once_within_lead_window() {
        let mut fired = HashSet::new();
        let task = task_at("09:00");
        let now = at(8, 56);

        let result = due_notification(&task, now, 300, &mut fired);
        assert!(result.is_some());
        let (_, msg) = result.unwrap();
        assert!(msg.contains("4 мин"));
        assert!(fired.contains(&task.id));

        // Second scan at the same or later time never re-fires.
        let result2 = due_notification(&task, at(8, 57), 300, &mut fired);
        assert!(result2.is_none());
    }

    #[test]
    fn does_not_fire_outside_window() {
        let mut fired = HashSet::new();
        let task = task_at("09:00");
        assert!(due_notification(&task, at(8, 30), 300, &mut fired).is_none());
    }

    #[test]
    fn terminal_tasks_never_notify() {
        let mut fired = HashSet::new();
        let mut task = task_at("09:00");
        task.status = TaskStatus::Completed;
        assert!(due_notification(&task, at(8, 56), 300, &mut fired).is_none());
    }

    #[test]
    fn unparseable_scheduled_time_is_skipped_silently() {
        let mut fired = HashSet::new();
        let task = task_at("not-a-time");
        assert!(due_notification(&task, at(8, 56), 300, &mut fired).is_none());
    }

    #[test]
    fn missing_scheduled_time_never_notifies() {
        let mut fired = HashSet::new();
        let task = Task::new(Uuid::new_v4(), "Untimed", 600, None, Priority::Normal, 0);
        assert!(due_notification(&task, at(8, 56), 300, &mut fired).is_none());
    }
}

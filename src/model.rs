//! Domain data model (spec §3): Day Plan, Task, Settings, Coin Balance,
//! Coin Transaction, Reward. Enums persist as short textual codes for
//! forward compatibility, per spec §9's re-architecture advice.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Active,
    Completed,
    Skipped,
}

impl TaskStatus {
    pub fn as_code(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Active => "active",
            TaskStatus::Completed => "completed",
            TaskStatus::Skipped => "skipped",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "pending" => Some(TaskStatus::Pending),
            "active" => Some(TaskStatus::Active),
            "completed" => Some(TaskStatus::Completed),
            "skipped" => Some(TaskStatus::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Skipped)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    pub fn as_code(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "high" => Some(Priority::High),
            "normal" => Some(Priority::Normal),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl Default for Priority {
    /// Missing priority reads as Normal (spec §3 invariant).
    fn default() -> Self {
        Priority::Normal
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverrunBehavior {
    Continue,
    Stop,
}

impl OverrunBehavior {
    pub fn as_code(&self) -> &'static str {
        match self {
            OverrunBehavior::Continue => "continue",
            OverrunBehavior::Stop => "stop",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "continue" => Some(OverrunBehavior::Continue),
            "stop" => Some(OverrunBehavior::Stop),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverrunSource {
    Procrastination,
    Proportional,
}

impl OverrunSource {
    pub fn as_code(&self) -> &'static str {
        match self {
            OverrunSource::Procrastination => "procrastination",
            OverrunSource::Proportional => "proportional",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "procrastination" => Some(OverrunSource::Procrastination),
            "proportional" => Some(OverrunSource::Proportional),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardType {
    Single,
    Limited,
    Subscription,
}

impl RewardType {
    pub fn as_code(&self) -> &'static str {
        match self {
            RewardType::Single => "single",
            RewardType::Limited => "limited",
            RewardType::Subscription => "subscription",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "single" => Some(RewardType::Single),
            "limited" => Some(RewardType::Limited),
            "subscription" => Some(RewardType::Subscription),
            _ => None,
        }
    }
}

/// A single task within a Day Plan (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub allocated_seconds: u64,
    pub elapsed_seconds: u64,
    pub overrun_seconds: u64,
    pub status: TaskStatus,
    pub scheduled_time: Option<String>,
    pub position: i64,
    pub priority: Priority,
    pub coins_earned: i64,
    pub coins_penalty: i64,
    pub completed_at: Option<DateTime<Local>>,
    pub carried_over: bool,
}

impl Task {
    pub fn new(
        id: Uuid,
        name: impl Into<String>,
        allocated_seconds: u64,
        scheduled_time: Option<String>,
        priority: Priority,
        position: i64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            allocated_seconds,
            elapsed_seconds: 0,
            overrun_seconds: 0,
            status: TaskStatus::Pending,
            scheduled_time,
            position,
            priority,
            coins_earned: 0,
            coins_penalty: 0,
            completed_at: None,
            carried_over: false,
        }
    }

    /// Remaining seconds before this task hits its allocation. Never
    /// negative; tasks already in overrun report zero remaining.
    pub fn remaining_seconds(&self) -> u64 {
        self.allocated_seconds.saturating_sub(self.elapsed_seconds)
    }

    /// The "effective time" contribution of this task toward the day's
    /// 24h budget: `elapsed_seconds` once closed, `allocated_seconds`
    /// while still open. Used by `procrastination_limit` (spec §4.1,
    /// Open Question #3 — effective-time definition chosen).
    pub fn effective_time(&self) -> u64 {
        if self.status.is_terminal() {
            self.elapsed_seconds
        } else {
            self.allocated_seconds
        }
    }
}

/// One Day Plan per (user, calendar date) (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DayPlan {
    pub date: chrono::NaiveDate,
    pub procrastination_used: u64,
    pub day_bonus: i64,
    pub day_penalty: i64,
    pub day_total: i64,
    pub day_finalized: bool,
    pub tasks: Vec<Task>,
}

impl DayPlan {
    pub fn new(date: chrono::NaiveDate) -> Self {
        Self {
            date,
            procrastination_used: 0,
            day_bonus: 0,
            day_penalty: 0,
            day_total: 0,
            day_finalized: false,
            tasks: Vec::new(),
        }
    }

    pub fn total_allocated_non_terminal(&self) -> u64 {
        self.tasks
            .iter()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.allocated_seconds)
            .sum()
    }

    pub fn task(&self, id: &Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn task_mut(&mut self, id: &Uuid) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| &t.id == id)
    }

    /// Tasks eligible for carry-over: non-terminal and not yet offered
    /// (spec §9 "Carry-over flag").
    pub fn carry_over_candidates(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| !t.status.is_terminal() && !t.carried_over)
            .collect()
    }
}

/// One Settings record per user (or one global row for the desktop
/// variant — `user_id` stays optional in the store schema either way,
/// spec §9).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    pub overrun_behavior: OverrunBehavior,
    pub overrun_source: OverrunSource,
    pub procrastination_override_minutes: Option<u32>,
    pub notify_before_minutes: u32,
    pub gamification_enabled: bool,
    pub base_bonus: i64,
    pub base_penalty: i64,
    pub allow_negative_balance: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            overrun_behavior: OverrunBehavior::Continue,
            overrun_source: OverrunSource::Procrastination,
            procrastination_override_minutes: None,
            notify_before_minutes: 5,
            gamification_enabled: false,
            base_bonus: 10,
            base_penalty: 10,
            allow_negative_balance: false,
        }
    }
}

/// One Coin Balance per user, created once at initialization.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CoinBalance {
    pub balance: i64,
    pub streak: u32,
}

/// Append-only ledger entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoinTransaction {
    pub id: Uuid,
    pub created_at: DateTime<Local>,
    pub amount: i64,
    pub reason: String,
    pub task_id: Option<Uuid>,
    pub plan_date: Option<chrono::NaiveDate>,
    pub reward_id: Option<Uuid>,
}

/// A purchasable reward backing the shop/reward ledger (spec §4.6, §6.1).
/// Catalog *management* (create/edit) is out of core scope; only the
/// fields the purchase flow reads/writes live here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reward {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub reward_type: RewardType,
    pub remaining_count: Option<u32>,
    pub initial_count: Option<u32>,
    pub is_active: bool,
    pub created_at: DateTime<Local>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_task(status: TaskStatus) -> Task {
        let mut t = Task::new(Uuid::new_v4(), "t", 600, None, Priority::Normal, 0);
        t.status = status;
        t
    }

    #[test]
    fn effective_time_uses_elapsed_for_terminal() {
        let mut t = mk_task(TaskStatus::Completed);
        t.elapsed_seconds = 500;
        assert_eq!(t.effective_time(), 500);
    }

    #[test]
    fn effective_time_uses_allocated_for_open() {
        let mut t = mk_task(TaskStatus::Pending);
        t.elapsed_seconds = 500;
        assert_eq!(t.effective_time(), 600);
    }

    #[test]
    fn remaining_seconds_saturates_at_zero() {
        let mut t = mk_task(TaskStatus::Active);
        t.elapsed_seconds = 700;
        assert_eq!(t.remaining_seconds(), 0);
    }

    #[test]
    fn priority_default_is_normal() {
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn status_round_trips_through_code() {
        for s in [
            TaskStatus::Pending,
            TaskStatus::Active,
            TaskStatus::Completed,
            TaskStatus::Skipped,
        ] {
            assert_eq!(TaskStatus::from_code(s.as_code()), Some(s));
        }
    }

    #[test]
    fn carry_over_candidates_excludes_terminal_and_flagged() {
        let mut plan = DayPlan::new(chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        let a = mk_task(TaskStatus::Pending);
        let mut b = mk_task(TaskStatus::Pending);
        b.carried_over = true;
        let c = mk_task(TaskStatus::Completed);
        plan.tasks = vec![a.clone(), b, c];

        let candidates = plan.carry_over_candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, a.id);
    }
}

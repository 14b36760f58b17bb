pub mod mock;
pub mod sqlx_store;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::EngineError;
use crate::model::{CoinBalance, DayPlan, Reward, Settings, Task};

/// Result of a successful reward purchase (spec §4.6).
#[derive(Clone, Debug)]
pub struct PurchaseReceipt {
    pub new_balance: i64,
    pub reward_name: String,
    pub reward_price: i64,
}

/// Persistent store (spec §6.1): Day Plans, Tasks, Settings, Coin
/// Balance, Coin Transactions, Rewards. CRUD + day-scoped queries.
///
/// I/O failures surface as `anyhow::Error`; the caller (flush path)
/// treats these as transient and retries on the next interval (spec
/// §7). Purchase preconditions are a separate typed failure mode
/// (`EngineError`) because they are business-rule rejections, not I/O
/// failures.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_settings(&self) -> anyhow::Result<Settings>;
    async fn save_settings(&self, settings: &Settings) -> anyhow::Result<()>;

    /// Loads (creating lazily if absent) the Day Plan for `date`, with
    /// its tasks in `position` order.
    async fn get_or_create_plan(&self, date: NaiveDate) -> anyhow::Result<DayPlan>;

    async fn load_plan(&self, date: NaiveDate) -> anyhow::Result<Option<DayPlan>>;

    async fn save_plan_summary(
        &self,
        date: NaiveDate,
        procrastination_used: u64,
        day_bonus: i64,
        day_penalty: i64,
        day_total: i64,
        day_finalized: bool,
    ) -> anyhow::Result<()>;

    /// Writes just `procrastination_used`, leaving the gamification
    /// summary fields untouched. The periodic tick-loop flush (spec
    /// §4.1) never knows the finalized bonus/penalty/total, so it uses
    /// this instead of `save_plan_summary`.
    async fn save_procrastination_used(
        &self,
        date: NaiveDate,
        procrastination_used: u64,
    ) -> anyhow::Result<()>;

    async fn upsert_task(&self, date: NaiveDate, task: &Task) -> anyhow::Result<()>;

    async fn delete_task(&self, date: NaiveDate, task_id: Uuid) -> anyhow::Result<()>;

    async fn mark_carried_over(&self, date: NaiveDate, task_ids: &[Uuid]) -> anyhow::Result<()>;

    async fn get_balance(&self) -> anyhow::Result<CoinBalance>;

    async fn update_streak(&self, streak: u32) -> anyhow::Result<()>;

    /// Applies a signed ledger entry that is NOT a reward purchase
    /// (credits, skip/overrun penalties, day-finalization totals) and
    /// appends exactly one Coin Transaction. Honors `allow_negative_balance`
    /// clamp rules per spec §4.6. Returns the new balance.
    async fn apply_transaction(
        &self,
        amount: i64,
        reason: String,
        task_id: Option<Uuid>,
        plan_date: Option<NaiveDate>,
        allow_negative_balance: bool,
    ) -> anyhow::Result<i64>;

    async fn get_reward(&self, reward_id: Uuid) -> anyhow::Result<Option<Reward>>;

    /// Atomically checks preconditions, debits the balance, decrements
    /// `remaining_count` when limited, and appends one Coin Transaction
    /// linked to the reward (spec §4.6).
    async fn purchase_reward(&self, reward_id: Uuid) -> Result<PurchaseReceipt, EngineError>;
}

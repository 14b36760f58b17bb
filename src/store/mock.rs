//! In-memory `Store` test double, grounded on
//! `scheduler/tests/mock_store.rs`'s shape (a `Mutex`-guarded map standing
//! in for the database). Used by unit/integration tests that exercise the
//! timer engine, finalizer, and ledger without a real sqlx connection.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::EngineError;
use crate::ledger;
use crate::model::{CoinBalance, CoinTransaction, DayPlan, Reward, RewardType, Settings, Task};
use crate::store::{PurchaseReceipt, Store};

#[derive(Default)]
struct State {
    settings: Settings,
    plans: HashMap<NaiveDate, DayPlan>,
    balance: CoinBalance,
    transactions: Vec<CoinTransaction>,
    rewards: HashMap<Uuid, Reward>,
}

pub struct MockStore {
    state: Mutex<State>,
}

impl Default for MockStore {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test convenience: seed a plan directly.
    pub fn seed_plan(&self, plan: DayPlan) {
        self.state.lock().plans.insert(plan.date, plan);
    }

    pub fn seed_settings(&self, settings: Settings) {
        self.state.lock().settings = settings;
    }

    pub fn seed_balance(&self, balance: CoinBalance) {
        self.state.lock().balance = balance;
    }

    pub fn seed_reward(&self, reward: Reward) {
        self.state.lock().rewards.insert(reward.id, reward);
    }

    pub fn transactions(&self) -> Vec<CoinTransaction> {
        self.state.lock().transactions.clone()
    }
}

#[async_trait]
impl Store for MockStore {
    async fn get_settings(&self) -> anyhow::Result<Settings> {
        Ok(self.state.lock().settings.clone())
    }

    async fn save_settings(&self, settings: &Settings) -> anyhow::Result<()> {
        self.state.lock().settings = settings.clone();
        Ok(())
    }

    async fn get_or_create_plan(&self, date: NaiveDate) -> anyhow::Result<DayPlan> {
        let mut state = self.state.lock();
        Ok(state.plans.entry(date).or_insert_with(|| DayPlan::new(date)).clone())
    }

    async fn load_plan(&self, date: NaiveDate) -> anyhow::Result<Option<DayPlan>> {
        Ok(self.state.lock().plans.get(&date).cloned())
    }

    async fn save_plan_summary(
        &self,
        date: NaiveDate,
        procrastination_used: u64,
        day_bonus: i64,
        day_penalty: i64,
        day_total: i64,
        day_finalized: bool,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        let plan = state.plans.entry(date).or_insert_with(|| DayPlan::new(date));
        plan.procrastination_used = procrastination_used;
        plan.day_bonus = day_bonus;
        plan.day_penalty = day_penalty;
        plan.day_total = day_total;
        plan.day_finalized = day_finalized;
        Ok(())
    }

    async fn save_procrastination_used(
        &self,
        date: NaiveDate,
        procrastination_used: u64,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        let plan = state.plans.entry(date).or_insert_with(|| DayPlan::new(date));
        plan.procrastination_used = procrastination_used;
        Ok(())
    }

    async fn upsert_task(&self, date: NaiveDate, task: &Task) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        let plan = state.plans.entry(date).or_insert_with(|| DayPlan::new(date));
        match plan.task_mut(&task.id) {
            Some(existing) => *existing = task.clone(),
            None => plan.tasks.push(task.clone()),
        }
        Ok(())
    }

    async fn delete_task(&self, date: NaiveDate, task_id: Uuid) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        if let Some(plan) = state.plans.get_mut(&date) {
            plan.tasks.retain(|t| t.id != task_id);
        }
        Ok(())
    }

    async fn mark_carried_over(&self, date: NaiveDate, task_ids: &[Uuid]) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        if let Some(plan) = state.plans.get_mut(&date) {
            for t in plan.tasks.iter_mut() {
                if task_ids.contains(&t.id) {
                    t.carried_over = true;
                }
            }
        }
        Ok(())
    }

    async fn get_balance(&self) -> anyhow::Result<CoinBalance> {
        Ok(self.state.lock().balance.clone())
    }

    async fn update_streak(&self, streak: u32) -> anyhow::Result<()> {
        self.state.lock().balance.streak = streak;
        Ok(())
    }

    async fn apply_transaction(
        &self,
        amount: i64,
        reason: String,
        task_id: Option<Uuid>,
        plan_date: Option<NaiveDate>,
        allow_negative_balance: bool,
    ) -> anyhow::Result<i64> {
        let mut state = self.state.lock();
        let new_balance =
            ledger::apply_signed_amount(state.balance.balance, amount, allow_negative_balance);

        state.balance.balance = new_balance;
        state.transactions.push(CoinTransaction {
            id: Uuid::new_v4(),
            created_at: crate::time_utils::now(),
            amount,
            reason,
            task_id,
            plan_date,
            reward_id: None,
        });

        Ok(new_balance)
    }

    async fn get_reward(&self, reward_id: Uuid) -> anyhow::Result<Option<Reward>> {
        Ok(self.state.lock().rewards.get(&reward_id).cloned())
    }

    async fn purchase_reward(&self, reward_id: Uuid) -> Result<PurchaseReceipt, EngineError> {
        let mut state = self.state.lock();

        let reward = state
            .rewards
            .get(&reward_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("reward {reward_id} not found")))?;

        ledger::check_purchase_preconditions(&reward, state.balance.balance)?;

        state.balance.balance -= reward.price;
        state.transactions.push(CoinTransaction {
            id: Uuid::new_v4(),
            created_at: crate::time_utils::now(),
            amount: -reward.price,
            reason: format!("Purchase: {}", reward.name),
            task_id: None,
            plan_date: None,
            reward_id: Some(reward_id),
        });

        if reward.reward_type == RewardType::Limited {
            if let Some(r) = state.rewards.get_mut(&reward_id) {
                r.remaining_count = r.remaining_count.map(|c| c.saturating_sub(1));
            }
        }

        Ok(PurchaseReceipt {
            new_balance: state.balance.balance,
            reward_name: reward.name,
            reward_price: reward.price,
        })
    }
}

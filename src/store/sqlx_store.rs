//! `sqlx`-backed implementation of `Store`, grounded on
//! `session/repository_sqlx.rs`'s row-mapping and transaction idioms.
//! Runs against `sqlx::AnyPool` (SQLite by default — spec §6.1).
//!
//! The engine is single-user for now (`user_id` stays NULL everywhere,
//! spec §9), but the column is carried so a future multi-tenant backend
//! can reuse this schema.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::error::EngineError;
use crate::ledger;
use crate::model::{
    CoinBalance, DayPlan, OverrunBehavior, OverrunSource, Priority, Reward, RewardType, Settings,
    Task, TaskStatus,
};
use crate::store::{PurchaseReceipt, Store};

pub struct SqlxStore {
    pool: Arc<AnyPool>,
}

impl SqlxStore {
    pub fn new(pool: Arc<AnyPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    async fn plan_id_for_date(&self, date: NaiveDate) -> anyhow::Result<Option<String>> {
        let row = sqlx::query(
            "SELECT id FROM day_plans WHERE user_id IS NULL AND date = ?",
        )
        .bind(date.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get::<String, _>(0)))
    }
}

fn row_to_task(row: &sqlx::any::AnyRow) -> anyhow::Result<Task> {
    let status_code: String = row.get("status");
    let priority_code: String = row.get("priority");
    let completed_at: Option<String> = row.get("completed_at");

    Ok(Task {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        name: row.get("name"),
        allocated_seconds: row.get::<i64, _>("allocated_seconds") as u64,
        elapsed_seconds: row.get::<i64, _>("elapsed_seconds") as u64,
        overrun_seconds: row.get::<i64, _>("overrun_seconds") as u64,
        status: TaskStatus::from_code(&status_code)
            .ok_or_else(|| anyhow::anyhow!("unknown task status: {status_code}"))?,
        scheduled_time: row.get("scheduled_time"),
        position: row.get("position"),
        priority: Priority::from_code(&priority_code).unwrap_or_default(),
        coins_earned: row.get("coins_earned"),
        coins_penalty: row.get("coins_penalty"),
        completed_at: completed_at
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Local)))
            .transpose()?,
        carried_over: row.get::<i64, _>("carried_over") != 0,
    })
}

fn row_to_settings(row: &sqlx::any::AnyRow) -> anyhow::Result<Settings> {
    let overrun_behavior: String = row.get("overrun_behavior");
    let overrun_source: String = row.get("overrun_source");

    Ok(Settings {
        overrun_behavior: OverrunBehavior::from_code(&overrun_behavior)
            .ok_or_else(|| anyhow::anyhow!("unknown overrun_behavior: {overrun_behavior}"))?,
        overrun_source: OverrunSource::from_code(&overrun_source)
            .ok_or_else(|| anyhow::anyhow!("unknown overrun_source: {overrun_source}"))?,
        procrastination_override_minutes: row
            .get::<Option<i64>, _>("procrastination_override_min")
            .map(|v| v as u32),
        notify_before_minutes: row.get::<i64, _>("notify_before_minutes") as u32,
        gamification_enabled: row.get::<i64, _>("gamification_enabled") != 0,
        base_bonus: row.get("base_bonus"),
        base_penalty: row.get("base_penalty"),
        allow_negative_balance: row.get::<i64, _>("allow_negative_balance") != 0,
    })
}

fn row_to_reward(row: &sqlx::any::AnyRow) -> anyhow::Result<Reward> {
    let reward_type: String = row.get("reward_type");
    let created_at: String = row.get("created_at");

    Ok(Reward {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        name: row.get("name"),
        description: row.get("description"),
        price: row.get("price"),
        reward_type: RewardType::from_code(&reward_type)
            .ok_or_else(|| anyhow::anyhow!("unknown reward_type: {reward_type}"))?,
        remaining_count: row.get::<Option<i64>, _>("remaining_count").map(|v| v as u32),
        initial_count: row.get::<Option<i64>, _>("initial_count").map(|v| v as u32),
        is_active: row.get::<i64, _>("is_active") != 0,
        created_at: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Local),
    })
}

#[async_trait]
impl Store for SqlxStore {
    async fn get_settings(&self) -> anyhow::Result<Settings> {
        let row = sqlx::query("SELECT * FROM settings WHERE user_id IS NULL")
            .fetch_one(&self.pool)
            .await?;
        row_to_settings(&row)
    }

    async fn save_settings(&self, settings: &Settings) -> anyhow::Result<()> {
        sqlx::query(
            r#"
UPDATE settings SET
  overrun_behavior = ?, overrun_source = ?, procrastination_override_min = ?,
  notify_before_minutes = ?, gamification_enabled = ?, base_bonus = ?,
  base_penalty = ?, allow_negative_balance = ?
WHERE user_id IS NULL;
"#,
        )
        .bind(settings.overrun_behavior.as_code())
        .bind(settings.overrun_source.as_code())
        .bind(settings.procrastination_override_minutes.map(|v| v as i64))
        .bind(settings.notify_before_minutes as i64)
        .bind(settings.gamification_enabled as i64)
        .bind(settings.base_bonus)
        .bind(settings.base_penalty)
        .bind(settings.allow_negative_balance as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_or_create_plan(&self, date: NaiveDate) -> anyhow::Result<DayPlan> {
        if let Some(plan) = self.load_plan(date).await? {
            return Ok(plan);
        }

        // Lazily create on first reference (spec §3 lifecycle). A unique
        // constraint race is handled by re-reading the existing row
        // (spec §7 "Store-level integrity violations").
        let plan_id = Uuid::new_v4().to_string();
        let insert = sqlx::query(
            r#"
INSERT INTO day_plans (id, user_id, date, procrastination_used, day_bonus, day_penalty, day_total, day_finalized)
VALUES (?, NULL, ?, 0, 0, 0, 0, 0);
"#,
        )
        .bind(&plan_id)
        .bind(date.to_string())
        .execute(&self.pool)
        .await;

        if insert.is_err() {
            if let Some(plan) = self.load_plan(date).await? {
                return Ok(plan);
            }
        }

        Ok(DayPlan::new(date))
    }

    async fn load_plan(&self, date: NaiveDate) -> anyhow::Result<Option<DayPlan>> {
        let Some(plan_id) = self.plan_id_for_date(date).await? else {
            return Ok(None);
        };

        let plan_row = sqlx::query(
            "SELECT procrastination_used, day_bonus, day_penalty, day_total, day_finalized \
             FROM day_plans WHERE id = ?",
        )
        .bind(&plan_id)
        .fetch_one(&self.pool)
        .await?;

        let mut plan = DayPlan::new(date);
        plan.procrastination_used = plan_row.get::<i64, _>(0) as u64;
        plan.day_bonus = plan_row.get(1);
        plan.day_penalty = plan_row.get(2);
        plan.day_total = plan_row.get(3);
        plan.day_finalized = plan_row.get::<i64, _>(4) != 0;

        let task_rows = sqlx::query("SELECT * FROM tasks WHERE plan_id = ? ORDER BY position ASC")
            .bind(&plan_id)
            .fetch_all(&self.pool)
            .await?;

        for r in &task_rows {
            plan.tasks.push(row_to_task(r)?);
        }

        Ok(Some(plan))
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
        self.get_or_create_plan(date).await?;
        let Some(plan_id) = self.plan_id_for_date(date).await? else {
            anyhow::bail!("plan vanished for date {date}");
        };

        sqlx::query(
            r#"
UPDATE day_plans SET
  procrastination_used = ?, day_bonus = ?, day_penalty = ?, day_total = ?, day_finalized = ?
WHERE id = ?;
"#,
        )
        .bind(procrastination_used as i64)
        .bind(day_bonus)
        .bind(day_penalty)
        .bind(day_total)
        .bind(day_finalized as i64)
        .bind(&plan_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_procrastination_used(
        &self,
        date: NaiveDate,
        procrastination_used: u64,
    ) -> anyhow::Result<()> {
        self.get_or_create_plan(date).await?;
        let Some(plan_id) = self.plan_id_for_date(date).await? else {
            anyhow::bail!("plan vanished for date {date}");
        };

        sqlx::query("UPDATE day_plans SET procrastination_used = ? WHERE id = ?")
            .bind(procrastination_used as i64)
            .bind(&plan_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn upsert_task(&self, date: NaiveDate, task: &Task) -> anyhow::Result<()> {
        self.get_or_create_plan(date).await?;
        let Some(plan_id) = self.plan_id_for_date(date).await? else {
            anyhow::bail!("plan vanished for date {date}");
        };

        let completed_at = task.completed_at.map(|t| t.to_rfc3339());

        sqlx::query(
            r#"
INSERT INTO tasks (
  id, plan_id, name, allocated_seconds, elapsed_seconds, overrun_seconds,
  status, scheduled_time, position, priority, coins_earned, coins_penalty,
  created_at, completed_at, carried_over
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(id) DO UPDATE SET
  name = excluded.name,
  allocated_seconds = excluded.allocated_seconds,
  elapsed_seconds = excluded.elapsed_seconds,
  overrun_seconds = excluded.overrun_seconds,
  status = excluded.status,
  scheduled_time = excluded.scheduled_time,
  position = excluded.position,
  priority = excluded.priority,
  coins_earned = excluded.coins_earned,
  coins_penalty = excluded.coins_penalty,
  completed_at = excluded.completed_at,
  carried_over = excluded.carried_over;
"#,
        )
        .bind(task.id.to_string())
        .bind(&plan_id)
        .bind(&task.name)
        .bind(task.allocated_seconds as i64)
        .bind(task.elapsed_seconds as i64)
        .bind(task.overrun_seconds as i64)
        .bind(task.status.as_code())
        .bind(&task.scheduled_time)
        .bind(task.position)
        .bind(task.priority.as_code())
        .bind(task.coins_earned)
        .bind(task.coins_penalty)
        .bind(crate::time_utils::now().to_rfc3339())
        .bind(completed_at)
        .bind(task.carried_over as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_task(&self, _date: NaiveDate, task_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_carried_over(&self, date: NaiveDate, task_ids: &[Uuid]) -> anyhow::Result<()> {
        let Some(plan_id) = self.plan_id_for_date(date).await? else {
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;
        for id in task_ids {
            sqlx::query("UPDATE tasks SET carried_over = 1 WHERE id = ? AND plan_id = ?")
                .bind(id.to_string())
                .bind(&plan_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn get_balance(&self) -> anyhow::Result<CoinBalance> {
        let row = sqlx::query("SELECT balance, streak FROM coin_balance WHERE user_id IS NULL")
            .fetch_one(&self.pool)
            .await?;

        Ok(CoinBalance {
            balance: row.get(0),
            streak: row.get::<i64, _>(1) as u32,
        })
    }

    async fn update_streak(&self, streak: u32) -> anyhow::Result<()> {
        sqlx::query("UPDATE coin_balance SET streak = ? WHERE user_id IS NULL")
            .bind(streak as i64)
            .execute(&self.pool)
            .await?;
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
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT balance FROM coin_balance WHERE user_id IS NULL")
            .fetch_one(&mut *tx)
            .await?;
        let current: i64 = row.get(0);
        let new_balance = ledger::apply_signed_amount(current, amount, allow_negative_balance);

        sqlx::query("UPDATE coin_balance SET balance = ? WHERE user_id IS NULL")
            .bind(new_balance)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
INSERT INTO coin_transactions (id, created_at, amount, reason, task_id, plan_date, reward_id)
VALUES (?, ?, ?, ?, ?, ?, NULL);
"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(crate::time_utils::now().to_rfc3339())
        .bind(amount)
        .bind(reason)
        .bind(task_id.map(|t| t.to_string()))
        .bind(plan_date.map(|d| d.to_string()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(new_balance)
    }

    async fn get_reward(&self, reward_id: Uuid) -> anyhow::Result<Option<Reward>> {
        let row = sqlx::query("SELECT * FROM rewards WHERE id = ?")
            .bind(reward_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_reward(&r)).transpose()
    }

    async fn purchase_reward(&self, reward_id: Uuid) -> Result<PurchaseReceipt, EngineError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EngineError::PreconditionFailed(format!("store unavailable: {e}")))?;

        let reward_row = sqlx::query("SELECT * FROM rewards WHERE id = ?")
            .bind(reward_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| EngineError::PreconditionFailed(format!("store error: {e}")))?;

        let Some(reward_row) = reward_row else {
            return Err(EngineError::NotFound(format!("reward {reward_id} not found")));
        };

        let reward = row_to_reward(&reward_row)
            .map_err(|e| EngineError::PreconditionFailed(format!("corrupt reward row: {e}")))?;

        let bal_row = sqlx::query("SELECT balance FROM coin_balance WHERE user_id IS NULL")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| EngineError::PreconditionFailed(format!("store error: {e}")))?;
        let balance: i64 = bal_row.get(0);

        ledger::check_purchase_preconditions(&reward, balance)?;

        let new_balance = balance - reward.price;

        sqlx::query("UPDATE coin_balance SET balance = ? WHERE user_id IS NULL")
            .bind(new_balance)
            .execute(&mut *tx)
            .await
            .map_err(|e| EngineError::PreconditionFailed(format!("store error: {e}")))?;

        sqlx::query(
            r#"
INSERT INTO coin_transactions (id, created_at, amount, reason, task_id, plan_date, reward_id)
VALUES (?, ?, ?, ?, NULL, NULL, ?);
"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(crate::time_utils::now().to_rfc3339())
        .bind(-reward.price)
        .bind(format!("Purchase: {}", reward.name))
        .bind(reward_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| EngineError::PreconditionFailed(format!("store error: {e}")))?;

        if reward.reward_type == RewardType::Limited {
            sqlx::query(
                "UPDATE rewards SET remaining_count = MAX(0, remaining_count - 1) WHERE id = ?",
            )
            .bind(reward_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| EngineError::PreconditionFailed(format!("store error: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| EngineError::PreconditionFailed(format!("commit failed: {e}")))?;

        Ok(PurchaseReceipt {
            new_balance,
            reward_name: reward.name,
            reward_price: reward.price,
        })
    }
}

use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS day_plans (
  id TEXT PRIMARY KEY,
  user_id TEXT,
  date TEXT NOT NULL,
  procrastination_used BIGINT NOT NULL,
  day_bonus BIGINT NOT NULL,
  day_penalty BIGINT NOT NULL,
  day_total BIGINT NOT NULL,
  day_finalized BOOLEAN NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Partial index: a plain UNIQUE(user_id, date) never fires for the
    // single-user variant because every row's user_id is NULL, and
    // NULL != NULL for uniqueness purposes. Scope the constraint to the
    // NULL-user_id rows explicitly so one-plan-per-date still holds.
    sqlx::query(
        r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_day_plans_user_date ON day_plans(date) WHERE user_id IS NULL;"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS tasks (
  id TEXT PRIMARY KEY,
  plan_id TEXT NOT NULL,
  name TEXT NOT NULL,
  allocated_seconds BIGINT NOT NULL,
  elapsed_seconds BIGINT NOT NULL,
  overrun_seconds BIGINT NOT NULL,
  status TEXT NOT NULL,
  scheduled_time TEXT,
  position BIGINT NOT NULL,
  priority TEXT NOT NULL,
  coins_earned BIGINT NOT NULL,
  coins_penalty BIGINT NOT NULL,
  created_at TEXT NOT NULL,
  completed_at TEXT,
  carried_over BOOLEAN NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_tasks_plan ON tasks(plan_id);"#)
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS settings (
  user_id TEXT PRIMARY KEY,
  overrun_behavior TEXT NOT NULL,
  overrun_source TEXT NOT NULL,
  procrastination_override_min INTEGER,
  notify_before_minutes INTEGER NOT NULL,
  gamification_enabled BOOLEAN NOT NULL,
  base_bonus BIGINT NOT NULL,
  base_penalty BIGINT NOT NULL,
  allow_negative_balance BOOLEAN NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS coin_balance (
  user_id TEXT PRIMARY KEY,
  balance BIGINT NOT NULL,
  streak INTEGER NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS coin_transactions (
  id TEXT PRIMARY KEY,
  created_at TEXT NOT NULL,
  amount BIGINT NOT NULL,
  reason TEXT NOT NULL,
  task_id TEXT,
  plan_date TEXT,
  reward_id TEXT
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS rewards (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  description TEXT,
  price BIGINT NOT NULL,
  reward_type TEXT NOT NULL,
  remaining_count INTEGER,
  initial_count INTEGER,
  is_active BOOLEAN NOT NULL,
  created_at TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Seed the single global Settings row and Coin Balance row on first run
    // (user_id stays NULL for the desktop/single-user variant, per spec §9).
    sqlx::query(
        r#"
INSERT INTO settings (
  user_id, overrun_behavior, overrun_source, procrastination_override_min,
  notify_before_minutes, gamification_enabled, base_bonus, base_penalty,
  allow_negative_balance
)
SELECT NULL, 'continue', 'procrastination', NULL, 5, 0, 10, 10, 0
WHERE NOT EXISTS (SELECT 1 FROM settings WHERE user_id IS NULL);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
INSERT INTO coin_balance (user_id, balance, streak)
SELECT NULL, 0, 0
WHERE NOT EXISTS (SELECT 1 FROM coin_balance WHERE user_id IS NULL);
"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

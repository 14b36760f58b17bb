//! Pure plan validator (spec §4.5). Produces human-readable warnings;
//! never mutates the plan and performs no I/O.

use crate::model::DayPlan;
use crate::time_utils;

/// Returns warnings for `plan`, in deterministic order: the over-budget
/// warning (if any) first, then overlap warnings ordered by start time
/// ascending, ties broken by insertion order.
pub fn check_plan(plan: &DayPlan) -> Vec<String> {
    let mut warnings = Vec::new();

    let non_terminal: Vec<_> = plan.tasks.iter().filter(|t| !t.status.is_terminal()).collect();

    let total: u64 = non_terminal.iter().map(|t| t.allocated_seconds).sum();
    if total > time_utils::SECONDS_IN_DAY as u64 {
        let hours = total / 3600;
        warnings.push(format!(
            "Total task time is {hours}h — more than a full day"
        ));
    }

    let now = time_utils::now();
    let mut timed: Vec<(usize, &str, i64, i64)> = Vec::new();
    for (idx, t) in non_terminal.iter().enumerate() {
        let Some(scheduled) = t.scheduled_time.as_deref() else {
            continue;
        };
        let Some(start) = time_utils::parse_scheduled_time(scheduled, now) else {
            continue;
        };
        let start_s = start.timestamp();
        let end_s = start_s + t.allocated_seconds as i64;
        timed.push((idx, t.name.as_str(), start_s, end_s));
    }

    // Stable sort by start time; equal starts keep insertion order because
    // `sort_by_key` on a stable sort preserves relative order of ties.
    timed.sort_by_key(|(idx, _, start, _)| (*start, *idx));

    // Every pair, not just sorted-adjacent ones: a short task fully
    // nested inside a long one would otherwise hide an overlap with a
    // third task that starts after the nested one ends.
    for i in 0..timed.len() {
        let (_, a_name, _, a_end) = timed[i];
        for pair_b in &timed[i + 1..] {
            let (_, b_name, b_start, b_end) = *pair_b;
            if b_start >= a_end {
                break;
            }
            let overlap_minutes = (a_end.min(b_end) - b_start) / 60;
            warnings.push(format!(
                "\"{a_name}\" and \"{b_name}\" overlap by {overlap_minutes} minutes"
            ));
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Priority, Task, TaskStatus};
    use uuid::Uuid;

    fn mk(name: &str, alloc: u64, scheduled: Option<&str>) -> Task {
        Task::new(
            Uuid::new_v4(),
            name,
            alloc,
            scheduled.map(|s| s.to_string()),
            Priority::Normal,
            0,
        )
    }

    #[test]
    fn empty_plan_has_no_warnings() {
        let plan = DayPlan::new(chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert!(check_plan(&plan).is_empty());
    }

    #[test]
    fn over_budget_day_warns() {
        let mut plan = DayPlan::new(chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        plan.tasks = vec![mk("a", 50_000, None), mk("b", 50_000, None)];
        let warnings = check_plan(&plan);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("more than a full day"));
    }

    #[test]
    fn terminal_tasks_excluded_from_budget_and_overlap() {
        let mut plan = DayPlan::new(chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        let mut t = mk("a", 90_000, Some("09:00"));
        t.status = TaskStatus::Completed;
        plan.tasks = vec![t];
        assert!(check_plan(&plan).is_empty());
    }

    #[test]
    fn overlapping_scheduled_tasks_warn() {
        let mut plan = DayPlan::new(chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        plan.tasks = vec![
            mk("Write report", 3600, Some("09:00")),
            mk("Standup", 1800, Some("09:30")),
        ];
        let warnings = check_plan(&plan);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Write report"));
        assert!(warnings[0].contains("Standup"));
        assert!(warnings[0].contains("30 minutes"));
    }

    #[test]
    fn tasks_without_scheduled_time_never_overlap() {
        let mut plan = DayPlan::new(chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        plan.tasks = vec![mk("a", 3600, None), mk("b", 3600, None)];
        assert!(check_plan(&plan).is_empty());
    }

    #[test]
    fn non_adjacent_overlap_is_still_detected() {
        // A short task fully nested inside a long one still overlaps a
        // third task that starts after the nested one ends — the sorted
        // order puts it non-adjacent to the long task.
        let mut plan = DayPlan::new(chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        plan.tasks = vec![
            mk("Long", 7200, Some("09:00")),  // 09:00-11:00
            mk("Nested", 900, Some("09:30")), // 09:30-09:45
            mk("Later", 3600, Some("10:30")), // 10:30-11:30, overlaps "Long" only
        ];
        let warnings = check_plan(&plan);
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.contains("Long") && w.contains("Nested")));
        assert!(warnings.iter().any(|w| w.contains("Long") && w.contains("Later")));
    }

    #[test]
    fn unparseable_scheduled_time_does_not_participate() {
        let mut plan = DayPlan::new(chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        plan.tasks = vec![
            mk("a", 3600, Some("not-a-time")),
            mk("b", 3600, Some("09:00")),
        ];
        assert!(check_plan(&plan).is_empty());
    }
}

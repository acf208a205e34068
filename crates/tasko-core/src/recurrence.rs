use chrono::{Days, Months, NaiveDate};
use tasko_shared::Recurrence;

/// Due date for the task that replaces a completed recurring one.
///
/// Overdue bases restart from `today`, so a task left undone for weeks comes
/// back once instead of replaying every missed period. Monthly steps use
/// calendar months and clamp to the last day of a shorter month.
pub fn next_due_date(
    current: Option<NaiveDate>,
    recurrence: Recurrence,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let base = current.unwrap_or(today).max(today);

    match recurrence {
        Recurrence::None => None,
        Recurrence::Daily => base.checked_add_days(Days::new(1)),
        Recurrence::Weekly => base.checked_add_days(Days::new(7)),
        Recurrence::Monthly => base.checked_add_months(Months::new(1)),
    }
}

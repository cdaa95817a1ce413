//! Payment window scheduling.
//!
//! Each month has two windows: days 1-5 and days 15-20. A date resolves to
//! the window it falls in, or to the next one opening after it. Everything
//! here is a pure function of the date passed in. Dates whose window would
//! fall past the end of the calendar yield `None`.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::Serialize;

use crate::models::payment::PaymentWindow;

const FIRST_WINDOW: (u32, u32) = (1, 5);
const SECOND_WINDOW: (u32, u32) = (15, 20);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub label: String,
}

impl ScheduledWindow {
    fn new(first_of_month: NaiveDate, (start_day, end_day): (u32, u32)) -> Option<Self> {
        let start = first_of_month.checked_add_days(Days::new(u64::from(start_day - 1)))?;
        let end = first_of_month.checked_add_days(Days::new(u64::from(end_day - 1)))?;
        let label = format!(
            "{}-{:02} days {}-{}",
            start.year(),
            start.month(),
            start_day,
            end_day
        );
        Some(Self { start, end, label })
    }

    pub fn window(&self) -> PaymentWindow {
        PaymentWindow {
            start: self.start,
            end: self.end,
        }
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    // Stays inside the month, so it cannot leave the calendar.
    date - Days::new(u64::from(date.day0()))
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    first_of_month(date).checked_add_months(Months::new(1))
}

/// The window a date belongs to:
/// - day 1-5: days 1-5 of the same month
/// - day 6-20: days 15-20 of the same month
/// - day 21+: days 1-5 of the next month (December rolls into January)
pub fn current_window(date: NaiveDate) -> Option<ScheduledWindow> {
    let day = date.day();
    if day <= FIRST_WINDOW.1 {
        ScheduledWindow::new(first_of_month(date), FIRST_WINDOW)
    } else if day <= SECOND_WINDOW.1 {
        ScheduledWindow::new(first_of_month(date), SECOND_WINDOW)
    } else {
        ScheduledWindow::new(first_of_next_month(date)?, FIRST_WINDOW)
    }
}

/// The window that opens after [`current_window`].
pub fn next_window(date: NaiveDate) -> Option<PaymentWindow> {
    let current = current_window(date)?;
    let next = if current.start.day() == FIRST_WINDOW.0 {
        ScheduledWindow::new(current.start, SECOND_WINDOW)?
    } else {
        ScheduledWindow::new(first_of_next_month(current.start)?, FIRST_WINDOW)?
    };
    Some(next.window())
}

/// True on the days reminders go out: inside either window.
pub fn is_active_window_day(date: NaiveDate) -> bool {
    let day = date.day();
    (FIRST_WINDOW.0..=FIRST_WINDOW.1).contains(&day)
        || (SECOND_WINDOW.0..=SECOND_WINDOW.1).contains(&day)
}

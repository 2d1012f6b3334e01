use std::time::SystemTime;

use time::{
    Date, OffsetDateTime, Time,
    format_description::{BorrowedFormatItem, well_known::Rfc3339},
    macros::format_description,
};

pub mod events;
pub mod health;
pub mod parties;
pub mod sse;
pub mod stats;
pub mod validation;
pub mod votes;
pub mod ws;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const CLOCK_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]");

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT)
        .unwrap_or_else(|_| "invalid-date".into())
}

fn format_clock(time: Time) -> String {
    time.format(CLOCK_FORMAT)
        .unwrap_or_else(|_| "invalid-time".into())
}

#[cfg(test)]
mod tests {
    use time::macros::{date, time};

    use super::*;

    #[test]
    fn calendar_values_use_iso_layouts() {
        assert_eq!(format_date(date!(2026 - 03 - 07)), "2026-03-07");
        assert_eq!(format_clock(time!(20:00)), "20:00");
        assert_eq!(
            format_system_time(SystemTime::UNIX_EPOCH),
            "1970-01-01T00:00:00Z"
        );
    }
}

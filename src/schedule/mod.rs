//! Automatic refresh triggers.
//!
//! A [`ScheduleSpec`] says when a target refreshes on its own. All times
//! are UTC. Interval schedules shorter than a day are aligned to multiples
//! of the interval counted from midnight, so a 30 minute schedule fires at
//! :00 and :30 no matter when it was created. Longer intervals are counted
//! from the Unix epoch.
//!
//! The [`Scheduler`] worker checks due targets on a fixed tick and hands
//! them to the refresh queue. Manual refreshes never go through here.

mod scheduler;

pub use scheduler::{ScheduleTable, Scheduler, SchedulerCommand, SchedulerConfig};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::rules::ValidationError;

/// When a target refreshes automatically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ScheduleSpec {
    /// Never refreshes on its own
    #[default]
    None,
    /// Every `minutes`, aligned to UTC midnight (or the epoch for a day or more)
    Interval { minutes: u32 },
    Daily { at: NaiveTime },
    Weekly { day: Weekday, at: NaiveTime },
    /// Days past the end of a month clamp to its last day
    Monthly { day: u32, at: NaiveTime },
    Yearly { month: u32, day: u32, at: NaiveTime },
    /// Fires whenever the host reports a library change
    OnLibraryChange,
}

impl ScheduleSpec {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |msg: String| Err(ValidationError::InvalidSchedule(msg));
        match *self {
            ScheduleSpec::Interval { minutes } if minutes == 0 => {
                invalid("interval must be at least one minute".into())
            }
            ScheduleSpec::Monthly { day, .. } if !(1..=31).contains(&day) => {
                invalid(format!("day of month {} is out of range", day))
            }
            ScheduleSpec::Yearly { month, .. } if !(1..=12).contains(&month) => {
                invalid(format!("month {} is out of range", month))
            }
            ScheduleSpec::Yearly { day, .. } if !(1..=31).contains(&day) => {
                invalid(format!("day of month {} is out of range", day))
            }
            _ => Ok(()),
        }
    }

    /// Whether a library change notification triggers this schedule.
    pub fn on_library_change(&self) -> bool {
        matches!(self, ScheduleSpec::OnLibraryChange)
    }

    /// First fire time strictly after `after`.
    ///
    /// `None` for schedules without a clock (`None`, `OnLibraryChange`).
    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = after.date_naive();
        match *self {
            ScheduleSpec::None | ScheduleSpec::OnLibraryChange => None,
            ScheduleSpec::Interval { minutes } => {
                let step = i64::from(minutes.max(1)) * 60;
                if step >= SECONDS_PER_DAY {
                    let next = (after.timestamp().div_euclid(step) + 1) * step;
                    return DateTime::from_timestamp(next, 0);
                }
                let midnight = at_time(today, NaiveTime::MIN);
                let elapsed = (after - midnight).num_seconds();
                let next = midnight + Duration::seconds((elapsed / step + 1) * step);
                // Alignment restarts at midnight when the step doesn't divide a day
                Some(next.min(midnight + Duration::days(1)))
            }
            ScheduleSpec::Daily { at } => {
                let candidate = at_time(today, at);
                if candidate > after {
                    Some(candidate)
                } else {
                    Some(at_time(today.succ_opt()?, at))
                }
            }
            ScheduleSpec::Weekly { day, at } => {
                let ahead = (7 + day.num_days_from_monday() as i64
                    - after.weekday().num_days_from_monday() as i64)
                    % 7;
                let candidate = at_time(today + Duration::days(ahead), at);
                if candidate > after {
                    Some(candidate)
                } else {
                    Some(candidate + Duration::days(7))
                }
            }
            ScheduleSpec::Monthly { day, at } => {
                let (mut year, mut month) = (today.year(), today.month());
                for _ in 0..2 {
                    let candidate = at_time(clamped_date(year, month, day)?, at);
                    if candidate > after {
                        return Some(candidate);
                    }
                    (year, month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
                }
                None
            }
            ScheduleSpec::Yearly { month, day, at } => (today.year()..=today.year() + 1)
                .filter_map(|year| clamped_date(year, month, day))
                .map(|date| at_time(date, at))
                .find(|candidate| *candidate > after),
        }
    }
}

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

fn at_time(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(time))
}

/// `day` of the month, or the month's last day if it is shorter.
fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last = first_of_next.pred_opt()?.day();
    NaiveDate::from_ymd_opt(year, month, day.clamp(1, last))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_interval_aligns_to_midnight() {
        let spec = ScheduleSpec::Interval { minutes: 30 };
        assert_eq!(spec.next_fire(t(2024, 5, 1, 10, 7)), Some(t(2024, 5, 1, 10, 30)));
        assert_eq!(spec.next_fire(t(2024, 5, 1, 10, 30)), Some(t(2024, 5, 1, 11, 0)));
        assert_eq!(spec.next_fire(t(2024, 5, 1, 23, 45)), Some(t(2024, 5, 2, 0, 0)));
    }

    #[test]
    fn test_interval_restarts_each_day() {
        // 7 hours: 00, 07, 14, 21, then midnight rather than 04:00
        let spec = ScheduleSpec::Interval { minutes: 7 * 60 };
        assert_eq!(spec.next_fire(t(2024, 5, 1, 22, 0)), Some(t(2024, 5, 2, 0, 0)));
    }

    #[test]
    fn test_multi_day_interval_keeps_its_period() {
        let spec = ScheduleSpec::Interval { minutes: 2 * 24 * 60 };
        let after = t(2024, 5, 1, 10, 0);
        let next = spec.next_fire(after).unwrap();
        assert!(next - after > Duration::hours(24));
        assert_eq!(next, t(2024, 5, 3, 0, 0));
        assert_eq!(spec.next_fire(next), Some(t(2024, 5, 5, 0, 0)));

        let weekly = ScheduleSpec::Interval { minutes: 7 * 24 * 60 };
        let first = weekly.next_fire(after).unwrap();
        assert_eq!(weekly.next_fire(first), Some(first + Duration::days(7)));
    }

    #[test]
    fn test_daily() {
        let spec = ScheduleSpec::Daily { at: hm(3, 0) };
        assert_eq!(spec.next_fire(t(2024, 5, 1, 2, 59)), Some(t(2024, 5, 1, 3, 0)));
        assert_eq!(spec.next_fire(t(2024, 5, 1, 3, 0)), Some(t(2024, 5, 2, 3, 0)));
    }

    #[test]
    fn test_weekly() {
        // 2024-05-01 is a Wednesday
        let spec = ScheduleSpec::Weekly { day: Weekday::Mon, at: hm(6, 0) };
        assert_eq!(spec.next_fire(t(2024, 5, 1, 12, 0)), Some(t(2024, 5, 6, 6, 0)));

        let same_day = ScheduleSpec::Weekly { day: Weekday::Wed, at: hm(6, 0) };
        assert_eq!(same_day.next_fire(t(2024, 5, 1, 5, 0)), Some(t(2024, 5, 1, 6, 0)));
        assert_eq!(same_day.next_fire(t(2024, 5, 1, 7, 0)), Some(t(2024, 5, 8, 6, 0)));
    }

    #[test]
    fn test_monthly_clamps_short_months() {
        let spec = ScheduleSpec::Monthly { day: 31, at: hm(0, 0) };
        assert_eq!(spec.next_fire(t(2024, 2, 10, 0, 0)), Some(t(2024, 2, 29, 0, 0)));
        assert_eq!(spec.next_fire(t(2024, 4, 30, 0, 0)), Some(t(2024, 5, 31, 0, 0)));
        assert_eq!(spec.next_fire(t(2024, 12, 31, 1, 0)), Some(t(2025, 1, 31, 0, 0)));
    }

    #[test]
    fn test_yearly_rolls_over() {
        let spec = ScheduleSpec::Yearly { month: 2, day: 29, at: hm(12, 0) };
        assert_eq!(spec.next_fire(t(2023, 1, 1, 0, 0)), Some(t(2023, 2, 28, 12, 0)));
        assert_eq!(spec.next_fire(t(2024, 3, 1, 0, 0)), Some(t(2025, 2, 28, 12, 0)));
    }

    #[test]
    fn test_clockless_schedules_never_fire() {
        assert_eq!(ScheduleSpec::None.next_fire(t(2024, 1, 1, 0, 0)), None);
        assert_eq!(ScheduleSpec::OnLibraryChange.next_fire(t(2024, 1, 1, 0, 0)), None);
        assert!(ScheduleSpec::OnLibraryChange.on_library_change());
    }

    #[test]
    fn test_validate() {
        assert!(ScheduleSpec::Interval { minutes: 0 }.validate().is_err());
        assert!(ScheduleSpec::Monthly { day: 0, at: hm(0, 0) }.validate().is_err());
        assert!(ScheduleSpec::Yearly { month: 13, day: 1, at: hm(0, 0) }.validate().is_err());
        assert!(ScheduleSpec::Monthly { day: 31, at: hm(0, 0) }.validate().is_ok());
    }

    #[test]
    fn test_schedule_json() {
        let spec: ScheduleSpec =
            serde_json::from_str(r#"{"kind":"Weekly","day":"Fri","at":"18:30:00"}"#).unwrap();
        assert_eq!(spec, ScheduleSpec::Weekly { day: Weekday::Fri, at: hm(18, 30) });
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn any_spec() -> impl Strategy<Value = ScheduleSpec> {
            let time = (0u32..24, 0u32..60).prop_map(|(h, m)| hm(h, m));
            prop_oneof![
                (1u32..20_000).prop_map(|minutes| ScheduleSpec::Interval { minutes }),
                time.clone().prop_map(|at| ScheduleSpec::Daily { at }),
                (0u8..7, time.clone()).prop_map(|(d, at)| ScheduleSpec::Weekly {
                    day: Weekday::try_from(d).unwrap(),
                    at
                }),
                (1u32..=31, time.clone()).prop_map(|(day, at)| ScheduleSpec::Monthly { day, at }),
                (1u32..=12, 1u32..=31, time)
                    .prop_map(|(month, day, at)| ScheduleSpec::Yearly { month, day, at }),
            ]
        }

        proptest! {
            #[test]
            fn next_fire_is_strictly_later(spec in any_spec(), secs in 0i64..4_000_000_000) {
                let now = DateTime::from_timestamp(secs, 0).unwrap();
                let next = spec.next_fire(now).unwrap();
                prop_assert!(next > now);
                // Advancing from the fire time moves forward again
                prop_assert!(spec.next_fire(next).unwrap() > next);
            }

            #[test]
            fn interval_never_waits_longer_than_its_step(
                minutes in 1u32..20_000,
                secs in 0i64..4_000_000_000,
            ) {
                let spec = ScheduleSpec::Interval { minutes };
                let now = DateTime::from_timestamp(secs, 0).unwrap();
                let next = spec.next_fire(now).unwrap();
                prop_assert!(next - now <= Duration::minutes(i64::from(minutes)));
                if minutes >= 24 * 60 {
                    let period = spec.next_fire(next).unwrap() - next;
                    prop_assert_eq!(period, Duration::minutes(i64::from(minutes)));
                }
            }
        }
    }
}

//! Series expansion -- converts a recurrence rule plus a first occurrence
//! into the full ordered list of occurrence time windows.
//!
//! Rules are lowered to RFC 5545 rule text and expanded through the `rrule`
//! crate against a `DTSTART` expressed in the appointment's timezone, which
//! gives wall-clock preservation across DST transitions for timed series.
//! Full-time (all-day) series are normalized to UTC day boundaries first and
//! expanded in UTC.
//!
//! Positions are 1-based indices into the raw expansion, before any
//! exception overlay. They are absolute within the series: a window query
//! filters the full expansion instead of re-anchoring it, so the same
//! occurrence keeps the same position no matter which window is asked for.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;
use serde::{Deserialize, Serialize};

use crate::conflict::overlaps;
use crate::error::{EngineError, Result};

/// Hard cap on expansion length. Unbounded series are cut off here.
pub const MAX_OCCURRENCES: u16 = 999;

/// Day of week, in the wire format's bit order (Sunday first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weekday {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Weekday {
    pub const ALL: [Self; 7] = [
        Self::Sunday,
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
        Self::Saturday,
    ];

    const fn bit(self) -> u8 {
        1 << self as u8
    }

    /// RFC 5545 BYDAY token.
    #[must_use]
    pub const fn byday_token(self) -> &'static str {
        match self {
            Self::Sunday => "SU",
            Self::Monday => "MO",
            Self::Tuesday => "TU",
            Self::Wednesday => "WE",
            Self::Thursday => "TH",
            Self::Friday => "FR",
            Self::Saturday => "SA",
        }
    }

    #[must_use]
    pub const fn from_chrono(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Sun => Self::Sunday,
            chrono::Weekday::Mon => Self::Monday,
            chrono::Weekday::Tue => Self::Tuesday,
            chrono::Weekday::Wed => Self::Wednesday,
            chrono::Weekday::Thu => Self::Thursday,
            chrono::Weekday::Fri => Self::Friday,
            chrono::Weekday::Sat => Self::Saturday,
        }
    }

    #[must_use]
    pub const fn to_chrono(self) -> chrono::Weekday {
        match self {
            Self::Sunday => chrono::Weekday::Sun,
            Self::Monday => chrono::Weekday::Mon,
            Self::Tuesday => chrono::Weekday::Tue,
            Self::Wednesday => chrono::Weekday::Wed,
            Self::Thursday => chrono::Weekday::Thu,
            Self::Friday => chrono::Weekday::Fri,
            Self::Saturday => chrono::Weekday::Sat,
        }
    }
}

/// Day-of-week bitmask for weekly rules, Sunday = bit 0 as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const EMPTY: Self = Self(0);

    #[must_use]
    pub fn from_days(days: &[Weekday]) -> Self {
        let mut bits = 0;
        for day in days {
            bits |= day.bit();
        }
        Self(bits)
    }

    /// Raw bitmask, matching the wire format's day constants.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn contains(self, day: Weekday) -> bool {
        self.0 & day.bit() != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set days in bit order (Sunday first).
    #[must_use]
    pub fn days(self) -> Vec<Weekday> {
        Weekday::ALL
            .iter()
            .copied()
            .filter(|day| self.contains(*day))
            .collect()
    }

    /// Bit 7 is unused; a set carrying it cannot come from valid input.
    const fn has_stray_bits(self) -> bool {
        self.0 & 0x80 != 0
    }
}

/// The repetition pattern of a series.
///
/// Monthly and yearly rules come in two flavors: a fixed day of month, or an
/// Nth-weekday rule (`ordinal` 1..=5, or -1 for the last such weekday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePattern {
    Daily {
        interval: u16,
    },
    Weekly {
        interval: u16,
        days: WeekdaySet,
    },
    Monthly {
        interval: u16,
        day_in_month: u8,
    },
    MonthlyByWeekday {
        interval: u16,
        ordinal: i8,
        weekday: Weekday,
    },
    Yearly {
        interval: u16,
        month: u8,
        day_in_month: u8,
    },
    YearlyByWeekday {
        interval: u16,
        ordinal: i8,
        weekday: Weekday,
        month: u8,
    },
}

impl RecurrencePattern {
    const fn interval(self) -> u16 {
        match self {
            Self::Daily { interval }
            | Self::Weekly { interval, .. }
            | Self::Monthly { interval, .. }
            | Self::MonthlyByWeekday { interval, .. }
            | Self::Yearly { interval, .. }
            | Self::YearlyByWeekday { interval, .. } => interval,
        }
    }
}

/// How a series terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesEnd {
    /// Exactly this many occurrences.
    Count(u32),
    /// Occurrences up to and including this instant. An occurrence starting
    /// exactly at the boundary is the last valid one.
    Until(DateTime<Utc>),
    /// No declared end; expansion stops at [`MAX_OCCURRENCES`].
    Never,
}

/// A complete recurrence rule: pattern plus termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub pattern: RecurrencePattern,
    pub end: SeriesEnd,
}

impl RecurrenceRule {
    /// Structural validation, independent of any concrete start time.
    pub fn validate(&self) -> Result<()> {
        if self.pattern.interval() == 0 {
            return Err(EngineError::InvalidRecurrence(
                "interval must be at least 1".to_string(),
            ));
        }
        match self.pattern {
            RecurrencePattern::Weekly { days, .. } => {
                if days.is_empty() {
                    return Err(EngineError::InvalidRecurrence(
                        "weekly rule needs at least one day".to_string(),
                    ));
                }
                if days.has_stray_bits() {
                    return Err(EngineError::InvalidRecurrence(format!(
                        "day mask {:#010b} has bits outside Sunday..Saturday",
                        days.bits()
                    )));
                }
            }
            RecurrencePattern::Monthly { day_in_month, .. } => {
                validate_day_in_month(day_in_month)?;
            }
            RecurrencePattern::MonthlyByWeekday { ordinal, .. } => {
                validate_ordinal(ordinal)?;
            }
            RecurrencePattern::Yearly {
                month,
                day_in_month,
                ..
            } => {
                validate_month(month)?;
                validate_day_in_month(day_in_month)?;
            }
            RecurrencePattern::YearlyByWeekday { ordinal, month, .. } => {
                validate_ordinal(ordinal)?;
                validate_month(month)?;
            }
            RecurrencePattern::Daily { .. } => {}
        }
        if let SeriesEnd::Count(0) = self.end {
            return Err(EngineError::InvalidRecurrence(
                "occurrence count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// RFC 5545 RRULE text for this rule, with UNTIL rendered in `tz` local
    /// time (the rrule crate requires UNTIL and DTSTART to share a timezone;
    /// for UTC the value must carry a trailing `Z`).
    fn to_rrule_text(self, tz: Tz) -> String {
        let mut text = match self.pattern {
            RecurrencePattern::Daily { interval } => {
                format!("FREQ=DAILY;INTERVAL={interval}")
            }
            RecurrencePattern::Weekly { interval, days } => {
                let byday: Vec<&str> = days.days().iter().map(|d| d.byday_token()).collect();
                format!("FREQ=WEEKLY;INTERVAL={interval};BYDAY={}", byday.join(","))
            }
            RecurrencePattern::Monthly {
                interval,
                day_in_month,
            } => {
                format!("FREQ=MONTHLY;INTERVAL={interval};BYMONTHDAY={day_in_month}")
            }
            RecurrencePattern::MonthlyByWeekday {
                interval,
                ordinal,
                weekday,
            } => {
                format!(
                    "FREQ=MONTHLY;INTERVAL={interval};BYDAY={ordinal}{}",
                    weekday.byday_token()
                )
            }
            RecurrencePattern::Yearly {
                interval,
                month,
                day_in_month,
            } => {
                format!(
                    "FREQ=YEARLY;INTERVAL={interval};BYMONTH={month};BYMONTHDAY={day_in_month}"
                )
            }
            RecurrencePattern::YearlyByWeekday {
                interval,
                ordinal,
                weekday,
                month,
            } => {
                format!(
                    "FREQ=YEARLY;INTERVAL={interval};BYMONTH={month};BYDAY={ordinal}{}",
                    weekday.byday_token()
                )
            }
        };
        match self.end {
            SeriesEnd::Count(count) => {
                text.push_str(&format!(";COUNT={count}"));
            }
            SeriesEnd::Until(until) => {
                let local = until.with_timezone(&tz).format("%Y%m%dT%H%M%S");
                if tz == Tz::UTC {
                    text.push_str(&format!(";UNTIL={local}Z"));
                } else {
                    text.push_str(&format!(";UNTIL={local}"));
                }
            }
            SeriesEnd::Never => {}
        }
        text
    }
}

fn validate_day_in_month(day: u8) -> Result<()> {
    if (1..=31).contains(&day) {
        Ok(())
    } else {
        Err(EngineError::InvalidRecurrence(format!(
            "day {day} is outside 1..=31"
        )))
    }
}

fn validate_month(month: u8) -> Result<()> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        Err(EngineError::InvalidRecurrence(format!(
            "month {month} is outside 1..=12"
        )))
    }
}

fn validate_ordinal(ordinal: i8) -> Result<()> {
    if (1..=5).contains(&ordinal) || ordinal == -1 {
        Ok(())
    } else {
        Err(EngineError::InvalidRecurrence(format!(
            "weekday ordinal {ordinal} is outside 1..=5 / -1"
        )))
    }
}

/// One expanded occurrence of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    /// 1-based index within the raw series, before any exception overlay.
    pub position: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Parse an IANA timezone identifier.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse()
        .map_err(|_| EngineError::InvalidTimezone(name.to_string()))
}

/// Snap a full-time window to UTC day boundaries.
///
/// The start becomes UTC midnight of the start's *local* date in `tz`, so a
/// user creating "Jan 1, all day" from any timezone lands on Jan 1 in UTC.
/// The end rounds up to the next day boundary and covers at least one day.
#[must_use]
pub fn normalize_full_time(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    tz: Tz,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let start_day = start.with_timezone(&tz).date_naive();
    let end_local = end.with_timezone(&tz);
    let mut end_day = end_local.date_naive();
    if end_local.time() > NaiveTime::MIN {
        end_day = end_day.succ_opt().unwrap_or(end_day);
    }
    if end_day <= start_day {
        end_day = start_day.succ_opt().unwrap_or(end_day);
    }
    (
        Utc.from_utc_datetime(&start_day.and_time(NaiveTime::MIN)),
        Utc.from_utc_datetime(&end_day.and_time(NaiveTime::MIN)),
    )
}

/// Expand a series into its ordered occurrence list.
///
/// `first_start`/`first_end` are the first occurrence's time window; the
/// caller is expected to hand in a start that matches the rule's pattern
/// (the first Monday for a Monday-only weekly rule, and so on). Timed series
/// keep their wall-clock time in `timezone` across DST transitions;
/// full-time series are normalized to UTC day boundaries first.
///
/// # Errors
///
/// [`EngineError::EndBeforeStart`] / [`EngineError::UntilBeforeStart`] on
/// inconsistent time windows, [`EngineError::InvalidRecurrence`] on
/// structurally bad rules, [`EngineError::Expansion`] when the lowered rule
/// text is rejected by the `rrule` crate.
pub fn expand_series(
    rule: &RecurrenceRule,
    first_start: DateTime<Utc>,
    first_end: DateTime<Utc>,
    timezone: Tz,
    full_time: bool,
) -> Result<Vec<Occurrence>> {
    rule.validate()?;

    let (start, end) = if full_time {
        normalize_full_time(first_start, first_end, timezone)
    } else {
        (first_start, first_end)
    };
    if end <= start {
        return Err(EngineError::EndBeforeStart { start, end });
    }
    if let SeriesEnd::Until(until) = rule.end {
        if until < start {
            return Err(EngineError::UntilBeforeStart { start, until });
        }
    }

    // Full-time series iterate in UTC; timed series iterate in the
    // appointment's own zone so local time is preserved across DST.
    let tz = if full_time { Tz::UTC } else { timezone };
    let duration = end - start;

    let dtstart_local = start.with_timezone(&tz).format("%Y%m%dT%H%M%S");
    let rrule_text = format!(
        "DTSTART;TZID={}:{}\nRRULE:{}",
        tz.name(),
        dtstart_local,
        rule.to_rrule_text(tz)
    );

    let rrule_set: RRuleSet = rrule_text
        .parse()
        .map_err(|e| EngineError::Expansion(format!("{e}")))?;

    let instances = rrule_set.all(MAX_OCCURRENCES);
    if instances.limited {
        tracing::debug!(
            cap = MAX_OCCURRENCES,
            "series expansion hit the occurrence cap"
        );
    }

    let occurrences = instances
        .dates
        .into_iter()
        .enumerate()
        .map(|(i, dt)| {
            let start_utc: DateTime<Utc> = dt.with_timezone(&Utc);
            Occurrence {
                position: i as u32 + 1,
                start: start_utc,
                end: start_utc + duration,
            }
        })
        .collect();

    Ok(occurrences)
}

/// Occurrences whose interval intersects the half-open window `[from, to)`.
///
/// Touching boundaries do not count: an occurrence ending exactly at `from`,
/// or starting exactly at `to`, is outside the window.
#[must_use]
pub fn occurrences_in_window(
    occurrences: &[Occurrence],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<Occurrence> {
    occurrences
        .iter()
        .copied()
        .filter(|occ| overlaps(occ.start, occ.end, from, to))
        .collect()
}

//! Series expansion tests: interval spacing, termination boundaries,
//! wall-clock preservation across DST, and full-time normalization.

use appoint_engine::recurrence::{
    expand_series, normalize_full_time, occurrences_in_window, RecurrencePattern, RecurrenceRule,
    SeriesEnd, Weekday, WeekdaySet, MAX_OCCURRENCES,
};
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

fn daily(count: u32) -> RecurrenceRule {
    RecurrenceRule {
        pattern: RecurrencePattern::Daily { interval: 1 },
        end: SeriesEnd::Count(count),
    }
}

// ---------------------------------------------------------------------------
// Basic patterns
// ---------------------------------------------------------------------------

#[test]
fn daily_count_five_consecutive_days() {
    let occurrences = expand_series(
        &daily(5),
        utc(2026, 3, 1, 9, 0),
        utc(2026, 3, 1, 9, 30),
        Tz::UTC,
        false,
    )
    .expect("should expand");

    assert_eq!(occurrences.len(), 5);
    for (i, occ) in occurrences.iter().enumerate() {
        let day = 1 + i as u32;
        assert_eq!(occ.position, i as u32 + 1, "positions are 1-based");
        assert_eq!(occ.start, utc(2026, 3, day, 9, 0), "day {day} start");
        assert_eq!(occ.end, utc(2026, 3, day, 9, 30), "day {day} end");
    }
}

#[test]
fn weekly_mon_wed_fri_emits_in_weekday_order() {
    // 2026-03-02 is a Monday.
    let rule = RecurrenceRule {
        pattern: RecurrencePattern::Weekly {
            interval: 1,
            days: WeekdaySet::from_days(&[Weekday::Monday, Weekday::Wednesday, Weekday::Friday]),
        },
        end: SeriesEnd::Count(6),
    };
    let occurrences = expand_series(
        &rule,
        utc(2026, 3, 2, 10, 0),
        utc(2026, 3, 2, 10, 45),
        Tz::UTC,
        false,
    )
    .expect("should expand");

    let starts: Vec<DateTime<Utc>> = occurrences.iter().map(|o| o.start).collect();
    assert_eq!(
        starts,
        vec![
            utc(2026, 3, 2, 10, 0),
            utc(2026, 3, 4, 10, 0),
            utc(2026, 3, 6, 10, 0),
            utc(2026, 3, 9, 10, 0),
            utc(2026, 3, 11, 10, 0),
            utc(2026, 3, 13, 10, 0),
        ]
    );
}

#[test]
fn biweekly_tue_thu_skips_the_off_week() {
    // 2026-03-03 is a Tuesday.
    let rule = RecurrenceRule {
        pattern: RecurrencePattern::Weekly {
            interval: 2,
            days: WeekdaySet::from_days(&[Weekday::Tuesday, Weekday::Thursday]),
        },
        end: SeriesEnd::Count(4),
    };
    let occurrences = expand_series(
        &rule,
        utc(2026, 3, 3, 11, 0),
        utc(2026, 3, 3, 12, 0),
        Tz::UTC,
        false,
    )
    .expect("should expand");

    let starts: Vec<DateTime<Utc>> = occurrences.iter().map(|o| o.start).collect();
    assert_eq!(
        starts,
        vec![
            utc(2026, 3, 3, 11, 0),
            utc(2026, 3, 5, 11, 0),
            utc(2026, 3, 17, 11, 0),
            utc(2026, 3, 19, 11, 0),
        ]
    );
}

#[test]
fn monthly_day_in_month_lands_on_the_same_day() {
    let rule = RecurrenceRule {
        pattern: RecurrencePattern::Monthly {
            interval: 1,
            day_in_month: 15,
        },
        end: SeriesEnd::Count(4),
    };
    let occurrences = expand_series(
        &rule,
        utc(2026, 1, 15, 12, 0),
        utc(2026, 1, 15, 13, 0),
        Tz::UTC,
        false,
    )
    .expect("should expand");

    let starts: Vec<DateTime<Utc>> = occurrences.iter().map(|o| o.start).collect();
    assert_eq!(
        starts,
        vec![
            utc(2026, 1, 15, 12, 0),
            utc(2026, 2, 15, 12, 0),
            utc(2026, 3, 15, 12, 0),
            utc(2026, 4, 15, 12, 0),
        ]
    );
}

#[test]
fn monthly_day_31_skips_short_months() {
    let rule = RecurrenceRule {
        pattern: RecurrencePattern::Monthly {
            interval: 1,
            day_in_month: 31,
        },
        end: SeriesEnd::Count(3),
    };
    let occurrences = expand_series(
        &rule,
        utc(2026, 1, 31, 9, 0),
        utc(2026, 1, 31, 10, 0),
        Tz::UTC,
        false,
    )
    .expect("should expand");

    let starts: Vec<DateTime<Utc>> = occurrences.iter().map(|o| o.start).collect();
    assert_eq!(
        starts,
        vec![
            utc(2026, 1, 31, 9, 0),
            utc(2026, 3, 31, 9, 0),
            utc(2026, 5, 31, 9, 0),
        ],
        "February and April have no day 31"
    );
}

#[test]
fn yearly_fixed_date_repeats_by_year() {
    let rule = RecurrenceRule {
        pattern: RecurrencePattern::Yearly {
            interval: 1,
            month: 7,
            day_in_month: 14,
        },
        end: SeriesEnd::Count(3),
    };
    let occurrences = expand_series(
        &rule,
        utc(2026, 7, 14, 8, 0),
        utc(2026, 7, 14, 9, 0),
        Tz::UTC,
        false,
    )
    .expect("should expand");

    let starts: Vec<DateTime<Utc>> = occurrences.iter().map(|o| o.start).collect();
    assert_eq!(
        starts,
        vec![
            utc(2026, 7, 14, 8, 0),
            utc(2027, 7, 14, 8, 0),
            utc(2028, 7, 14, 8, 0),
        ]
    );
}

// ---------------------------------------------------------------------------
// DST wall-clock preservation
// ---------------------------------------------------------------------------

#[test]
fn third_tuesday_monthly_tracks_la_wall_clock() {
    // 3rd Tuesday of each month at 14:00 America/Los_Angeles, starting
    // 2026-02-17. PST is UTC-8; PDT (from Mar 8) is UTC-7.
    let rule = RecurrenceRule {
        pattern: RecurrencePattern::MonthlyByWeekday {
            interval: 1,
            ordinal: 3,
            weekday: Weekday::Tuesday,
        },
        end: SeriesEnd::Count(3),
    };
    let start = Tz::America__Los_Angeles
        .with_ymd_and_hms(2026, 2, 17, 14, 0, 0)
        .unwrap()
        .with_timezone(&Utc);
    let occurrences = expand_series(
        &rule,
        start,
        start + chrono::Duration::hours(1),
        Tz::America__Los_Angeles,
        false,
    )
    .expect("should expand");

    let starts: Vec<DateTime<Utc>> = occurrences.iter().map(|o| o.start).collect();
    assert_eq!(
        starts,
        vec![
            utc(2026, 2, 17, 22, 0), // 14:00 PST
            utc(2026, 3, 17, 21, 0), // 14:00 PDT, after Mar 8 spring forward
            utc(2026, 4, 21, 21, 0), // 14:00 PDT
        ]
    );
}

#[test]
fn monthly_new_york_matrix_keeps_local_hour_across_both_transitions() {
    // Day 15 of every month at 08:00 America/New_York through a full year.
    // EST is UTC-5, EDT (Mar 8 through Nov 1 in 2026) is UTC-4.
    let rule = RecurrenceRule {
        pattern: RecurrencePattern::Monthly {
            interval: 1,
            day_in_month: 15,
        },
        end: SeriesEnd::Count(12),
    };
    let start = Tz::America__New_York
        .with_ymd_and_hms(2026, 1, 15, 8, 0, 0)
        .unwrap()
        .with_timezone(&Utc);
    let occurrences = expand_series(
        &rule,
        start,
        start + chrono::Duration::hours(1),
        Tz::America__New_York,
        false,
    )
    .expect("should expand");

    assert_eq!(occurrences.len(), 12);
    for occ in &occurrences {
        let local = occ.start.with_timezone(&Tz::America__New_York);
        assert_eq!(
            local.format("%d %H:%M").to_string(),
            "15 08:00",
            "{}: local wall clock must stay 08:00 on day 15",
            occ.start
        );
    }
    // Spot-check the UTC offsets around the transitions.
    assert_eq!(occurrences[0].start, utc(2026, 1, 15, 13, 0), "January EST");
    assert_eq!(occurrences[2].start, utc(2026, 3, 15, 12, 0), "March EDT");
    assert_eq!(
        occurrences[10].start,
        utc(2026, 11, 15, 13, 0),
        "November back on EST"
    );
}

#[test]
fn daily_berlin_series_crosses_spring_forward() {
    // Europe/Berlin springs forward on 2026-03-29. 08:00 CET is 07:00 UTC,
    // 08:00 CEST is 06:00 UTC.
    let start = Tz::Europe__Berlin
        .with_ymd_and_hms(2026, 3, 28, 8, 0, 0)
        .unwrap()
        .with_timezone(&Utc);
    let occurrences = expand_series(
        &daily(3),
        start,
        start + chrono::Duration::hours(1),
        Tz::Europe__Berlin,
        false,
    )
    .expect("should expand");

    let starts: Vec<DateTime<Utc>> = occurrences.iter().map(|o| o.start).collect();
    assert_eq!(
        starts,
        vec![
            utc(2026, 3, 28, 7, 0),
            utc(2026, 3, 29, 6, 0),
            utc(2026, 3, 30, 6, 0),
        ]
    );
}

// ---------------------------------------------------------------------------
// Termination boundaries
// ---------------------------------------------------------------------------

#[test]
fn until_boundary_is_inclusive() {
    // Daily 09:00 from Mar 1; UNTIL exactly at the Mar 4 start instant.
    let rule = RecurrenceRule {
        pattern: RecurrencePattern::Daily { interval: 1 },
        end: SeriesEnd::Until(utc(2026, 3, 4, 9, 0)),
    };
    let occurrences = expand_series(
        &rule,
        utc(2026, 3, 1, 9, 0),
        utc(2026, 3, 1, 9, 30),
        Tz::UTC,
        false,
    )
    .expect("should expand");

    assert_eq!(
        occurrences.len(),
        4,
        "an occurrence starting exactly at UNTIL is the last valid one"
    );
    assert_eq!(occurrences[3].start, utc(2026, 3, 4, 9, 0));
}

#[test]
fn until_just_before_a_start_excludes_it() {
    let rule = RecurrenceRule {
        pattern: RecurrencePattern::Daily { interval: 1 },
        end: SeriesEnd::Until(utc(2026, 3, 4, 8, 59)),
    };
    let occurrences = expand_series(
        &rule,
        utc(2026, 3, 1, 9, 0),
        utc(2026, 3, 1, 9, 30),
        Tz::UTC,
        false,
    )
    .expect("should expand");

    assert_eq!(occurrences.len(), 3);
}

#[test]
fn unbounded_series_stops_at_the_cap() {
    let rule = RecurrenceRule {
        pattern: RecurrencePattern::Daily { interval: 1 },
        end: SeriesEnd::Never,
    };
    let occurrences = expand_series(
        &rule,
        utc(2026, 1, 1, 9, 0),
        utc(2026, 1, 1, 10, 0),
        Tz::UTC,
        false,
    )
    .expect("should expand");

    assert_eq!(occurrences.len(), MAX_OCCURRENCES as usize);
}

// ---------------------------------------------------------------------------
// Full-time normalization
// ---------------------------------------------------------------------------

#[test]
fn full_time_normalizes_to_utc_day_regardless_of_creator_zone() {
    // Midnight Jan 1 in New York and in Tokyo are different instants, but
    // both mean the local date Jan 1, so both normalize to the same UTC day.
    for tz in [Tz::America__New_York, Tz::Asia__Tokyo] {
        let local_midnight = tz
            .with_ymd_and_hms(2009, 1, 1, 0, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        let (start, end) = normalize_full_time(
            local_midnight,
            local_midnight + chrono::Duration::hours(24),
            tz,
        );
        assert_eq!(start, utc(2009, 1, 1, 0, 0), "{tz}: start day");
        assert_eq!(end, utc(2009, 1, 2, 0, 0), "{tz}: end day");
    }
}

#[test]
fn full_time_series_expands_on_utc_day_boundaries() {
    let start = Tz::America__New_York
        .with_ymd_and_hms(2009, 1, 1, 0, 0, 0)
        .unwrap()
        .with_timezone(&Utc);
    let occurrences = expand_series(
        &daily(2),
        start,
        start + chrono::Duration::hours(24),
        Tz::America__New_York,
        true,
    )
    .expect("should expand");

    assert_eq!(occurrences.len(), 2);
    assert_eq!(occurrences[0].start, utc(2009, 1, 1, 0, 0));
    assert_eq!(occurrences[0].end, utc(2009, 1, 2, 0, 0));
    assert_eq!(occurrences[1].start, utc(2009, 1, 2, 0, 0));
    assert_eq!(occurrences[1].end, utc(2009, 1, 3, 0, 0));
}

// ---------------------------------------------------------------------------
// Window queries
// ---------------------------------------------------------------------------

#[test]
fn window_filter_keeps_absolute_positions() {
    let occurrences = expand_series(
        &daily(5),
        utc(2026, 3, 1, 9, 0),
        utc(2026, 3, 1, 9, 30),
        Tz::UTC,
        false,
    )
    .expect("should expand");

    let windowed =
        occurrences_in_window(&occurrences, utc(2026, 3, 3, 0, 0), utc(2026, 3, 5, 0, 0));
    let positions: Vec<u32> = windowed.iter().map(|o| o.position).collect();
    assert_eq!(
        positions,
        vec![3, 4],
        "positions are absolute within the series, not window-relative"
    );
}

#[test]
fn window_boundaries_are_half_open() {
    let occurrences = expand_series(
        &daily(5),
        utc(2026, 3, 1, 9, 0),
        utc(2026, 3, 1, 9, 30),
        Tz::UTC,
        false,
    )
    .expect("should expand");

    // Window starting exactly at an occurrence's end excludes it.
    let from_end = occurrences_in_window(&occurrences, utc(2026, 3, 1, 9, 30), utc(2026, 3, 2, 0, 0));
    assert!(from_end.is_empty(), "touching the window start is not inside");

    // Window ending exactly at an occurrence's start excludes it.
    let to_start = occurrences_in_window(&occurrences, utc(2026, 3, 2, 0, 0), utc(2026, 3, 3, 9, 0));
    let positions: Vec<u32> = to_start.iter().map(|o| o.position).collect();
    assert_eq!(positions, vec![2], "day 3 starts exactly at the window end");
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[test]
fn re_expansion_is_idempotent() {
    let rule = RecurrenceRule {
        pattern: RecurrencePattern::Weekly {
            interval: 1,
            days: WeekdaySet::from_days(&[Weekday::Monday, Weekday::Thursday]),
        },
        end: SeriesEnd::Count(10),
    };
    let start = Tz::Europe__London
        .with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
        .unwrap()
        .with_timezone(&Utc);
    let end = start + chrono::Duration::minutes(30);

    let first = expand_series(&rule, start, end, Tz::Europe__London, false).expect("first");
    let second = expand_series(&rule, start, end, Tz::Europe__London, false).expect("second");
    assert_eq!(first, second);
}

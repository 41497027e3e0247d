//! Property-based tests for series expansion using proptest.
//!
//! These verify invariants that must hold for *any* valid rule, not just
//! the specific examples in `recurrence_tests.rs`.

use appoint_engine::recurrence::{
    expand_series, RecurrencePattern, RecurrenceRule, SeriesEnd, WeekdaySet,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_timezone() -> impl Strategy<Value = Tz> {
    prop_oneof![
        Just(Tz::UTC),
        Just(Tz::America__New_York),
        Just(Tz::America__Los_Angeles),
        Just(Tz::Europe__London),
        Just(Tz::Europe__Berlin),
        Just(Tz::Asia__Tokyo),
    ]
}

fn arb_pattern() -> impl Strategy<Value = RecurrencePattern> {
    prop_oneof![
        (1u16..=6).prop_map(|interval| RecurrencePattern::Daily { interval }),
        (1u16..=4, 1u8..=127).prop_map(|(interval, bits)| RecurrencePattern::Weekly {
            interval,
            days: WeekdaySet::from_bits(bits),
        }),
        (1u16..=3, 1u8..=28).prop_map(|(interval, day_in_month)| RecurrencePattern::Monthly {
            interval,
            day_in_month,
        }),
        (1u16..=2, 1u8..=12, 1u8..=28).prop_map(|(interval, month, day_in_month)| {
            RecurrencePattern::Yearly {
                interval,
                month,
                day_in_month,
            }
        }),
    ]
}

/// Start instants in 2025-2027, day capped at 28 to dodge invalid dates.
fn arb_start() -> impl Strategy<Value = DateTime<Utc>> {
    (2025i32..=2027, 1u32..=12, 1u32..=28, 0u32..=23, 0u32..=59)
        .prop_map(|(y, mo, d, h, mi)| Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap())
}

fn arb_duration_minutes() -> impl Strategy<Value = i64> {
    15i64..=120
}

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Property 1: occurrences are ordered, duplicate-free, and contiguous
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn expansion_is_ordered_and_positions_are_contiguous(
        pattern in arb_pattern(),
        count in 1u32..=40,
        start in arb_start(),
        tz in arb_timezone(),
        dur in arb_duration_minutes(),
    ) {
        let rule = RecurrenceRule { pattern, end: SeriesEnd::Count(count) };
        // A rule the rrule crate cannot realize (e.g. a start swallowed by a
        // DST gap) is allowed to fail; the invariants apply to successes.
        let Ok(occurrences) = expand_series(&rule, start, start + Duration::minutes(dur), tz, false)
        else { return Ok(()); };

        for window in occurrences.windows(2) {
            prop_assert!(
                window[0].start < window[1].start,
                "starts must strictly increase: {:?} then {:?}",
                window[0].start,
                window[1].start
            );
        }
        for (i, occ) in occurrences.iter().enumerate() {
            prop_assert_eq!(occ.position, i as u32 + 1, "positions are 1-based and contiguous");
        }
    }
}

// ---------------------------------------------------------------------------
// Property 2: COUNT bounds the expansion
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn count_bounds_the_expansion(
        pattern in arb_pattern(),
        count in 1u32..=40,
        start in arb_start(),
        tz in arb_timezone(),
        dur in arb_duration_minutes(),
    ) {
        let rule = RecurrenceRule { pattern, end: SeriesEnd::Count(count) };
        let Ok(occurrences) = expand_series(&rule, start, start + Duration::minutes(dur), tz, false)
        else { return Ok(()); };

        prop_assert!(
            occurrences.len() <= count as usize,
            "got {} occurrences for COUNT={}",
            occurrences.len(),
            count
        );
    }
}

// ---------------------------------------------------------------------------
// Property 3: every occurrence keeps the first occurrence's duration
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn duration_is_constant_across_the_series(
        pattern in arb_pattern(),
        count in 1u32..=40,
        start in arb_start(),
        tz in arb_timezone(),
        dur in arb_duration_minutes(),
    ) {
        let rule = RecurrenceRule { pattern, end: SeriesEnd::Count(count) };
        let Ok(occurrences) = expand_series(&rule, start, start + Duration::minutes(dur), tz, false)
        else { return Ok(()); };

        let expected = Duration::minutes(dur);
        for occ in &occurrences {
            prop_assert_eq!(occ.end - occ.start, expected, "occurrence at {:?}", occ.start);
        }
    }
}

// ---------------------------------------------------------------------------
// Property 4: re-expansion is idempotent
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn re_expansion_is_idempotent(
        pattern in arb_pattern(),
        count in 1u32..=40,
        start in arb_start(),
        tz in arb_timezone(),
        dur in arb_duration_minutes(),
    ) {
        let rule = RecurrenceRule { pattern, end: SeriesEnd::Count(count) };
        let end = start + Duration::minutes(dur);
        let first = expand_series(&rule, start, end, tz, false);
        let second = expand_series(&rule, start, end, tz, false);
        match (first, second) {
            (Ok(first), Ok(second)) => prop_assert_eq!(first, second),
            (Err(_), Err(_)) => {}
            (first, second) => {
                return Err(TestCaseError::fail(format!(
                    "expansion not deterministic: {first:?} vs {second:?}"
                )))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Property 5: daily UTC spacing is exactly the interval
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn daily_utc_spacing_matches_the_interval(
        interval in 1u16..=6,
        count in 2u32..=30,
        start in arb_start(),
        dur in arb_duration_minutes(),
    ) {
        // UTC only: wall-clock DST shifts are exercised elsewhere.
        let rule = RecurrenceRule {
            pattern: RecurrencePattern::Daily { interval },
            end: SeriesEnd::Count(count),
        };
        let occurrences =
            expand_series(&rule, start, start + Duration::minutes(dur), Tz::UTC, false)
                .expect("UTC expansion has no DST pitfalls");

        let expected_gap = Duration::days(i64::from(interval));
        for window in occurrences.windows(2) {
            prop_assert_eq!(window[1].start - window[0].start, expected_gap);
        }
    }
}

// ---------------------------------------------------------------------------
// Property 6: the delete-exception overlay arithmetic holds
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn visible_count_is_series_length_minus_delete_exceptions(
        deleted in proptest::collection::btree_set(1u32..=20, 0..=10),
        start in arb_start(),
    ) {
        use appoint_engine::{Appointment, FolderId, ObjectId, ShownAs, Timestamp, UserId};

        let appointment = Appointment {
            id: ObjectId(1),
            folder_id: FolderId(1),
            title: "series".to_string(),
            note: None,
            location: None,
            start,
            end: start + Duration::hours(1),
            full_time: false,
            timezone: Tz::UTC,
            recurrence: Some(RecurrenceRule {
                pattern: RecurrencePattern::Daily { interval: 1 },
                end: SeriesEnd::Count(20),
            }),
            recurrence_id: None,
            recurrence_position: None,
            delete_exceptions: deleted.clone(),
            change_exceptions: Default::default(),
            participants: Vec::new(),
            users: Vec::new(),
            shown_as: ShownAs::Reserved,
            alarm_minutes: None,
            organizer: UserId(1),
            last_modified: Timestamp(1),
        };

        prop_assert_eq!(
            appointment.visible_occurrence_count().expect("count"),
            20 - deleted.len()
        );
        prop_assert_eq!(
            appointment.visible_virtual_occurrences().expect("expand").len(),
            20 - deleted.len()
        );
    }
}

//! `appoint` CLI — expand, compare, and analyze appointment series from the
//! command line.
//!
//! ## Usage
//!
//! ```sh
//! # Expand a series document into concrete occurrences (stdin → stdout)
//! cat series.json | appoint expand
//!
//! # Expand from a file, restricted to a half-open window
//! appoint expand -i series.json --from 2026-03-01T00:00:00Z --to 2026-04-01T00:00:00Z
//!
//! # Report overlaps between the occurrences of two series
//! appoint conflicts --first a.json --second b.json
//!
//! # Compute free slots from a list of series documents
//! appoint freebusy -i calendar.json --from 2026-03-02T08:00:00Z --to 2026-03-02T17:00:00Z
//! ```

use anyhow::{Context, Result};
use appoint_engine::recurrence::{
    expand_series, normalize_full_time, occurrences_in_window, parse_timezone, Occurrence,
    RecurrenceRule,
};
use appoint_engine::{freebusy, overlaps, ShownAs};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};

#[derive(Parser)]
#[command(name = "appoint", version, about = "Appointment series inspection CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a series document into concrete occurrences
    Expand {
        /// Input file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Keep only occurrences intersecting the window starting here
        #[arg(long, requires = "to")]
        from: Option<String>,
        /// End of the half-open window
        #[arg(long, requires = "from")]
        to: Option<String>,
    },
    /// Report overlaps between the occurrences of two series documents
    Conflicts {
        /// First series document
        #[arg(long)]
        first: String,
        /// Second series document
        #[arg(long)]
        second: String,
    },
    /// Compute free slots from a JSON array of series documents
    Freebusy {
        /// Input file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Window start (RFC 3339)
        #[arg(long)]
        from: String,
        /// Window end (RFC 3339)
        #[arg(long)]
        to: String,
    },
}

/// A series as fed to the CLI: the scheduling-relevant subset of an
/// appointment, with the timezone as an IANA string.
#[derive(Debug, Deserialize)]
struct SeriesDoc {
    #[serde(default)]
    title: Option<String>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    #[serde(default)]
    full_time: bool,
    timezone: String,
    #[serde(default)]
    recurrence: Option<RecurrenceRule>,
    #[serde(default)]
    shown_as: ShownAs,
}

#[derive(Debug, Serialize)]
struct OverlapReport {
    first_position: u32,
    second_position: u32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    overlap_minutes: i64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Expand { input, from, to } => {
            let doc = read_doc(input.as_deref())?;
            let mut occurrences = occurrences_of(&doc)?;
            if let (Some(from), Some(to)) = (from, to) {
                let from = parse_instant(&from)?;
                let to = parse_instant(&to)?;
                occurrences = occurrences_in_window(&occurrences, from, to);
            }
            print_json(&occurrences)
        }
        Commands::Conflicts { first, second } => {
            let first_doc: SeriesDoc = parse_doc(&std::fs::read_to_string(&first)
                .with_context(|| format!("reading {first}"))?)?;
            let second_doc: SeriesDoc = parse_doc(&std::fs::read_to_string(&second)
                .with_context(|| format!("reading {second}"))?)?;
            print_json(&find_overlaps(&first_doc, &second_doc)?)
        }
        Commands::Freebusy { input, from, to } => {
            let text = read_input(input.as_deref())?;
            let docs: Vec<SeriesDoc> = serde_json::from_str(&text)
                .context("input must be a JSON array of series documents")?;
            let from = parse_instant(&from)?;
            let to = parse_instant(&to)?;

            let mut busy = Vec::new();
            for doc in docs.iter().filter(|d| d.shown_as.reserves_time()) {
                busy.extend(
                    occurrences_of(doc)?
                        .iter()
                        .map(|occ| (occ.start, occ.end)),
                );
            }
            print_json(&freebusy::free_slots(&busy, from, to))
        }
    }
}

/// Pairwise overlaps between the expansions of two documents. Free-marked
/// documents never overlap anything, matching the engine's conflict rules.
fn find_overlaps(first: &SeriesDoc, second: &SeriesDoc) -> Result<Vec<OverlapReport>> {
    if !first.shown_as.reserves_time() || !second.shown_as.reserves_time() {
        return Ok(Vec::new());
    }
    let first_occurrences = occurrences_of(first)?;
    let second_occurrences = occurrences_of(second)?;

    let mut reports = Vec::new();
    for a in &first_occurrences {
        for b in &second_occurrences {
            if overlaps(a.start, a.end, b.start, b.end) {
                let start = a.start.max(b.start);
                let end = a.end.min(b.end);
                reports.push(OverlapReport {
                    first_position: a.position,
                    second_position: b.position,
                    start,
                    end,
                    overlap_minutes: (end - start).num_minutes(),
                });
            }
        }
    }
    Ok(reports)
}

fn occurrences_of(doc: &SeriesDoc) -> Result<Vec<Occurrence>> {
    let tz = parse_timezone(&doc.timezone)?;
    let occurrences = match &doc.recurrence {
        Some(rule) => expand_series(rule, doc.start, doc.end, tz, doc.full_time)
            .with_context(|| format!("expanding '{}'", doc.title.as_deref().unwrap_or("series")))?,
        None => {
            let (start, end) = if doc.full_time {
                normalize_full_time(doc.start, doc.end, tz)
            } else {
                (doc.start, doc.end)
            };
            vec![Occurrence {
                position: 1,
                start,
                end,
            }]
        }
    };
    Ok(occurrences)
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("reading {path}"))
        }
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("reading stdin")?;
            Ok(buffer)
        }
    }
}

fn read_doc(path: Option<&str>) -> Result<SeriesDoc> {
    parse_doc(&read_input(path)?)
}

fn parse_doc(text: &str) -> Result<SeriesDoc> {
    serde_json::from_str(text).context("input is not a valid series document")
}

fn parse_instant(text: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(text)
        .with_context(|| format!("'{text}' is not an RFC 3339 instant"))?;
    Ok(parsed.with_timezone(&Utc))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

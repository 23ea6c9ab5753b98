//! Reduce raw clock events into one row per employee per day.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::model::attendance::{AttendanceRecord, EventKind};

#[derive(Debug, Error, PartialEq)]
pub enum SummaryError {
    #[error("attendance record {record_id} has malformed {field}: {value:?}")]
    MalformedEvent {
        record_id: u64,
        field: &'static str,
        value: String,
    },
}

/// A parsed, trusted attendance event.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceEvent {
    pub id: u64,
    pub employee_id: u64,
    pub employee_name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub kind: EventKind,
    pub timestamp: DateTime<FixedOffset>,
}

pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

impl TryFrom<&AttendanceRecord> for AttendanceEvent {
    type Error = SummaryError;

    fn try_from(record: &AttendanceRecord) -> Result<Self, Self::Error> {
        let malformed = |field: &'static str, value: &str| SummaryError::MalformedEvent {
            record_id: record.id,
            field,
            value: value.to_string(),
        };

        let timestamp = DateTime::parse_from_rfc3339(record.recorded_at.trim())
            .map_err(|_| malformed("timestamp", &record.recorded_at))?;
        let date = NaiveDate::parse_from_str(record.event_date.trim(), "%Y-%m-%d")
            .map_err(|_| malformed("date", &record.event_date))?;
        let time =
            parse_time_of_day(&record.event_time).ok_or_else(|| malformed("time", &record.event_time))?;
        let kind = EventKind::from_str(record.event_kind.trim())
            .map_err(|_| malformed("event kind", &record.event_kind))?;

        Ok(Self {
            id: record.id,
            employee_id: record.employee_id,
            employee_name: record.employee_name.clone(),
            date,
            time,
            kind,
            timestamp,
        })
    }
}

/// Daily clock-in deadline used for lateness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ScheduleSetting {
    #[serde(deserialize_with = "deadline_from_str")]
    #[schema(value_type = String, example = "09:00")]
    pub clock_in_deadline: NaiveTime,
}

fn deadline_from_str<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_time_of_day(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid clock-in deadline {raw:?}")))
}

impl ScheduleSetting {
    pub fn new(clock_in_deadline: NaiveTime) -> Self {
        Self { clock_in_deadline }
    }

    pub fn parse(deadline: &str) -> Option<Self> {
        parse_time_of_day(deadline).map(Self::new)
    }

    /// Whole minutes late, rounded; zero when on time or early.
    pub fn late_minutes(&self, event: &AttendanceEvent) -> i64 {
        let deadline = at_local(*event.timestamp.offset(), event.date, self.clock_in_deadline);
        let late_ms = (event.timestamp - deadline).num_milliseconds();
        if late_ms > 0 {
            (late_ms as f64 / 60_000.0).round() as i64
        } else {
            0
        }
    }
}

fn at_local(offset: FixedOffset, date: NaiveDate, time: NaiveTime) -> DateTime<FixedOffset> {
    let utc = date.and_time(time) - Duration::seconds(offset.local_minus_utc().into());
    offset.from_utc_datetime(&utc)
}

/// Wall-clock `date time` in `zone`. Ambiguous times pick the earliest or
/// latest instant; times skipped by a transition use the offset after it.
fn zoned<Tz: TimeZone>(
    zone: &Tz,
    date: NaiveDate,
    time: NaiveTime,
    earliest: bool,
) -> DateTime<FixedOffset> {
    let local = date.and_time(time);
    let resolved = zone.from_local_datetime(&local);
    let picked = if earliest {
        resolved.earliest()
    } else {
        resolved.latest()
    };
    match picked {
        Some(instant) => instant.fixed_offset(),
        None => at_local(zone.offset_from_utc_datetime(&local).fix(), date, time),
    }
}

/// Inclusive range of whole calendar days.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateRange {
    from: DateTime<FixedOffset>,
    to: DateTime<FixedOffset>,
}

impl DateRange {
    /// `from` snaps to the start of its day, `to` to 23:59:59.999 of its day.
    pub fn new(from: DateTime<FixedOffset>, to: DateTime<FixedOffset>) -> Self {
        let start = NaiveTime::MIN;
        let end = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
        Self {
            from: at_local(*from.offset(), from.date_naive(), start),
            to: at_local(*to.offset(), to.date_naive(), end),
        }
    }

    /// Whole days `from..=to` in `zone`, each bound taking the offset in
    /// force on its own date.
    pub fn calendar_days<Tz: TimeZone>(from: NaiveDate, to: NaiveDate, zone: &Tz) -> Self {
        let end = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
        Self::new(
            zoned(zone, from, NaiveTime::MIN, true),
            zoned(zone, to, end, false),
        )
    }

    pub fn from(&self) -> DateTime<FixedOffset> {
        self.from
    }

    pub fn to(&self) -> DateTime<FixedOffset> {
        self.to
    }

    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }

    pub fn contains(&self, instant: &DateTime<FixedOffset>) -> bool {
        self.from <= *instant && *instant <= self.to
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DailySummary {
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = "John Doe")]
    pub employee_name: String,
    #[schema(value_type = String, format = "date", example = "2024-07-22")]
    pub date: NaiveDate,
    #[schema(value_type = Option<String>, example = "09:01:15")]
    pub first_clock_in: Option<NaiveTime>,
    #[schema(value_type = Option<String>, example = "17:35:10")]
    pub last_clock_out: Option<NaiveTime>,
    #[schema(example = 1)]
    pub late_minutes: Option<i64>,
}

/// Summarize raw records into daily rows, newest day first.
///
/// Every record is parsed before anything else happens; the first malformed
/// one aborts the whole summary.
pub fn summarize(
    records: &[AttendanceRecord],
    range: Option<&DateRange>,
    schedule: Option<&ScheduleSetting>,
) -> Result<Vec<DailySummary>, SummaryError> {
    let events = records
        .iter()
        .map(AttendanceEvent::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(summarize_events(events, range, schedule))
}

pub fn summarize_events(
    mut events: Vec<AttendanceEvent>,
    range: Option<&DateRange>,
    schedule: Option<&ScheduleSetting>,
) -> Vec<DailySummary> {
    if let Some(range) = range {
        if range.is_empty() {
            return Vec::new();
        }
        events.retain(|e| range.contains(&e.timestamp));
    }
    // Stable: equal timestamps keep their log order.
    events.sort_by_key(|e| e.timestamp);

    let mut days: BTreeMap<(u64, NaiveDate), DailySummary> = BTreeMap::new();

    for event in &events {
        let summary = days
            .entry((event.employee_id, event.date))
            .or_insert_with(|| DailySummary {
                employee_id: event.employee_id,
                employee_name: event.employee_name.clone(),
                date: event.date,
                first_clock_in: None,
                last_clock_out: None,
                late_minutes: None,
            });

        match event.kind {
            EventKind::ClockIn => {
                if summary.first_clock_in.is_none() {
                    summary.first_clock_in = Some(event.time);
                    summary.late_minutes = schedule.map(|s| s.late_minutes(event));
                }
            }
            EventKind::ClockOut => summary.last_clock_out = Some(event.time),
        }
    }

    let mut summaries: Vec<DailySummary> = days.into_values().collect();
    summaries.sort_by(|a, b| b.date.cmp(&a.date).then(a.employee_id.cmp(&b.employee_id)));
    summaries
}

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[derive(EnumString, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    ClockIn,
    ClockOut,
}

/// One row of the append-only `attendance_events` log.
///
/// Date, time and timestamp are kept as text exactly as written; they are
/// only trusted after `AttendanceEvent::try_from` has parsed them.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceRecord {
    pub id: u64,
    pub employee_id: u64,
    pub employee_name: String,
    #[schema(example = "2024-07-22")]
    pub event_date: String,
    #[schema(example = "09:01:15")]
    pub event_time: String,
    #[schema(example = "clock_in")]
    pub event_kind: String,
    #[schema(example = "2024-07-22T09:01:15+06:00")]
    pub recorded_at: String,
}

use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use crate::engine::{geofence::GeofenceCandidate, summary::ScheduleSetting};

/// The single row of `app_settings`.
#[derive(Debug, sqlx::FromRow)]
pub struct SettingsRow {
    pub geo_latitude: Option<f64>,
    pub geo_longitude: Option<f64>,
    pub geo_radius_meters: Option<f64>,
    pub geo_name: Option<String>,
    pub clock_in_deadline: Option<String>,
    pub announcement: Option<String>,
}

/// Organisation-wide configuration: office geofence, schedule, announcement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GlobalSettings {
    #[serde(default)]
    #[schema(nullable = true)]
    pub geofence: Option<GeofenceCandidate>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub schedule: Option<ScheduleSetting>,
    #[serde(default)]
    #[schema(nullable = true, example = "Office closed on Friday")]
    pub announcement: Option<String>,
}

impl From<SettingsRow> for GlobalSettings {
    fn from(row: SettingsRow) -> Self {
        let schedule = row.clock_in_deadline.as_deref().and_then(|raw| {
            let parsed = ScheduleSetting::parse(raw);
            if parsed.is_none() {
                warn!(deadline = raw, "Ignoring unparsable clock-in deadline");
            }
            parsed
        });

        Self {
            geofence: GeofenceCandidate::from_columns(
                row.geo_latitude,
                row.geo_longitude,
                row.geo_radius_meters,
                row.geo_name,
            ),
            schedule,
            announcement: row.announcement.filter(|a| !a.trim().is_empty()),
        }
    }
}

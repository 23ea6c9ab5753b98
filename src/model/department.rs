use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::engine::geofence::GeofenceCandidate;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct DepartmentRow {
    pub id: u64,
    pub name: String,
    pub geo_latitude: Option<f64>,
    pub geo_longitude: Option<f64>,
    pub geo_radius_meters: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Department {
    #[schema(example = 10)]
    pub id: u64,
    #[schema(example = "Engineering")]
    pub name: String,
    #[schema(nullable = true)]
    pub geofence: Option<GeofenceCandidate>,
}

impl From<DepartmentRow> for Department {
    fn from(row: DepartmentRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            geofence: GeofenceCandidate::from_columns(
                row.geo_latitude,
                row.geo_longitude,
                row.geo_radius_meters,
                None,
            ),
        }
    }
}

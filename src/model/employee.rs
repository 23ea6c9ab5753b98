use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::engine::geofence::GeofenceCandidate;

#[derive(Debug, Deserialize, sqlx::FromRow)]
pub struct EmployeeRow {
    pub id: u64,
    pub employee_code: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub department_id: Option<u64>,
    pub department_name: Option<String>,
    pub hire_date: NaiveDate,
    pub status: String,
    pub geo_latitude: Option<f64>,
    pub geo_longitude: Option<f64>,
    pub geo_radius_meters: Option<f64>,
}

/// Columns selected for `EmployeeRow`; callers append their own WHERE.
pub const EMPLOYEE_SELECT: &str = r#"
    SELECT
        e.id, e.employee_code, e.first_name, e.last_name, e.email, e.phone,
        e.department_id, d.name AS department_name, e.hire_date, e.status,
        e.geo_latitude, e.geo_longitude, e.geo_radius_meters
    FROM employees e
    LEFT JOIN departments d ON d.id = e.department_id
"#;

#[derive(Debug, Serialize, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "employee_code": "EMP-001",
        "first_name": "John",
        "last_name": "Doe",
        "email": "john.doe@company.com",
        "phone": "+8801712345678",
        "department_id": 10,
        "department_name": "Engineering",
        "hire_date": "2024-01-01",
        "status": "active",
        "geofence_override": null
    })
)]
pub struct Employee {
    pub id: u64,
    pub employee_code: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[schema(nullable = true)]
    pub phone: Option<String>,
    #[schema(nullable = true)]
    pub department_id: Option<u64>,
    #[schema(nullable = true)]
    pub department_name: Option<String>,
    #[schema(value_type = String, format = "date")]
    pub hire_date: NaiveDate,
    pub status: String,
    /// Per-user clock-in location, overriding department and global ones.
    #[schema(nullable = true)]
    pub geofence_override: Option<GeofenceCandidate>,
}

impl From<EmployeeRow> for Employee {
    fn from(row: EmployeeRow) -> Self {
        Self {
            geofence_override: GeofenceCandidate::from_columns(
                row.geo_latitude,
                row.geo_longitude,
                row.geo_radius_meters,
                None,
            ),
            id: row.id,
            employee_code: row.employee_code,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            department_id: row.department_id,
            department_name: row.department_name,
            hire_date: row.hire_date,
            status: row.status,
        }
    }
}

use crate::api::attendance::{PositionRequest, SummaryResponse};
use crate::api::department::CreateDepartment;
use crate::api::employee::{CreateEmployee, EmployeeAccount, EmployeeListResponse};
use crate::api::leave_request::{CreateLeave, LeaveListResponse};
use crate::engine::geo::GeoPoint;
use crate::engine::geofence::{GeofenceCandidate, GeofenceSetting, GeofenceSource};
use crate::engine::summary::{DailySummary, ScheduleSetting};
use crate::model::department::Department;
use crate::model::employee::Employee;
use crate::model::leave_request::{LeaveRequest, LeaveStatus, LeaveType};
use crate::model::settings::GlobalSettings;
use crate::models::LoginReqDto;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Geo Attendance API",
        version = "0.1.0",
        description = r#"
## Location-gated employee attendance

- **Attendance**: clock in and out from inside an authorised radius, and
  daily summaries (first clock-in, last clock-out, minutes late)
- **Geofences**: per-employee override, per-department, or a global office
- **Employees, departments, leave requests, global settings**

Geofence precedence is user override → department → global. With none
configured, clocking is unrestricted.

Most endpoints need a **JWT Bearer** access token from `/auth/login`.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::attendance::eligibility,
        crate::api::attendance::clock_in,
        crate::api::attendance::clock_out,
        crate::api::attendance::summary,

        crate::api::employee::create_employee,
        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::set_employee_geofence,

        crate::api::department::list_departments,
        crate::api::department::create_department,
        crate::api::department::set_department_geofence,

        crate::api::settings::get_settings,
        crate::api::settings::update_settings,

        crate::api::leave_request::leave_list,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::create_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave
    ),
    components(
        schemas(
            LoginReqDto,
            PositionRequest,
            SummaryResponse,
            DailySummary,
            ScheduleSetting,
            GeoPoint,
            GeofenceCandidate,
            GeofenceSetting,
            GeofenceSource,
            GlobalSettings,
            CreateEmployee,
            EmployeeAccount,
            Employee,
            EmployeeListResponse,
            CreateDepartment,
            Department,
            CreateLeave,
            LeaveRequest,
            LeaveListResponse,
            LeaveStatus,
            LeaveType
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login and token rotation"),
        (name = "Attendance", description = "Clock in/out and daily summaries"),
        (name = "Employee", description = "Employee management"),
        (name = "Department", description = "Departments and their geofences"),
        (name = "Settings", description = "Global office geofence, schedule and announcement"),
        (name = "Leave", description = "Leave management"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_attendance_routes_and_bearer_auth() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json["paths"]["/api/attendance/summary"].is_object());
        assert!(json["paths"]["/api/attendance/clock-in"].is_object());
        assert!(json["components"]["securitySchemes"]["bearer_auth"].is_object());
    }
}

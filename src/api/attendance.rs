use crate::auth::auth::AuthUser;
use crate::engine::geo::GeoPoint;
use crate::engine::geofence::{Eligibility, GeofenceCandidate, resolve_geofence};
use crate::engine::summary::{DailySummary, DateRange, ScheduleSetting, summarize};
use crate::error::ApiError;
use crate::model::attendance::{AttendanceRecord, EventKind};
use crate::utils::settings_cache::SettingsStore;
use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, Days, FixedOffset, Local, NaiveDate, SecondsFormat};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

/// Device position sent with clock actions. Both or neither.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PositionRequest {
    #[schema(example = 23.8103, nullable = true)]
    pub latitude: Option<f64>,
    #[schema(example = 90.4125, nullable = true)]
    pub longitude: Option<f64>,
}

impl PositionRequest {
    /// Parse a raw request body. Empty means no position was sent; anything
    /// else must be a valid `PositionRequest`.
    fn from_body(body: &[u8]) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| ApiError::bad_request(format!("Invalid position payload: {e}")))
    }

    fn position(&self) -> Result<Option<GeoPoint>, ApiError> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => GeoPoint::new(lat, lon)
                .map(Some)
                .map_err(|e| ApiError::bad_request(e.to_string())),
            (None, None) => Ok(None),
            _ => Err(ApiError::bad_request(
                "latitude and longitude must be sent together",
            )),
        }
    }
}

/// What the resolver needs to know about one employee.
#[derive(Debug, sqlx::FromRow)]
struct GeoContextRow {
    first_name: String,
    last_name: String,
    geo_latitude: Option<f64>,
    geo_longitude: Option<f64>,
    geo_radius_meters: Option<f64>,
    department_name: Option<String>,
    dept_latitude: Option<f64>,
    dept_longitude: Option<f64>,
    dept_radius_meters: Option<f64>,
}

struct GeoContext {
    employee_name: String,
    user_override: Option<GeofenceCandidate>,
    department_name: Option<String>,
    department_geofence: Option<GeofenceCandidate>,
}

impl From<GeoContextRow> for GeoContext {
    fn from(row: GeoContextRow) -> Self {
        Self {
            employee_name: format!("{} {}", row.first_name, row.last_name)
                .trim()
                .to_string(),
            user_override: GeofenceCandidate::from_columns(
                row.geo_latitude,
                row.geo_longitude,
                row.geo_radius_meters,
                None,
            ),
            department_name: row.department_name,
            department_geofence: GeofenceCandidate::from_columns(
                row.dept_latitude,
                row.dept_longitude,
                row.dept_radius_meters,
                None,
            ),
        }
    }
}

async fn load_geo_context(pool: &MySqlPool, employee_id: u64) -> Result<GeoContext, ApiError> {
    let row = sqlx::query_as::<_, GeoContextRow>(
        r#"
        SELECT
            e.first_name, e.last_name,
            e.geo_latitude, e.geo_longitude, e.geo_radius_meters,
            d.name AS department_name,
            d.geo_latitude AS dept_latitude,
            d.geo_longitude AS dept_longitude,
            d.geo_radius_meters AS dept_radius_meters
        FROM employees e
        LEFT JOIN departments d ON d.id = e.department_id
        WHERE e.id = ?
        "#,
    )
    .bind(employee_id)
    .fetch_optional(pool)
    .await?;

    row.map(GeoContext::from)
        .ok_or_else(|| ApiError::not_found("Employee not found"))
}

/// Fetch everything, then hand it to the resolver.
async fn evaluate_eligibility(
    pool: &MySqlPool,
    settings: &SettingsStore,
    employee_id: u64,
    position: Option<&GeoPoint>,
) -> Result<(GeoContext, Eligibility), ApiError> {
    let ctx = load_geo_context(pool, employee_id).await?;
    let global = settings.current().await?.geofence;

    let geofence = resolve_geofence(
        ctx.user_override.as_ref(),
        ctx.department_name.as_deref(),
        |_| ctx.department_geofence.clone(),
        || global.clone(),
    );

    let eligibility = Eligibility::evaluate(geofence, position);
    Ok((ctx, eligibility))
}

fn refusal(eligibility: &Eligibility) -> Option<HttpResponse> {
    match eligibility {
        Eligibility::PositionRequired { geofence } => {
            Some(HttpResponse::BadRequest().json(json!({
                "message": "Location is required to clock in or out here",
                "geofence": geofence,
            })))
        }
        Eligibility::OutOfRange {
            geofence,
            distance_meters,
        } => Some(HttpResponse::Forbidden().json(json!({
            "message": format!(
                "You are {:.0} m from {}, outside the allowed {:.0} m",
                distance_meters, geofence.label, geofence.radius_meters
            ),
            "distance_meters": distance_meters,
            "geofence": geofence,
        }))),
        Eligibility::Unrestricted | Eligibility::InRange { .. } => None,
    }
}

async fn append_event(
    pool: &MySqlPool,
    employee_id: u64,
    employee_name: &str,
    kind: EventKind,
    at: DateTime<FixedOffset>,
) -> Result<u64, ApiError> {
    let result = sqlx::query(
        r#"
        INSERT INTO attendance_events
            (employee_id, employee_name, event_date, event_time, event_kind, recorded_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(employee_name)
    .bind(at.format("%Y-%m-%d").to_string())
    .bind(at.format("%H:%M:%S").to_string())
    .bind(kind.as_ref())
    .bind(at.to_rfc3339_opts(SecondsFormat::Millis, false))
    .execute(pool)
    .await?;

    Ok(result.last_insert_id())
}

async fn clock(
    auth: AuthUser,
    pool: &MySqlPool,
    settings: &SettingsStore,
    body: &[u8],
    kind: EventKind,
) -> actix_web::Result<HttpResponse> {
    let employee_id = auth.require_employee_id()?;
    let position = PositionRequest::from_body(body)?.position()?;

    let (ctx, eligibility) =
        evaluate_eligibility(pool, settings, employee_id, position.as_ref()).await?;

    if !eligibility.may_clock() {
        warn!(employee_id, event = %kind, ?eligibility, "Clock action refused by geofence");
        return Ok(refusal(&eligibility).unwrap_or_else(|| HttpResponse::Forbidden().finish()));
    }

    let now: DateTime<FixedOffset> = Local::now().into();
    let id = append_event(pool, employee_id, &ctx.employee_name, kind, now).await?;

    info!(employee_id, event = %kind, event_id = id, "Attendance event recorded");

    Ok(HttpResponse::Ok().json(json!({
        "message": match kind {
            EventKind::ClockIn => "Clocked in successfully",
            EventKind::ClockOut => "Clocked out successfully",
        },
        "event_id": id,
        "recorded_at": now.to_rfc3339_opts(SecondsFormat::Secs, false),
        "eligibility": eligibility,
    })))
}

/// Check whether the caller may clock in from a position
#[utoipa::path(
    post,
    path = "/api/attendance/eligibility",
    request_body = PositionRequest,
    responses(
        (status = 200, description = "Resolved geofence and distance", body = Object, example = json!({
            "status": "in_range",
            "geofence": {
                "origin": {"latitude": 23.8103, "longitude": 90.4125},
                "radius_meters": 150.0,
                "label": "Engineering",
                "source": "department"
            },
            "distance_meters": 42.7
        })),
        (status = 400, description = "Invalid coordinates"),
        (status = 403, description = "No employee profile"),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn eligibility(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    settings: web::Data<SettingsStore>,
    body: web::Bytes,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee_id()?;
    let position = PositionRequest::from_body(&body)?.position()?;

    let (_, eligibility) =
        evaluate_eligibility(pool.get_ref(), settings.get_ref(), employee_id, position.as_ref())
            .await?;

    Ok(HttpResponse::Ok().json(eligibility))
}

/// Clock in
#[utoipa::path(
    post,
    path = "/api/attendance/clock-in",
    request_body = PositionRequest,
    responses(
        (status = 200, description = "Clocked in", body = Object, example = json!({
            "message": "Clocked in successfully", "event_id": 12
        })),
        (status = 400, description = "Location missing or invalid"),
        (status = 403, description = "Outside the allowed area, or no employee profile"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
#[instrument(skip_all, fields(user_id = auth.user_id))]
pub async fn clock_in(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    settings: web::Data<SettingsStore>,
    body: web::Bytes,
) -> actix_web::Result<impl Responder> {
    clock(
        auth,
        pool.get_ref(),
        settings.get_ref(),
        &body,
        EventKind::ClockIn,
    )
    .await
}

/// Clock out
#[utoipa::path(
    post,
    path = "/api/attendance/clock-out",
    request_body = PositionRequest,
    responses(
        (status = 200, description = "Clocked out", body = Object, example = json!({
            "message": "Clocked out successfully", "event_id": 13
        })),
        (status = 400, description = "Location missing or invalid"),
        (status = 403, description = "Outside the allowed area, or no employee profile"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
#[instrument(skip_all, fields(user_id = auth.user_id))]
pub async fn clock_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    settings: web::Data<SettingsStore>,
    body: web::Bytes,
) -> actix_web::Result<impl Responder> {
    clock(
        auth,
        pool.get_ref(),
        settings.get_ref(),
        &body,
        EventKind::ClockOut,
    )
    .await
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SummaryQuery {
    /// Employee to report on; managers only. Omit for everyone (managers) or yourself.
    pub employee_id: Option<u64>,
    /// First day, inclusive (YYYY-MM-DD)
    #[param(value_type = Option<String>)]
    pub from: Option<NaiveDate>,
    /// Last day, inclusive (YYYY-MM-DD)
    #[param(value_type = Option<String>)]
    pub to: Option<NaiveDate>,
}

#[derive(Serialize, ToSchema)]
pub struct SummaryResponse {
    pub data: Vec<DailySummary>,
    #[schema(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
    #[schema(nullable = true)]
    pub schedule: Option<ScheduleSetting>,
}

fn summary_range(query: &SummaryQuery) -> Result<Option<DateRange>, ApiError> {
    match (query.from, query.to) {
        (None, None) => Ok(None),
        (Some(from), Some(to)) if from > to => {
            Err(ApiError::bad_request("from cannot be after to"))
        }
        (Some(from), Some(to)) => Ok(Some(DateRange::calendar_days(from, to, &Local))),
        _ => Err(ApiError::bad_request("from and to must be given together")),
    }
}

async fn fetch_records(
    pool: &MySqlPool,
    employee_id: Option<u64>,
    days: Option<(NaiveDate, NaiveDate)>,
) -> Result<Vec<AttendanceRecord>, sqlx::Error> {
    let mut sql = String::from(
        r#"
        SELECT id, employee_id, employee_name, event_date, event_time, event_kind, recorded_at
        FROM attendance_events
        WHERE 1=1
        "#,
    );
    if employee_id.is_some() {
        sql.push_str(" AND employee_id = ?");
    }
    if days.is_some() {
        sql.push_str(" AND event_date BETWEEN ? AND ?");
    }
    sql.push_str(" ORDER BY id");

    let mut query = sqlx::query_as::<_, AttendanceRecord>(&sql);
    if let Some(id) = employee_id {
        query = query.bind(id);
    }
    // A day of slack on each side; the summarizer applies the exact
    // instant range.
    if let Some((from, to)) = days {
        let lo = from.checked_sub_days(Days::new(1)).unwrap_or(from);
        let hi = to.checked_add_days(Days::new(1)).unwrap_or(to);
        query = query
            .bind(lo.format("%Y-%m-%d").to_string())
            .bind(hi.format("%Y-%m-%d").to_string());
    }

    query.fetch(pool).try_collect().await
}

/// Daily attendance summaries, newest day first
#[utoipa::path(
    get,
    path = "/api/attendance/summary",
    params(SummaryQuery),
    responses(
        (status = 200, description = "One row per employee per day", body = SummaryResponse),
        (status = 400, description = "Invalid date range"),
        (status = 403, description = "Employees may only view their own records"),
        (status = 500, description = "Attendance log failed integrity check", body = Object, example = json!({
            "message": "attendance record 42 has malformed timestamp: \"??\""
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn summary(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    settings: web::Data<SettingsStore>,
    query: web::Query<SummaryQuery>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.scope_employee(query.employee_id)?;
    let range = summary_range(&query)?;
    let schedule = settings
        .current()
        .await
        .map_err(ApiError::from)?
        .schedule;

    let days = query.from.zip(query.to);
    let records = fetch_records(pool.get_ref(), employee_id, days)
        .await
        .map_err(ApiError::from)?;

    let data = summarize(&records, range.as_ref(), schedule.as_ref()).map_err(ApiError::from)?;

    Ok(HttpResponse::Ok().json(SummaryResponse {
        data,
        from: query.from,
        to: query.to,
        schedule,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_needs_both_coordinates() {
        let both = PositionRequest {
            latitude: Some(1.0),
            longitude: Some(2.0),
        };
        assert!(both.position().unwrap().is_some());
        assert!(PositionRequest::default().position().unwrap().is_none());

        let half = PositionRequest {
            latitude: Some(1.0),
            longitude: None,
        };
        assert!(matches!(half.position(), Err(ApiError::BadRequest(_))));

        let bad = PositionRequest {
            latitude: Some(95.0),
            longitude: Some(2.0),
        };
        assert!(bad.position().is_err());
    }

    #[test]
    fn body_is_empty_or_a_valid_position() {
        assert_eq!(PositionRequest::from_body(b"").unwrap().latitude, None);
        assert_eq!(PositionRequest::from_body(b"  \n").unwrap().longitude, None);

        let sent = PositionRequest::from_body(br#"{"latitude": 23.8, "longitude": 90.4}"#).unwrap();
        assert!(sent.position().unwrap().is_some());

        assert!(matches!(
            PositionRequest::from_body(b"{not json"),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            PositionRequest::from_body(br#"{"latitude": "north", "longitude": 90.4}"#),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            PositionRequest::from_body(b"[1, 2]"),
            Err(ApiError::BadRequest(_))
        ));
    }

    fn query(from: Option<&str>, to: Option<&str>) -> SummaryQuery {
        SummaryQuery {
            employee_id: None,
            from: from.map(|d| d.parse().unwrap()),
            to: to.map(|d| d.parse().unwrap()),
        }
    }

    #[test]
    fn summary_range_validation() {
        assert!(summary_range(&query(None, None)).unwrap().is_none());
        assert!(summary_range(&query(Some("2024-07-01"), Some("2024-07-31"))).unwrap().is_some());
        assert!(summary_range(&query(Some("2024-07-31"), Some("2024-07-01"))).is_err());
        assert!(summary_range(&query(Some("2024-07-01"), None)).is_err());
    }

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    // Only test in this crate that reads the local zone.
    #[test]
    fn summary_range_uses_the_offset_of_each_requested_day() {
        unsafe { std::env::set_var("TZ", "Europe/Berlin") };

        let winter = summary_range(&query(Some("2024-01-10"), Some("2024-01-10")))
            .unwrap()
            .unwrap();
        assert_eq!(winter.from(), ts("2024-01-10T00:00:00.000+01:00"));
        assert_eq!(winter.to(), ts("2024-01-10T23:59:59.999+01:00"));
        assert!(!winter.contains(&ts("2024-01-09T23:30:00+01:00")));
        assert!(winter.contains(&ts("2024-01-10T23:30:00+01:00")));

        // Spans the switch to summer time on 2024-03-31.
        let across = summary_range(&query(Some("2024-03-30"), Some("2024-03-31")))
            .unwrap()
            .unwrap();
        assert_eq!(across.from(), ts("2024-03-30T00:00:00.000+01:00"));
        assert_eq!(across.to(), ts("2024-03-31T23:59:59.999+02:00"));
        assert!(across.contains(&ts("2024-03-31T23:30:00+02:00")));
        assert!(!across.contains(&ts("2024-03-29T23:30:00+01:00")));
    }

    #[test]
    fn refusal_distinguishes_outcomes() {
        let geofence = crate::engine::geofence::GeofenceSetting {
            origin: GeoPoint::new(0.0, 0.0).unwrap(),
            radius_meters: 100.0,
            label: "HQ".into(),
            source: crate::engine::geofence::GeofenceSource::Global,
        };
        assert!(refusal(&Eligibility::Unrestricted).is_none());
        assert_eq!(
            refusal(&Eligibility::PositionRequired {
                geofence: geofence.clone()
            })
            .unwrap()
            .status(),
            actix_web::http::StatusCode::BAD_REQUEST
        );
        assert_eq!(
            refusal(&Eligibility::OutOfRange {
                geofence,
                distance_meters: 250.0
            })
            .unwrap()
            .status(),
            actix_web::http::StatusCode::FORBIDDEN
        );
    }
}

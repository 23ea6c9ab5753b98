use crate::auth::auth::AuthUser;
use crate::engine::geofence::GeofenceCandidate;
use crate::error::ApiError;
use crate::model::department::{Department, DepartmentRow};
use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{info, warn};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CreateDepartment {
    #[schema(example = "Engineering")]
    pub name: String,
    #[schema(nullable = true)]
    pub geofence: Option<GeofenceCandidate>,
}

/// List departments with their clock-in geofence
#[utoipa::path(
    get,
    path = "/api/department",
    responses(
        (status = 200, description = "All departments", body = [Department]),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Department"
)]
pub async fn list_departments(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<impl Responder> {
    let rows = sqlx::query_as::<_, DepartmentRow>(
        r#"
        SELECT id, name, geo_latitude, geo_longitude, geo_radius_meters
        FROM departments
        ORDER BY name
        "#,
    )
    .fetch_all(pool.get_ref())
    .await
    .map_err(ApiError::from)?;

    let data: Vec<Department> = rows.into_iter().map(Department::from).collect();
    Ok(HttpResponse::Ok().json(data))
}

/// Create a department
#[utoipa::path(
    post,
    path = "/api/department",
    request_body = CreateDepartment,
    responses(
        (status = 201, description = "Department created", body = Object, example = json!({
            "message": "Department created", "id": 10
        })),
        (status = 400, description = "Name missing"),
        (status = 409, description = "Department already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Department"
)]
pub async fn create_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateDepartment>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Department name must not be empty").into());
    }

    let geofence = payload.geofence.clone().unwrap_or_default();
    if payload.geofence.is_some() && !geofence.is_valid() {
        warn!(department = name, "Storing incomplete department geofence; it will be ignored");
    }

    let result = sqlx::query(
        r#"
        INSERT INTO departments (name, geo_latitude, geo_longitude, geo_radius_meters)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(geofence.latitude)
    .bind(geofence.longitude)
    .bind(geofence.radius_meters)
    .execute(pool.get_ref())
    .await;

    match result {
        Ok(r) => {
            info!(department = name, id = r.last_insert_id(), "Department created");
            Ok(HttpResponse::Created().json(json!({
                "message": "Department created",
                "id": r.last_insert_id(),
            })))
        }
        Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23000") => {
            Ok(HttpResponse::Conflict().json(json!({
                "message": "Department already exists"
            })))
        }
        Err(e) => Err(ApiError::from(e).into()),
    }
}

/// Set or clear a department's geofence
///
/// Send all fields null (or `{}`) to clear it; the department then falls
/// back to the global office geofence.
#[utoipa::path(
    put,
    path = "/api/department/{department_id}/geofence",
    params(("department_id" = u64, Path, description = "Department ID")),
    request_body = GeofenceCandidate,
    responses(
        (status = 200, description = "Geofence updated"),
        (status = 404, description = "Department not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Department"
)]
pub async fn set_department_geofence(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<GeofenceCandidate>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let department_id = path.into_inner();
    let geofence = payload.into_inner();

    let result = sqlx::query(
        r#"
        UPDATE departments
        SET geo_latitude = ?, geo_longitude = ?, geo_radius_meters = ?
        WHERE id = ?
        "#,
    )
    .bind(geofence.latitude)
    .bind(geofence.longitude)
    .bind(geofence.radius_meters)
    .bind(department_id)
    .execute(pool.get_ref())
    .await
    .map_err(ApiError::from)?;

    if result.rows_affected() == 0 {
        // MySQL reports 0 for unchanged rows too; tell the two apart.
        let exists = sqlx::query_scalar::<_, i64>("SELECT EXISTS(SELECT 1 FROM departments WHERE id = ?)")
            .bind(department_id)
            .fetch_one(pool.get_ref())
            .await
            .map_err(ApiError::from)?;
        if exists == 0 {
            return Err(ApiError::not_found("Department not found").into());
        }
    }

    info!(department_id, valid = geofence.is_valid(), "Department geofence updated");
    Ok(HttpResponse::Ok().json(json!({
        "message": "Geofence updated",
        "active": geofence.is_valid(),
    })))
}

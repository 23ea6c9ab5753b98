use crate::{
    auth::{auth::AuthUser, password::hash_password},
    engine::geofence::GeofenceCandidate,
    error::ApiError,
    model::{
        employee::{EMPLOYEE_SELECT, Employee, EmployeeRow},
        role::Role,
    },
};
use actix_web::{HttpResponse, Responder, error::ErrorInternalServerError, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = "EMP-001")]
    pub employee_code: String,
    #[schema(example = "John")]
    pub first_name: String,
    #[schema(example = "Doe")]
    pub last_name: String,
    #[schema(example = "john@email.com", format = "email")]
    pub email: String,
    #[schema(example = "+8801712345678", nullable = true)]
    pub phone: Option<String>,
    #[schema(example = 1, nullable = true)]
    pub department_id: Option<u64>,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub hire_date: NaiveDate,
    /// Optional login for the new employee; created with the Employee role.
    #[schema(nullable = true)]
    pub account: Option<EmployeeAccount>,
}

#[derive(Deserialize, ToSchema)]
pub struct EmployeeAccount {
    #[schema(example = "jdoe")]
    pub username: String,
    #[schema(example = "change-me")]
    pub password: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmployeeQuery {
    /// Page number, starting at 1
    pub page: Option<u32>,
    /// Items per page (max 100)
    pub per_page: Option<u32>,
    /// Filter by department
    pub department_id: Option<u64>,
    /// Filter by status
    pub status: Option<String>,
    /// Search by name or email
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeListResponse {
    pub data: Vec<Employee>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 10)]
    pub total: i64,
}

/// Create an employee, optionally with a login account
#[utoipa::path(
    post,
    path = "/api/employee",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created", body = Object, example = json!({
            "message": "Employee created", "id": 1000
        })),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "Employee code, email or username already taken"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateEmployee>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    if payload.first_name.trim().is_empty() || payload.email.trim().is_empty() {
        return Err(ApiError::bad_request("first_name and email are required").into());
    }

    let account = match &payload.account {
        Some(acc) if acc.username.trim().is_empty() || acc.password.is_empty() => {
            return Err(ApiError::bad_request("username and password must not be empty").into());
        }
        Some(acc) => {
            let hashed = hash_password(&acc.password).map_err(|e| {
                error!(error = %e, "Failed to hash password");
                ErrorInternalServerError("Internal Server Error")
            })?;
            Some((acc.username.trim().to_lowercase(), hashed))
        }
        None => None,
    };

    let mut tx = pool.begin().await.map_err(ApiError::from)?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO employees
            (employee_code, first_name, last_name, email, phone, department_id, hire_date)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_code.trim())
    .bind(payload.first_name.trim())
    .bind(payload.last_name.trim())
    .bind(payload.email.trim())
    .bind(&payload.phone)
    .bind(payload.department_id)
    .bind(payload.hire_date)
    .execute(&mut *tx)
    .await;

    let employee_id = match inserted {
        Ok(r) => r.last_insert_id(),
        Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23000") => {
            return Ok(HttpResponse::Conflict().json(json!({
                "message": "Employee code or email already exists"
            })));
        }
        Err(e) => return Err(ApiError::from(e).into()),
    };

    if let Some((username, hashed)) = account {
        let created = sqlx::query(
            r#"
            INSERT INTO users (username, password, role_id, employee_id)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&username)
        .bind(&hashed)
        .bind(Role::Employee.id())
        .bind(employee_id)
        .execute(&mut *tx)
        .await;

        match created {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23000") => {
                return Ok(HttpResponse::Conflict().json(json!({
                    "message": "Username already exists"
                })));
            }
            Err(e) => return Err(ApiError::from(e).into()),
        }
    }

    tx.commit().await.map_err(ApiError::from)?;

    info!(employee_id, "Employee created");
    Ok(HttpResponse::Created().json(json!({
        "message": "Employee created",
        "id": employee_id,
    })))
}

/// Paginated employee list
#[utoipa::path(
    get,
    path = "/api/employee",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeeListResponse)
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * per_page;

    let mut conditions: Vec<&str> = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if let Some(department_id) = query.department_id {
        conditions.push("e.department_id = ?");
        bindings.push(department_id.to_string());
    }
    if let Some(status) = &query.status {
        conditions.push("e.status = ?");
        bindings.push(status.clone());
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        conditions.push("(e.first_name LIKE ? OR e.last_name LIKE ? OR e.email LIKE ?)");
        let like = format!("%{}%", search.trim());
        bindings.extend([like.clone(), like.clone(), like]);
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM employees e {}", where_clause);
    debug!(sql = %count_sql, bindings = ?bindings, "Counting employees");

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for b in &bindings {
        count_query = count_query.bind(b);
    }
    let total = count_query
        .fetch_one(pool.get_ref())
        .await
        .map_err(ApiError::from)?;

    let data_sql = format!("{EMPLOYEE_SELECT} {where_clause} ORDER BY e.id DESC LIMIT ? OFFSET ?");
    debug!(page, per_page, offset, "Fetching employees");

    let mut data_query = sqlx::query_as::<_, EmployeeRow>(&data_sql);
    for b in &bindings {
        data_query = data_query.bind(b);
    }
    let rows = data_query
        .bind(per_page as i64)
        .bind(offset as i64)
        .fetch_all(pool.get_ref())
        .await
        .map_err(ApiError::from)?;

    Ok(HttpResponse::Ok().json(EmployeeListResponse {
        data: rows.into_iter().map(Employee::from).collect(),
        page,
        per_page,
        total,
    }))
}

/// Get employee by ID
#[utoipa::path(
    get,
    path = "/api/employee/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 403, description = "Employees may only view their own records"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let employee_id = path.into_inner();
    auth.scope_employee(Some(employee_id))?;

    let row = sqlx::query_as::<_, EmployeeRow>(&format!("{EMPLOYEE_SELECT} WHERE e.id = ?"))
        .bind(employee_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(ApiError::from)?;

    match row {
        Some(row) => Ok(HttpResponse::Ok().json(Employee::from(row))),
        None => Err(ApiError::not_found("Employee not found").into()),
    }
}

/// Set or clear an employee's personal clock-in geofence
///
/// An override beats the department and global geofences. Send all
/// fields null (or `{}`) to remove it.
#[utoipa::path(
    put,
    path = "/api/employee/{employee_id}/geofence",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    request_body = GeofenceCandidate,
    responses(
        (status = 200, description = "Override updated"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn set_employee_geofence(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<GeofenceCandidate>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let employee_id = path.into_inner();
    let geofence = payload.into_inner();

    let result = sqlx::query(
        r#"
        UPDATE employees
        SET geo_latitude = ?, geo_longitude = ?, geo_radius_meters = ?
        WHERE id = ?
        "#,
    )
    .bind(geofence.latitude)
    .bind(geofence.longitude)
    .bind(geofence.radius_meters)
    .bind(employee_id)
    .execute(pool.get_ref())
    .await
    .map_err(ApiError::from)?;

    if result.rows_affected() == 0 {
        let exists = sqlx::query_scalar::<_, i64>("SELECT EXISTS(SELECT 1 FROM employees WHERE id = ?)")
            .bind(employee_id)
            .fetch_one(pool.get_ref())
            .await
            .map_err(ApiError::from)?;
        if exists == 0 {
            return Err(ApiError::not_found("Employee not found").into());
        }
    }

    info!(employee_id, valid = geofence.is_valid(), "Employee geofence override updated");
    Ok(HttpResponse::Ok().json(json!({
        "message": "Geofence override updated",
        "active": geofence.is_valid(),
    })))
}

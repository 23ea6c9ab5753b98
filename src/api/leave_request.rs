use crate::auth::auth::AuthUser;
use crate::error::ApiError;
use crate::model::leave_request::{LeaveRequest, LeaveStatus, LeaveType};
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct CreateLeave {
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-03", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    pub leave_type: LeaveType,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LeaveFilter {
    /// Filter by employee ID (managers only)
    pub employee_id: Option<u64>,
    /// Filter by leave status
    pub status: Option<LeaveStatus>,
    /// Page number, starting at 1
    pub page: Option<u64>,
    /// Items per page (max 100)
    pub per_page: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct LeaveListResponse {
    pub data: Vec<LeaveRequest>,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 10)]
    pub per_page: u64,
    #[schema(example = 1)]
    pub total: i64,
}

const LEAVE_COLUMNS: &str =
    "id, employee_id, start_date, end_date, leave_type, status, created_at";

/// Apply for leave
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body = CreateLeave,
    responses(
        (status = 201, description = "Leave request submitted", body = Object, example = json!({
            "message": "Leave request submitted", "status": "pending", "id": 1
        })),
        (status = 400, description = "Invalid dates or overlapping request"),
        (status = 403, description = "No employee profile")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateLeave>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee_id()?;

    if payload.start_date > payload.end_date {
        return Err(ApiError::bad_request("start_date cannot be after end_date").into());
    }

    let overlapping = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM leave_requests
            WHERE employee_id = ?
            AND status IN ('pending', 'approved')
            AND start_date <= ? AND end_date >= ?
        )
        "#,
    )
    .bind(employee_id)
    .bind(payload.end_date)
    .bind(payload.start_date)
    .fetch_one(pool.get_ref())
    .await
    .map_err(ApiError::from)?;

    if overlapping > 0 {
        return Err(ApiError::bad_request("Overlaps an existing pending or approved leave").into());
    }

    let result = sqlx::query(
        r#"
        INSERT INTO leave_requests (employee_id, start_date, end_date, leave_type, status)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.leave_type.as_ref())
    .bind(LeaveStatus::Pending.as_ref())
    .execute(pool.get_ref())
    .await
    .map_err(ApiError::from)?;

    info!(employee_id, leave_id = result.last_insert_id(), "Leave request submitted");

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Leave request submitted",
        "status": LeaveStatus::Pending,
        "id": result.last_insert_id(),
    })))
}

/// Move a pending request to `decision`; false if not pending or missing.
async fn decide(pool: &MySqlPool, leave_id: u64, decision: LeaveStatus) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE leave_requests SET status = ? WHERE id = ? AND status = ?")
        .bind(decision.as_ref())
        .bind(leave_id)
        .bind(LeaveStatus::Pending.as_ref())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

async fn decide_response(
    auth: AuthUser,
    pool: &MySqlPool,
    leave_id: u64,
    decision: LeaveStatus,
) -> actix_web::Result<HttpResponse> {
    auth.require_hr_or_admin()?;

    if !decide(pool, leave_id, decision).await.map_err(ApiError::from)? {
        return Err(ApiError::bad_request("Leave request not found or already processed").into());
    }

    info!(leave_id, decided_by = auth.user_id, status = %decision, "Leave request decided");
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": format!("Leave {decision}"),
        "status": decision,
    })))
}

/// Approve a pending leave request (HR/Admin)
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/approve",
    params(("leave_id" = u64, Path, description = "ID of the leave request to approve")),
    responses(
        (status = 200, description = "Leave approved"),
        (status = 400, description = "Leave request not found or already processed"),
        (status = 403, description = "HR/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    decide_response(auth, pool.get_ref(), path.into_inner(), LeaveStatus::Approved).await
}

/// Reject a pending leave request (HR/Admin)
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/reject",
    params(("leave_id" = u64, Path, description = "ID of the leave request to reject")),
    responses(
        (status = 200, description = "Leave rejected"),
        (status = 400, description = "Leave request not found or already processed"),
        (status = 403, description = "HR/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    decide_response(auth, pool.get_ref(), path.into_inner(), LeaveStatus::Rejected).await
}

/// Leave request details
#[utoipa::path(
    get,
    path = "/api/leave/{leave_id}",
    params(("leave_id" = u64, Path, description = "ID of the leave request to fetch")),
    responses(
        (status = 200, description = "Leave request found", body = LeaveRequest),
        (status = 403, description = "Not your leave request"),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let leave_id = path.into_inner();

    let leave = sqlx::query_as::<_, LeaveRequest>(&format!(
        "SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE id = ?"
    ))
    .bind(leave_id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(ApiError::from)?
    .ok_or_else(|| ApiError::not_found("Leave request not found"))?;

    auth.scope_employee(Some(leave.employee_id))?;

    Ok(HttpResponse::Ok().json(leave))
}

/// Paginated leave requests; employees see only their own
#[utoipa::path(
    get,
    path = "/api/leave",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Paginated leave list", body = LeaveListResponse),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveFilter>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.scope_employee(query.employee_id)?;

    let per_page = query.per_page.unwrap_or(10).clamp(1, 100);
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * per_page;

    let mut where_sql = String::from(" WHERE 1=1");
    if employee_id.is_some() {
        where_sql.push_str(" AND employee_id = ?");
    }
    if query.status.is_some() {
        where_sql.push_str(" AND status = ?");
    }

    let count_sql = format!("SELECT COUNT(*) FROM leave_requests{where_sql}");
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    let data_sql = format!(
        "SELECT {LEAVE_COLUMNS} FROM leave_requests{where_sql} ORDER BY created_at DESC LIMIT ? OFFSET ?"
    );
    let mut data_q = sqlx::query_as::<_, LeaveRequest>(&data_sql);

    if let Some(id) = employee_id {
        count_q = count_q.bind(id);
        data_q = data_q.bind(id);
    }
    if let Some(status) = query.status {
        count_q = count_q.bind(status.to_string());
        data_q = data_q.bind(status.to_string());
    }

    let total = count_q
        .fetch_one(pool.get_ref())
        .await
        .map_err(ApiError::from)?;
    let data = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await
        .map_err(ApiError::from)?;

    Ok(HttpResponse::Ok().json(LeaveListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

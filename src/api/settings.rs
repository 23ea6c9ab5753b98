use crate::auth::auth::AuthUser;
use crate::error::ApiError;
use crate::model::settings::GlobalSettings;
use crate::utils::settings_cache::SettingsStore;
use actix_web::{HttpResponse, Responder, web};
use serde_json::json;
use tracing::warn;

/// Current global settings
#[utoipa::path(
    get,
    path = "/api/settings",
    responses(
        (status = 200, description = "Office geofence, schedule and announcement", body = GlobalSettings),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn get_settings(
    _auth: AuthUser,
    settings: web::Data<SettingsStore>,
) -> actix_web::Result<impl Responder> {
    let current = settings.current().await.map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(current))
}

/// Replace global settings (Admin)
#[utoipa::path(
    put,
    path = "/api/settings",
    request_body = GlobalSettings,
    responses(
        (status = 200, description = "Settings saved"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn update_settings(
    auth: AuthUser,
    settings: web::Data<SettingsStore>,
    payload: web::Json<GlobalSettings>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let new_settings = payload.into_inner();

    let geofence_active = new_settings
        .geofence
        .as_ref()
        .is_some_and(|g| g.is_valid());
    if new_settings.geofence.is_some() && !geofence_active {
        warn!(geofence = ?new_settings.geofence, "Global geofence is incomplete and will be ignored");
    }

    settings
        .update(&new_settings)
        .await
        .map_err(ApiError::from)?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Settings saved",
        "geofence_active": geofence_active,
    })))
}

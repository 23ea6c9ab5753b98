use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::model::role::Role;
use crate::models::TokenType;
use actix_web::{
    FromRequest, HttpMessage, HttpRequest, dev::Payload, error::ErrorUnauthorized, web::Data,
};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

impl AuthUser {
    /// Decode an access token into a user.
    pub fn from_token(token: &str, secret: &str) -> Result<Self, &'static str> {
        let claims = verify_token(token, secret).map_err(|_| "Invalid or expired token")?;
        if claims.token_type != TokenType::Access {
            return Err("Access token required");
        }
        let role = Role::from_id(claims.role).ok_or("Invalid role")?;

        Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
            employee_id: claims.employee_id,
        })
    }
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // Set by auth_middleware on protected scopes.
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let token = match req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            Some(t) => t,
            None => return ready(Err(ErrorUnauthorized("Missing token"))),
        };

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => {
                return ready(Err(actix_web::error::ErrorInternalServerError(
                    "Config missing",
                )));
            }
        };

        ready(AuthUser::from_token(token, &config.jwt_secret).map_err(ErrorUnauthorized))
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> actix_web::Result<()> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(actix_web::error::ErrorForbidden("Admin only"))
        }
    }

    pub fn require_hr_or_admin(&self) -> actix_web::Result<()> {
        if self.role.is_manager() {
            Ok(())
        } else {
            Err(actix_web::error::ErrorForbidden("HR/Admin only"))
        }
    }

    /// The caller's own employee id, or 403 for accounts without one.
    pub fn require_employee_id(&self) -> actix_web::Result<u64> {
        self.employee_id
            .ok_or_else(|| actix_web::error::ErrorForbidden("No employee profile"))
    }

    /// Which employee's data this caller may read.
    ///
    /// Managers may ask for anyone (or everyone with `None`); everyone else
    /// is pinned to their own record.
    pub fn scope_employee(&self, requested: Option<u64>) -> actix_web::Result<Option<u64>> {
        if self.role.is_manager() {
            return Ok(requested);
        }
        let own = self.require_employee_id()?;
        match requested {
            Some(id) if id != own => Err(actix_web::error::ErrorForbidden(
                "Employees may only view their own records",
            )),
            _ => Ok(Some(own)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, employee_id: Option<u64>) -> AuthUser {
        AuthUser {
            user_id: 1,
            username: "u".into(),
            role,
            employee_id,
        }
    }

    #[test]
    fn managers_see_whatever_they_ask_for() {
        let hr = user(Role::Hr, None);
        assert_eq!(hr.scope_employee(None).unwrap(), None);
        assert_eq!(hr.scope_employee(Some(5)).unwrap(), Some(5));
    }

    #[test]
    fn employees_are_pinned_to_themselves() {
        let e = user(Role::Employee, Some(5));
        assert_eq!(e.scope_employee(None).unwrap(), Some(5));
        assert_eq!(e.scope_employee(Some(5)).unwrap(), Some(5));
        assert!(e.scope_employee(Some(6)).is_err());
        assert!(user(Role::Employee, None).scope_employee(None).is_err());
    }

    #[test]
    fn refresh_tokens_are_not_access_tokens() {
        use crate::auth::jwt::{TokenSubject, generate_refresh_token};
        let subject = TokenSubject {
            user_id: 1,
            username: "u".into(),
            role: 3,
            employee_id: None,
        };
        let (token, _) = generate_refresh_token(&subject, "k", 60).unwrap();
        assert_eq!(AuthUser::from_token(&token, "k").unwrap_err(), "Access token required");
    }
}

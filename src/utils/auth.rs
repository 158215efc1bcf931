use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::user::Role;
use crate::utils::jwt;

/// Caller identity taken from a valid `Authorization: Bearer <token>` header.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin access required".to_string()))
        }
    }

    /// Admins may act on anything; employees only on their own records.
    pub fn require_self_or_admin(&self, owner_id: Uuid) -> Result<(), AppError> {
        if self.is_admin() || self.user_id == owner_id {
            Ok(())
        } else {
            Err(AppError::Forbidden("Not allowed to modify this resource".to_string()))
        }
    }
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|auth| auth.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn authenticate(req: &HttpRequest) -> Result<AuthUser, AppError> {
    let config = req
        .app_data::<web::Data<Config>>()
        .ok_or_else(|| AppError::InternalServerError("Configuration unavailable".to_string()))?;

    let token = bearer_token(req).ok_or_else(|| AppError::Unauthorized("Missing token".to_string()))?;
    let claims = jwt::validate_token(token, &config.jwt_secret)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid user ID in token".to_string()))?;

    Ok(AuthUser {
        user_id,
        role: claims.role,
    })
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn request_with(header: Option<&str>) -> HttpRequest {
        let mut req = TestRequest::default().app_data(web::Data::new(Config::for_tests()));
        if let Some(value) = header {
            req = req.insert_header(("Authorization", value));
        }
        req.to_http_request()
    }

    #[test]
    fn missing_header_is_unauthorized() {
        match authenticate(&request_with(None)) {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, "Missing token"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn non_bearer_scheme_is_treated_as_missing() {
        assert_matches::assert_matches!(
            authenticate(&request_with(Some("Basic abc"))),
            Err(AppError::Unauthorized(_))
        );
    }

    #[test]
    fn valid_token_yields_identity() {
        let user_id = Uuid::new_v4();
        let token = jwt::generate_token(user_id, Role::Employee, "test-secret", 1).unwrap();
        let user = authenticate(&request_with(Some(&format!("Bearer {}", token)))).unwrap();
        assert_eq!(user.user_id, user_id);
        assert!(!user.is_admin());
        assert!(user.require_self_or_admin(user_id).is_ok());
        assert_matches::assert_matches!(
            user.require_self_or_admin(Uuid::new_v4()),
            Err(AppError::Forbidden(_))
        );
        assert_matches::assert_matches!(user.require_admin(), Err(AppError::Forbidden(_)));
    }
}

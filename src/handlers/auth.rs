use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::user::{Employee, Role, User, EMPLOYEE_SELECT};
use crate::utils::auth::AuthUser;
use crate::utils::validation::validate_payload;
use crate::utils::{jwt, password};

#[derive(Deserialize, Validate)]
pub struct AuthRequest {
    #[validate(email)]
    email: String,
    #[validate(length(min = 8, max = 64))]
    password: String,
    #[validate(custom = "validate_action")]
    action: String,
    #[validate(length(min = 2, max = 64))]
    name: Option<String>,
}

#[derive(Serialize)]
pub struct AuthResponse {
    email: String,
    token: String,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    current_password: String,
    #[validate(length(min = 8, max = 64))]
    new_password: String,
}

fn validate_action(action: &str) -> Result<(), validator::ValidationError> {
    let action = action.to_lowercase();
    if action != "create" && action != "login" {
        return Err(validator::ValidationError::new("Invalid action"));
    }
    Ok(())
}

/// Decides whether `create` may register another admin. Anonymous callers
/// may only bootstrap the first account; after that an admin token is
/// required.
fn check_registration(caller: Option<&AuthUser>, existing_users: i64) -> Result<(), AppError> {
    match caller {
        Some(user) => user.require_admin(),
        None if existing_users == 0 => Ok(()),
        None => Err(AppError::Forbidden(
            "Registration is closed; an admin must create new accounts".to_string(),
        )),
    }
}

/// `create` registers an admin account; `login` issues a token.
pub async fn auth_handler(
    caller: Option<AuthUser>,
    req: web::Json<AuthRequest>,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    validate_payload(&req.0)?;

    match req.action.to_lowercase().as_str() {
        "create" => {
            if let Some(caller) = &caller {
                caller.require_admin()?;
            }

            let mut tx = pool.begin().await?;
            // Serialises concurrent bootstrap attempts on an empty table.
            sqlx::query("LOCK TABLE users IN SHARE ROW EXCLUSIVE MODE")
                .execute(&mut *tx)
                .await?;
            let existing_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
                .fetch_one(&mut *tx)
                .await?;
            check_registration(caller.as_ref(), existing_users)?;

            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1))",
            )
            .bind(&req.email)
            .fetch_one(&mut *tx)
            .await?;
            if exists {
                return Err(AppError::Conflict("Email already exists".to_string()));
            }

            let password_hash = password::hash_password(&req.password)?;
            let user_id = Uuid::new_v4();
            let now = Utc::now();
            let name = req
                .name
                .clone()
                .unwrap_or_else(|| req.email.split('@').next().unwrap_or_default().to_string());

            sqlx::query(
                "INSERT INTO users (user_id, email, password, name, role, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(user_id)
            .bind(&req.email)
            .bind(&password_hash)
            .bind(&name)
            .bind(Role::Admin.as_str())
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            log::info!("Registered admin account {}", user_id);
            let token = jwt::generate_token(user_id, Role::Admin, &config.jwt_secret, config.token_ttl_days)?;

            Ok(HttpResponse::Created().json(AuthResponse {
                email: req.email.clone(),
                token,
            }))
        }
        "login" => {
            let user = sqlx::query_as::<_, User>(
                "SELECT user_id, email, password, role FROM users WHERE LOWER(email) = LOWER($1)",
            )
            .bind(&req.email)
            .fetch_optional(&**pool)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

            password::verify_password(&req.password, &user.password)?;
            let token = jwt::generate_token(user.user_id, user.role, &config.jwt_secret, config.token_ttl_days)?;

            Ok(HttpResponse::Ok().json(AuthResponse {
                email: user.email,
                token,
            }))
        }
        _ => Err(AppError::BadRequest("Invalid action".to_string())),
    }
}

pub async fn get_current_user(
    auth: AuthUser,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let sql = format!("{} WHERE u.user_id = $1", EMPLOYEE_SELECT);
    let user = sqlx::query_as::<_, Employee>(&sql)
        .bind(auth.user_id)
        .fetch_optional(&**pool)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found or unauthorized".to_string()))?;

    Ok(HttpResponse::Ok().json(user))
}

pub async fn reset_password(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    body: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, AppError> {
    validate_payload(&*body)?;

    let stored_hash: Option<String> = sqlx::query_scalar("SELECT password FROM users WHERE user_id = $1")
        .bind(auth.user_id)
        .fetch_optional(&**pool)
        .await?;
    let stored_hash =
        stored_hash.ok_or_else(|| AppError::Unauthorized("User not found or unauthorized".to_string()))?;

    password::verify_password(&body.current_password, &stored_hash)?;
    let new_hash = password::hash_password(&body.new_password)?;

    sqlx::query("UPDATE users SET password = $1, updated_at = $2 WHERE user_id = $3")
        .bind(&new_hash)
        .bind(Utc::now())
        .bind(auth.user_id)
        .execute(&**pool)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Password updated successfully",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn caller(role: Role) -> AuthUser {
        AuthUser { user_id: Uuid::new_v4(), role }
    }

    #[test]
    fn first_account_may_register_anonymously() {
        assert!(check_registration(None, 0).is_ok());
    }

    #[test]
    fn anonymous_registration_closes_after_bootstrap() {
        assert_matches!(check_registration(None, 1), Err(AppError::Forbidden(_)));
        assert_matches!(check_registration(None, 42), Err(AppError::Forbidden(_)));
    }

    #[test]
    fn only_admins_register_further_accounts() {
        assert!(check_registration(Some(&caller(Role::Admin)), 5).is_ok());
        assert_matches!(
            check_registration(Some(&caller(Role::Employee)), 5),
            Err(AppError::Forbidden(_))
        );
    }
}

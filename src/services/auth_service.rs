use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    dto::auth::{Claims, LoginRequest, LoginResponse, RegisterRequest},
    entity::users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    error::{AppError, AppResult, is_unique_violation},
    models::User,
    response::{ApiResponse, Meta},
    services::user_service::user_from_entity,
    state::AppState,
};

const MAX_NAME_LEN: usize = 150;
const MAX_EMAIL_LEN: usize = 254;

/// Usernames are limited to letters, digits and `.@+-_`.
pub fn validate_username(username: &str) -> AppResult<()> {
    if username.is_empty() || username.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "username must be 1 to {MAX_NAME_LEN} characters"
        )));
    }
    let valid = username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-'));
    if !valid {
        return Err(AppError::Validation(
            "username may only contain letters, digits and .@+-_".into(),
        ));
    }
    Ok(())
}

fn validate_registration(payload: &RegisterRequest) -> AppResult<()> {
    let email = payload.email.trim();
    if email.is_empty() || email.len() > MAX_EMAIL_LEN || !email.contains('@') {
        return Err(AppError::Validation("Enter a valid email address".into()));
    }
    validate_username(&payload.username)?;
    for name in [&payload.first_name, &payload.last_name].into_iter().flatten() {
        if name.chars().count() > MAX_NAME_LEN {
            return Err(AppError::Validation(format!(
                "names must be at most {MAX_NAME_LEN} characters"
            )));
        }
    }
    if payload.password.is_empty() {
        return Err(AppError::Validation("password must not be empty".into()));
    }
    Ok(())
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    validate_registration(&payload)?;
    let RegisterRequest {
        email,
        username,
        first_name,
        last_name,
        password,
    } = payload;
    let email = email.trim().to_string();

    let email_taken = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?
        .is_some();
    if email_taken {
        return Err(AppError::Validation("Email is already taken".into()));
    }
    let username_taken = Users::find()
        .filter(UserCol::Username.eq(username.as_str()))
        .one(&state.orm)
        .await?
        .is_some();
    if username_taken {
        return Err(AppError::Validation("Username is already taken".into()));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();

    let inserted = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email),
        username: Set(username),
        first_name: Set(first_name),
        last_name: Set(last_name),
        avatar: Set(None),
        password_hash: Set(password_hash),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await;

    // A concurrent registration can still win the race past the checks above.
    let user = match inserted {
        Ok(user) => user,
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::Validation(
                "Email or username is already taken".into(),
            ));
        }
        Err(err) => return Err(err.into()),
    };

    audit::record(
        &state.pool,
        user.id,
        AuditAction::UserRegister,
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "User created",
        user_from_entity(user, false),
        None,
    ))
}

pub fn issue_token(
    user_id: Uuid,
    username: &str,
    secret: &str,
    ttl_hours: i64,
) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(ttl_hours))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let LoginRequest { email, password } = payload;
    let user = Users::find()
        .filter(UserCol::Email.eq(email.trim()))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Validation("Invalid email or password".into()))?;

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;

    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(AppError::Validation("Invalid email or password".into()));
    }

    let token = issue_token(
        user.id,
        &user.username,
        &state.config.jwt_secret,
        state.config.jwt_ttl_hours,
    )?;

    audit::record(
        &state.pool,
        user.id,
        AuditAction::UserLogin,
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Logged in",
        LoginResponse { auth_token: token },
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::decode_token;

    #[test]
    fn username_pattern() {
        assert!(validate_username("chef.anna+1@home-kitchen_").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("semi;colon").is_err());
        assert!(validate_username(&"a".repeat(151)).is_err());
    }

    #[test]
    fn issued_token_decodes_to_same_user() {
        let id = Uuid::new_v4();
        let token = issue_token(id, "anna", "test-secret", 1).unwrap();
        let user = decode_token(&token, "test-secret").unwrap();
        assert_eq!(user.user_id, id);
        assert_eq!(user.username, "anna");

        assert!(decode_token(&token, "other-secret").is_err());
    }

    #[test]
    fn registration_requires_email_and_password() {
        let payload = RegisterRequest {
            email: "no-at-sign".into(),
            username: "anna".into(),
            first_name: None,
            last_name: None,
            password: "secret".into(),
        };
        assert!(matches!(
            validate_registration(&payload),
            Err(AppError::Validation(_))
        ));

        let payload = RegisterRequest {
            email: "anna@example.com".into(),
            password: String::new(),
            ..payload
        };
        assert!(matches!(
            validate_registration(&payload),
            Err(AppError::Validation(_))
        ));
    }
}

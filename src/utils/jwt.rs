// src/utils/jwt.rs

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use chrono::{TimeDelta, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{config::Config, error::AppError, models::user::Role};

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - Stores the User ID (as string).
    pub sub: String,
    /// User's role ('student', 'teacher' or 'admin').
    pub role: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))
    }

    pub fn role(&self) -> Role {
        Role::from_db(&self.role)
    }
}

/// Claims of the token handed out when a student opens a quiz.
/// Carries the start time used to measure time spent.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct QuizClaims {
    /// User ID the quiz was opened by.
    pub sub: String,
    pub fiche_id: i64,
    /// Unix timestamp (seconds) of when the quiz was opened.
    pub started_at: i64,
    pub exp: usize,
}

fn expiry(from: i64, ttl_seconds: u64) -> usize {
    (from.max(0) as u64).saturating_add(ttl_seconds) as usize
}

/// Signs a new JWT for the user.
pub fn sign_jwt(id: i64, role: &str, secret: &str, expiration_seconds: u64) -> Result<String, AppError> {
    let claims = Claims {
        sub: id.to_string(),
        role: role.to_owned(),
        exp: expiry(Utc::now().timestamp(), expiration_seconds),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
///
/// Returns the `Claims` if valid, otherwise returns an `AppError`.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Signs a quiz token recording that `user_id` opened the quiz of `fiche_id` now.
pub fn sign_quiz_token(user_id: i64, fiche_id: i64, secret: &str, ttl_seconds: u64) -> Result<String, AppError> {
    sign_quiz_token_started_at(user_id, fiche_id, Utc::now().timestamp(), secret, ttl_seconds)
}

/// Signs a quiz token with a given start time. The token expires `ttl_seconds` from now.
pub fn sign_quiz_token_started_at(
    user_id: i64,
    fiche_id: i64,
    started_at: i64,
    secret: &str,
    ttl_seconds: u64,
) -> Result<String, AppError> {
    let claims = QuizClaims {
        sub: user_id.to_string(),
        fiche_id,
        started_at,
        exp: expiry(Utc::now().timestamp(), ttl_seconds),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

pub fn verify_quiz_token(token: &str, secret: &str) -> Result<QuizClaims, AppError> {
    decode::<QuizClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::BadRequest("Invalid quiz token".to_string()))
}

/// Start time of a quiz, if the token is valid and was issued to this user for this fiche.
pub fn quiz_started_at(token: Option<&str>, user_id: i64, fiche_id: i64, secret: &str) -> Option<i64> {
    let claims = match verify_quiz_token(token?, secret) {
        Ok(claims) => claims,
        Err(_) => {
            tracing::warn!(user_id, fiche_id, "Ignoring invalid or expired quiz token");
            return None;
        }
    };

    if claims.sub != user_id.to_string() || claims.fiche_id != fiche_id {
        tracing::warn!(user_id, fiche_id, "Ignoring quiz token issued for another quiz");
        return None;
    }

    Some(claims.started_at)
}

/// Time spent on a quiz, if the token is valid and was issued to this user for this fiche.
pub fn elapsed_since_quiz_start(
    token: Option<&str>,
    user_id: i64,
    fiche_id: i64,
    secret: &str,
) -> Option<TimeDelta> {
    let started_at = quiz_started_at(token, user_id, fiche_id, secret)?;
    let seconds = (Utc::now().timestamp() - started_at).max(0);
    Some(TimeDelta::seconds(seconds))
}

/// Axum Middleware: Authentication.
///
/// Intercepts requests, validates the 'Authorization: Bearer <token>' header.
/// If valid, injects `Claims` into the request extensions for handlers to use.
/// If invalid, returns 401 Unauthorized.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => return Err(StatusCode::UNAUTHORIZED),
    };

    match verify_jwt(token, &config.jwt_secret) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            Ok(next.run(req).await)
        }
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Axum Middleware: Authoring Authorization.
///
/// Must be used AFTER `auth_middleware`. Lets teachers and admins through.
/// Everyone else gets 403 Forbidden.
pub async fn teacher_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !claims.role().can_author() {
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(req).await)
}

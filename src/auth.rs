use std::sync::OnceLock;

use actix_web::{web, HttpResponse};
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::error;
use mongodb::bson::doc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::User;
use crate::store::with_timeout;

const ACCESS_TTL_MINUTES: i64 = 15;
const REFRESH_TTL_DAYS: i64 = 7;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

#[derive(Deserialize)]
pub struct SignupInfo {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginInfo {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshInfo {
    pub refresh_token: String,
}

fn email_regex() -> &'static Regex {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"))
}

pub fn create_token(user_id: &str, secret: &str, ttl: Duration) -> Result<String, ApiError> {
    let expiration = Utc::now() + ttl;
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration.timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .map_err(|e| ApiError::Internal(e.to_string()))
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

fn validate_signup(info: &SignupInfo) -> Result<(), ApiError> {
    if info.username.trim().is_empty() || info.email.trim().is_empty() || info.password.is_empty() {
        return Err(ApiError::InvalidOperation(
            "All fields (username, email, password) are required".to_string(),
        ));
    }
    if !email_regex().is_match(&info.email) {
        return Err(ApiError::InvalidOperation("Invalid email format".to_string()));
    }
    if info.password.len() < 4 {
        return Err(ApiError::InvalidOperation(
            "Password must be at least 4 characters long".to_string(),
        ));
    }
    Ok(())
}

// POST /user/signup
pub async fn signup(
    data: web::Data<AppState>,
    info: web::Json<SignupInfo>,
) -> Result<HttpResponse, ApiError> {
    validate_signup(&info)?;

    let users = data.mongodb.users();
    let existing = with_timeout(
        data.config.store_timeout,
        users.find_one(doc! {
            "$or": [ { "email": &info.email }, { "username": &info.username } ]
        }),
    )
    .await?;

    if let Some(existing) = existing {
        let conflict = match (existing.email == info.email, existing.username == info.username) {
            (true, true) => "both",
            (true, false) => "email",
            _ => "username",
        };
        return Ok(HttpResponse::Conflict().json(json!({
            "kind": "Conflict",
            "conflict": conflict,
            "message": match conflict {
                "both" => "Both email and username are already in use",
                "email" => "User with this email already exists",
                _ => "This username is already taken",
            },
        })));
    }

    let hashed = hash(&info.password, data.config.bcrypt_cost).map_err(|e| {
        error!("bcrypt failure on signup: {}", e);
        ApiError::Internal(e.to_string())
    })?;

    let new_user = User {
        id: Uuid::new_v4().to_string(),
        username: info.username.clone(),
        email: info.email.clone(),
        password: hashed,
        collaborators: vec![],
    };
    with_timeout(data.config.store_timeout, users.insert_one(&new_user)).await?;

    Ok(HttpResponse::Created().json(json!({
        "message": "User created successfully",
        "user": {
            "id": new_user.id,
            "username": new_user.username,
            "email": new_user.email,
            "collaborators": new_user.collaborators,
        },
    })))
}

// POST /user/login
pub async fn login(
    data: web::Data<AppState>,
    info: web::Json<LoginInfo>,
) -> Result<HttpResponse, ApiError> {
    let users = data.mongodb.users();
    let user = with_timeout(
        data.config.store_timeout,
        users.find_one(doc! { "username": &info.username }),
    )
    .await?;

    let user = match user {
        Some(u) => u,
        None => return Ok(HttpResponse::Unauthorized().json(json!({ "message": "Invalid credentials" }))),
    };

    if !verify(&info.password, &user.password).unwrap_or(false) {
        return Ok(HttpResponse::Unauthorized().json(json!({ "message": "Invalid credentials" })));
    }

    let access_token = create_token(
        &user.id,
        &data.config.access_secret,
        Duration::minutes(ACCESS_TTL_MINUTES),
    )?;
    let refresh_token = create_token(
        &user.id,
        &data.config.refresh_secret,
        Duration::days(REFRESH_TTL_DAYS),
    )?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Login successful",
        "accessToken": access_token,
        "refreshToken": refresh_token,
        "user": { "id": user.id, "username": user.username, "email": user.email },
    })))
}

// POST /user/refresh — exchange a refresh token for a new access token.
pub async fn refresh(
    data: web::Data<AppState>,
    info: web::Json<RefreshInfo>,
) -> Result<HttpResponse, ApiError> {
    match validate_token(&info.refresh_token, &data.config.refresh_secret) {
        Ok(claims) => {
            let access_token = create_token(
                &claims.sub,
                &data.config.access_secret,
                Duration::minutes(ACCESS_TTL_MINUTES),
            )?;
            Ok(HttpResponse::Ok().json(json!({ "accessToken": access_token })))
        }
        Err(_) => Ok(HttpResponse::Unauthorized()
            .json(json!({ "message": "Session expired, please login again" }))),
    }
}

// POST /user/logout — tokens are client-held; nothing to revoke server-side.
pub async fn logout() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "message": "Logged out successfully" }))
}

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{user, User, UserModel},
    errors::{ApiError, ServiceError},
};

/// Authenticated caller identity, resolved by the upstream identity provider
/// and forwarded as opaque headers.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or(ApiError::Unauthorized)?;

        let email = parts
            .headers
            .get("x-user-email")
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(ApiError::Unauthorized)?;

        Ok(CurrentUser { id, email })
    }
}

/// Materializes the caller in the local user directory, keeping the stored
/// email in sync with the identity provider's.
pub async fn ensure_user(db: &DbPool, current: &CurrentUser) -> Result<UserModel, ServiceError> {
    if let Some(existing) = User::find_by_id(current.id).one(db).await? {
        if existing.email == current.email {
            return Ok(existing);
        }
        let mut active: user::ActiveModel = existing.into();
        active.email = Set(current.email.clone());
        active.updated_at = Set(Utc::now());
        return Ok(active.update(db).await?);
    }

    let name = current
        .email
        .split('@')
        .next()
        .unwrap_or("customer")
        .to_string();

    let now = Utc::now();
    let active = user::ActiveModel {
        id: Set(current.id),
        email: Set(current.email.clone()),
        name: Set(name),
        is_admin: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
    };

    Ok(active.insert(db).await?)
}

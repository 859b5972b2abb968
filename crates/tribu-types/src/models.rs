use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Media-relative path every new profile starts with.
pub const DEFAULT_AVATAR: &str = "avatars/noavatar.png";

/// Session claims carried in the signed session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

/// The authenticated user making the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub username: String,
}

impl Actor {
    pub fn profile_url(&self) -> String {
        user_url(&self.username)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub date_joined: DateTime<Utc>,
}

impl User {
    pub fn url(&self) -> String {
        user_url(&self.username)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user: User,
    pub bio: String,
    /// Path relative to the media root, e.g. `avatars/noavatar.png`.
    pub avatar: String,
}

impl Profile {
    pub fn avatar_url(&self) -> String {
        format!("/media/{}", self.avatar)
    }

    pub fn has_default_avatar(&self) -> bool {
        self.avatar == DEFAULT_AVATAR
    }
}

/// A top-level post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Echo {
    pub id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author_id: Uuid,
    pub author_username: String,
}

impl Echo {
    pub fn url(&self) -> String {
        echo_url(self.id)
    }
}

/// A reply to an echo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wave {
    pub id: i64,
    pub echo_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author_id: Uuid,
    pub author_username: String,
}

pub fn user_url(username: &str) -> String {
    format!("/users/{}/", username)
}

pub fn echo_url(id: i64) -> String {
    format!("/echos/{}/", id)
}

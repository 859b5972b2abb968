//! Database row types. These map directly to SQLite rows and are converted
//! into the `tribu-types` models at the edge of this crate.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use tribu_types::models::{Echo, Profile, User, Wave};

use crate::parse_timestamp;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub created_at: String,
}

pub struct ProfileRow {
    pub user: UserRow,
    pub bio: String,
    pub avatar: String,
}

pub struct EchoRow {
    pub id: i64,
    pub user_id: String,
    pub username: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct WaveRow {
    pub id: i64,
    pub echo_id: i64,
    pub user_id: String,
    pub username: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

fn uuid_or_nil(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::nil()
    })
}

fn timestamp_or_epoch(raw: &str, what: &str) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        DateTime::default()
    })
}

impl UserRow {
    pub fn into_model(self) -> User {
        User {
            id: uuid_or_nil(&self.id, "user id"),
            date_joined: timestamp_or_epoch(&self.created_at, "date_joined"),
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
        }
    }
}

impl ProfileRow {
    pub fn into_model(self) -> Profile {
        Profile {
            user: self.user.into_model(),
            bio: self.bio,
            avatar: self.avatar,
        }
    }
}

impl EchoRow {
    pub fn into_model(self) -> Echo {
        Echo {
            id: self.id,
            author_id: uuid_or_nil(&self.user_id, "echo author"),
            created_at: timestamp_or_epoch(&self.created_at, "echo created_at"),
            updated_at: timestamp_or_epoch(&self.updated_at, "echo updated_at"),
            author_username: self.username,
            content: self.content,
        }
    }
}

impl WaveRow {
    pub fn into_model(self) -> Wave {
        Wave {
            id: self.id,
            echo_id: self.echo_id,
            author_id: uuid_or_nil(&self.user_id, "wave author"),
            created_at: timestamp_or_epoch(&self.created_at, "wave created_at"),
            updated_at: timestamp_or_epoch(&self.updated_at, "wave updated_at"),
            author_username: self.username,
            content: self.content,
        }
    }
}

//! Ownership checks shared by every mutating handler.

use tracing::warn;
use uuid::Uuid;

use tribu_types::models::{Actor, Echo, Profile, Wave};

use crate::error::ApiError;

/// A resource with a single owning user.
pub trait Owned {
    fn owner_id(&self) -> Uuid;
}

impl Owned for Echo {
    fn owner_id(&self) -> Uuid {
        self.author_id
    }
}

impl Owned for Wave {
    fn owner_id(&self) -> Uuid {
        self.author_id
    }
}

impl Owned for Profile {
    fn owner_id(&self) -> Uuid {
        self.user.id
    }
}

/// Whether `actor` may edit or delete `resource`.
pub fn can_mutate(actor: &Actor, resource: &impl Owned) -> bool {
    actor.id == resource.owner_id()
}

/// Fails with [`ApiError::Forbidden`] unless `actor` owns `resource`.
pub fn authorize(actor: &Actor, resource: &impl Owned) -> Result<(), ApiError> {
    if can_mutate(actor, resource) {
        Ok(())
    } else {
        warn!(
            "{} ({}) denied mutation of resource owned by {}",
            actor.username,
            actor.id,
            resource.owner_id()
        );
        Err(ApiError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn actor(id: Uuid) -> Actor {
        Actor { id, username: "ana".into() }
    }

    fn echo(author_id: Uuid) -> Echo {
        Echo {
            id: 1,
            content: "hello".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            author_id,
            author_username: "ana".into(),
        }
    }

    #[test]
    fn owner_can_mutate() {
        let id = Uuid::new_v4();
        assert!(can_mutate(&actor(id), &echo(id)));
        assert!(authorize(&actor(id), &echo(id)).is_ok());
    }

    #[test]
    fn stranger_is_forbidden() {
        let result = authorize(&actor(Uuid::new_v4()), &echo(Uuid::new_v4()));
        assert!(matches!(result, Err(ApiError::Forbidden)));
    }

    #[test]
    fn wave_ownership_ignores_parent_echo() {
        let me = Uuid::new_v4();
        let wave = Wave {
            id: 3,
            echo_id: 1,
            content: "reply".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            author_id: me,
            author_username: "ana".into(),
        };
        assert!(can_mutate(&actor(me), &wave));
        assert!(!can_mutate(&actor(Uuid::new_v4()), &wave));
    }
}

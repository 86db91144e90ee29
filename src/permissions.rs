use uuid::Uuid;

use crate::{
    auth::Actor,
    error::{AppError, AppResult},
    models::Role,
};

/// TrustLevel
///
/// The total order access decisions are made on. Derived from the actor's role
/// and account flags; staff accounts count as admins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrustLevel {
    Anonymous,
    User,
    Moderator,
    Admin,
    Superuser,
}

impl TrustLevel {
    pub fn of(actor: &Actor) -> Self {
        match actor {
            Actor::Anonymous => TrustLevel::Anonymous,
            Actor::User(user) if user.is_superuser => TrustLevel::Superuser,
            Actor::User(user) if user.is_staff => TrustLevel::Admin,
            Actor::User(user) => match user.role {
                Role::Admin => TrustLevel::Admin,
                Role::Moderator => TrustLevel::Moderator,
                Role::User => TrustLevel::User,
            },
        }
    }
}

/// Reading public resources is open to everyone.
pub fn can_read(_actor: &Actor) -> bool {
    true
}

pub fn can_create_publication(actor: &Actor) -> bool {
    actor.trust_level() >= TrustLevel::User
}

/// can_modify_publication
///
/// Reviews and comments may be changed by their author, a moderator, or anyone
/// above.
pub fn can_modify_publication(actor: &Actor, author_id: Uuid) -> bool {
    match actor {
        Actor::Anonymous => false,
        Actor::User(user) => {
            user.id == author_id || actor.trust_level() >= TrustLevel::Moderator
        }
    }
}

pub fn can_manage_catalog(actor: &Actor) -> bool {
    actor.trust_level() >= TrustLevel::Admin
}

pub fn can_manage_users(actor: &Actor) -> bool {
    actor.trust_level() >= TrustLevel::Admin
}

/// ensure
///
/// Turns a denied check into a 403. Call before any write so a denial has no side
/// effects.
pub fn ensure(allowed: bool) -> AppResult<()> {
    if allowed {
        Ok(())
    } else {
        tracing::debug!("Permission denied");
        Err(AppError::Forbidden(
            "you do not have permission to perform this action",
        ))
    }
}

//! Local sign-in against the built-in demo accounts.
//!
//! There is no server-side identity: a signed-in user is only used to fill
//! in author fields and to gate admin-only actions on this client.

use connectpoint_proto::message::UserRef;

/// Avatar shown for every demo account.
pub const DEFAULT_AVATAR: &str = "https://placehold.co/40x40.png";

/// What a user may do on this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// May edit tasks directly and review proposals.
    Admin,
    /// Proposes task changes for review.
    User,
}

/// Errors from signing in.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Unknown username or wrong password.
    #[error("Invalid username or password")]
    InvalidCredentials,
}

/// A signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Login name, also the display name.
    pub username: String,
    /// Permissions.
    pub role: Role,
    /// Avatar URL.
    pub avatar: String,
}

impl AuthenticatedUser {
    /// Whether this user has the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// The author reference attached to messages.
    #[must_use]
    pub fn user_ref(&self) -> UserRef {
        UserRef::new(self.username.clone(), self.avatar.clone())
    }
}

const ACCOUNTS: &[(&str, &str, Role)] = &[("admin", "12345", Role::Admin), ("test", "12345", Role::User)];

/// Checks a username and password against the built-in accounts.
///
/// # Errors
///
/// Returns [`AuthError::InvalidCredentials`] if either is wrong. The error
/// does not say which.
pub fn authenticate(username: &str, password: &str) -> Result<AuthenticatedUser, AuthError> {
    ACCOUNTS
        .iter()
        .find(|(name, pass, _)| *name == username && *pass == password)
        .map(|(name, _, role)| AuthenticatedUser {
            username: (*name).to_string(),
            role: *role,
            avatar: DEFAULT_AVATAR.to_string(),
        })
        .ok_or(AuthError::InvalidCredentials)
}

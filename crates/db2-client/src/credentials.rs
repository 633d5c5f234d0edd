//! Credential types for DRDA security checks.

#[cfg(feature = "zeroize")]
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Credentials sent in SECCHK.
///
/// Secrets are never printed by `Debug`. With the `zeroize` feature the
/// strings are wiped from memory on drop.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "zeroize", derive(Zeroize, ZeroizeOnDrop))]
pub enum Credentials {
    /// User ID and password (SECMEC USRIDPWD).
    UserPassword {
        /// User ID.
        user: String,
        /// Password.
        password: String,
    },

    /// User ID only (SECMEC USRIDONL).
    UserOnly {
        /// User ID.
        user: String,
    },
}

impl Credentials {
    /// Create user ID and password credentials.
    pub fn user_password(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self::UserPassword {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Create user-ID-only credentials.
    pub fn user_only(user: impl Into<String>) -> Self {
        Self::UserOnly { user: user.into() }
    }

    /// The user ID.
    #[must_use]
    pub fn user(&self) -> &str {
        match self {
            Self::UserPassword { user, .. } | Self::UserOnly { user } => user,
        }
    }

    /// The password, if any.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        match self {
            Self::UserPassword { password, .. } => Some(password),
            Self::UserOnly { .. } => None,
        }
    }

    /// Get the authentication method name.
    #[must_use]
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::UserPassword { .. } => "user ID and password",
            Self::UserOnly { .. } => "user ID only",
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserPassword { user, .. } => f
                .debug_struct("UserPassword")
                .field("user", user)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::UserOnly { user } => f.debug_struct("UserOnly").field("user", user).finish(),
        }
    }
}

//! Caller identity.

use serde::{Deserialize, Serialize};

/// The authenticated identity of a caller.
///
/// Authenticators replace the default [`Identity::Anonymous`] on success.
///
/// # Example
///
/// ```rust
/// use duplex_core::Identity;
///
/// let identity = Identity::user("user-123").with_roles(["admin"]);
/// assert_eq!(identity.log_id(), "user:user-123");
/// assert_eq!(identity.roles(), vec!["admin"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Identity {
    /// No credentials were presented or checked.
    #[default]
    Anonymous,

    /// An end user.
    User {
        /// Stable user identifier.
        user_id: String,
        /// Roles granted to the user.
        #[serde(default)]
        roles: Vec<String>,
    },

    /// Another service.
    Service {
        /// Service name.
        name: String,
    },

    /// An API key holder.
    ApiKey {
        /// Key identifier (never the secret).
        key_id: String,
    },
}

impl Identity {
    /// Creates a user identity without roles.
    #[must_use]
    pub fn user(user_id: impl Into<String>) -> Self {
        Self::User {
            user_id: user_id.into(),
            roles: Vec::new(),
        }
    }

    /// Creates a service identity.
    #[must_use]
    pub fn service(name: impl Into<String>) -> Self {
        Self::Service { name: name.into() }
    }

    /// Creates an API key identity.
    #[must_use]
    pub fn api_key(key_id: impl Into<String>) -> Self {
        Self::ApiKey {
            key_id: key_id.into(),
        }
    }

    /// Adds roles to a user identity. Other variants are returned unchanged.
    #[must_use]
    pub fn with_roles<I, S>(self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self {
            Self::User { user_id, .. } => Self::User {
                user_id,
                roles: roles.into_iter().map(Into::into).collect(),
            },
            other => other,
        }
    }

    /// Returns `true` for [`Identity::Anonymous`].
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// Returns a string identifier suitable for logging.
    ///
    /// Never contains secrets.
    #[must_use]
    pub fn log_id(&self) -> String {
        match self {
            Self::Anonymous => "anonymous".to_string(),
            Self::User { user_id, .. } => format!("user:{user_id}"),
            Self::Service { name } => format!("service:{name}"),
            Self::ApiKey { key_id } => format!("apikey:{key_id}"),
        }
    }

    /// Returns the roles carried by the identity.
    #[must_use]
    pub fn roles(&self) -> Vec<&str> {
        match self {
            Self::User { roles, .. } => roles.iter().map(String::as_str).collect(),
            Self::Service { name } => vec![name.as_str()],
            Self::Anonymous | Self::ApiKey { .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_ids() {
        assert_eq!(Identity::Anonymous.log_id(), "anonymous");
        assert_eq!(Identity::user("u1").log_id(), "user:u1");
        assert_eq!(Identity::service("orders").log_id(), "service:orders");
        assert_eq!(Identity::api_key("k1").log_id(), "apikey:k1");
    }

    #[test]
    fn roles() {
        let identity = Identity::user("u1").with_roles(["admin", "user"]);
        assert_eq!(identity.roles(), vec!["admin", "user"]);
        assert_eq!(Identity::service("orders").roles(), vec!["orders"]);
        assert!(Identity::api_key("k").roles().is_empty());
        assert!(Identity::Anonymous.is_anonymous());
    }

    #[test]
    fn with_roles_ignores_non_users() {
        let identity = Identity::service("orders").with_roles(["admin"]);
        assert_eq!(identity, Identity::service("orders"));
    }

    #[test]
    fn serialization_is_tagged() {
        let json = serde_json::to_string(&Identity::user("u123")).unwrap();
        assert!(json.contains("\"type\":\"user\""));
        assert!(json.contains("\"user_id\":\"u123\""));
        let parsed: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Identity::user("u123"));
    }
}

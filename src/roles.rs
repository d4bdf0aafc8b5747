//! User identities, roles, and the per-role request quota table.
//!
//! Roles are assigned once from configuration at startup and never change
//! afterwards. Unknown users are [`Role::Standard`].

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Length of the admission window every quota is measured against.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

pub const ADMIN_QUOTA: u32 = 30;
pub const PREMIUM_QUOTA: u32 = 15;
pub const STANDARD_QUOTA: u32 = 5;

/// Opaque user identifier. Transports hand us integers or strings; both
/// compare as their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Int(i64),
            Uint(u64),
            Str(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Int(n) => Self::from(n),
            RawId::Uint(n) => Self::from(n),
            RawId::Str(s) => Self::new(s),
        })
    }
}

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Access tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Standard,
    Premium,
    Admin,
}

impl Role {
    /// Requests allowed per [`RATE_WINDOW`].
    pub fn quota(self) -> u32 {
        match self {
            Role::Admin => ADMIN_QUOTA,
            Role::Premium => PREMIUM_QUOTA,
            Role::Standard => STANDARD_QUOTA,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Standard => write!(f, "standard"),
            Role::Premium => write!(f, "premium"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(Role::Standard),
            "premium" => Ok(Role::Premium),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Read-only role table built at startup.
#[derive(Debug, Clone, Default)]
pub struct RoleStore {
    admins: HashSet<UserId>,
    premium: HashSet<UserId>,
}

impl RoleStore {
    /// Admin wins when an id appears in both lists.
    pub fn new<A, P>(admins: A, premium: P) -> Self
    where
        A: IntoIterator,
        A::Item: Into<UserId>,
        P: IntoIterator,
        P::Item: Into<UserId>,
    {
        let admins: HashSet<UserId> = admins
            .into_iter()
            .map(Into::into)
            .filter(|id: &UserId| !id.as_str().is_empty())
            .collect();
        let premium = premium
            .into_iter()
            .map(Into::into)
            .filter(|id: &UserId| !id.as_str().is_empty() && !admins.contains(id))
            .collect();
        Self { admins, premium }
    }

    pub fn role_of(&self, user: &UserId) -> Role {
        if self.admins.contains(user) {
            Role::Admin
        } else if self.premium.contains(user) {
            Role::Premium
        } else {
            Role::Standard
        }
    }

    pub fn quota_of(&self, user: &UserId) -> u32 {
        self.role_of(user).quota()
    }

    pub fn admin_count(&self) -> usize {
        self.admins.len()
    }
}

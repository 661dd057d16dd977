//! Listing and repository options

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Default cap on list results when the caller sets no limit
pub const DEFAULT_LIST_LIMIT: i64 = 10_000;

/// Sort order for session listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionOrder {
    CreatedAsc,
    #[default]
    CreatedDesc,
}

impl SessionOrder {
    /// SQL `ORDER BY` clause; rowid breaks ties between equal timestamps
    pub(crate) fn sql(&self) -> &'static str {
        match self {
            Self::CreatedAsc => "created_at ASC, rowid ASC",
            Self::CreatedDesc => "created_at DESC, rowid DESC",
        }
    }
}

impl FromStr for SessionOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        match normalized.as_str() {
            "create_time asc" | "created_asc" | "asc" => Ok(Self::CreatedAsc),
            "create_time desc" | "create_time" | "created_desc" | "desc" => Ok(Self::CreatedDesc),
            _ => Err(Error::Parse(format!("unknown session order '{}'", s))),
        }
    }
}

impl fmt::Display for SessionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreatedAsc => write!(f, "create_time asc"),
            Self::CreatedDesc => write!(f, "create_time desc"),
        }
    }
}

/// Filters and bounds for [`SessionRepository::list_sessions`]
///
/// [`SessionRepository::list_sessions`]: super::SessionRepository::list_sessions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Positive caps results, negative is unlimited, `None` or zero uses the repository default
    pub limit: Option<i64>,
    pub scope_id: Option<String>,
    pub user_id: Option<String>,
    pub order: SessionOrder,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_scope_id(mut self, scope_id: impl Into<String>) -> Self {
        self.scope_id = Some(scope_id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_order(mut self, order: SessionOrder) -> Self {
        self.order = order;
        self
    }

    /// Resolve the effective SQL limit; `-1` means unlimited to SQLite
    pub(crate) fn effective_limit(&self, default_limit: i64) -> i64 {
        match self.limit {
            None | Some(0) => default_limit,
            Some(n) if n < 0 => -1,
            Some(n) => n,
        }
    }
}

/// Repository construction options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryOptions {
    /// Limit applied to listings that do not set one; must be positive
    pub default_limit: i64,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl RepositoryOptions {
    pub fn with_default_limit(mut self, default_limit: i64) -> Self {
        self.default_limit = default_limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_limit() {
        assert_eq!(ListOptions::new().effective_limit(50), 50);
        assert_eq!(ListOptions::new().with_limit(0).effective_limit(50), 50);
        assert_eq!(ListOptions::new().with_limit(3).effective_limit(50), 3);
        assert_eq!(ListOptions::new().with_limit(-1).effective_limit(50), -1);
        assert_eq!(ListOptions::new().with_limit(-20).effective_limit(50), -1);
    }

    #[test]
    fn test_order_parsing() {
        assert_eq!(
            "create_time asc".parse::<SessionOrder>().unwrap(),
            SessionOrder::CreatedAsc
        );
        assert_eq!(
            "create_time  DESC".parse::<SessionOrder>().unwrap(),
            SessionOrder::CreatedDesc
        );
        assert!("name asc".parse::<SessionOrder>().is_err());
        assert_eq!(SessionOrder::default(), SessionOrder::CreatedDesc);
        assert_eq!(SessionOrder::CreatedAsc.to_string(), "create_time asc");
    }

    #[test]
    fn test_builder() {
        let opts = ListOptions::new()
            .with_limit(5)
            .with_scope_id("o_1")
            .with_user_id("u_1")
            .with_order(SessionOrder::CreatedAsc);
        assert_eq!(opts.limit, Some(5));
        assert_eq!(opts.scope_id.as_deref(), Some("o_1"));
        assert_eq!(opts.user_id.as_deref(), Some("u_1"));
        assert_eq!(opts.order, SessionOrder::CreatedAsc);
    }
}

//! Tenant resolution and collection naming.
//!
//! Every stored artifact belongs to exactly one tenant: the shared demo
//! tenant or a named organization. A tenant owns its own store root and
//! its own collection namespace:
//!
//! | Tenant | Store root | Collection name |
//! |--------|------------|-----------------|
//! | demo | `<base>/demo` | `demo_<category>` |
//! | org `acme` | `<base>/acme` | `org_acme_<category>` |
//!
//! The org id `demo` is reserved so the two namespaces can never collide.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// Reserved identifier of the shared demo tenant.
pub const DEMO_TENANT: &str = "demo";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TenantId {
    Demo,
    Organization(String),
}

impl TenantId {
    /// Validate and wrap an organization id.
    ///
    /// Ids must be non-empty, must not be the reserved `demo`, and may only
    /// contain ASCII letters, digits, `-`, and `_` (they become directory
    /// names and collection prefixes).
    pub fn organization(org_id: &str) -> Result<Self> {
        let org_id = org_id.trim();
        if org_id.is_empty() {
            return Err(IndexError::Config("organization id is empty".into()));
        }
        if org_id.eq_ignore_ascii_case(DEMO_TENANT) {
            return Err(IndexError::Config(format!(
                "organization id '{}' is reserved",
                org_id
            )));
        }
        if !org_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(IndexError::Config(format!(
                "organization id '{}' contains characters other than [A-Za-z0-9_-]",
                org_id
            )));
        }
        Ok(TenantId::Organization(org_id.to_string()))
    }

    /// Parse the string form used in metadata and backups.
    pub fn parse(s: &str) -> Result<Self> {
        if s.trim() == DEMO_TENANT {
            Ok(TenantId::Demo)
        } else {
            Self::organization(s)
        }
    }

    /// Value written into `tenant_id` metadata.
    pub fn as_str(&self) -> &str {
        match self {
            TenantId::Demo => DEMO_TENANT,
            TenantId::Organization(id) => id,
        }
    }

    pub fn is_demo(&self) -> bool {
        matches!(self, TenantId::Demo)
    }

    pub fn collection_prefix(&self) -> String {
        match self {
            TenantId::Demo => DEMO_TENANT.to_string(),
            TenantId::Organization(id) => format!("org_{}", id),
        }
    }

    pub fn collection_name(&self, category: Category) -> String {
        format!("{}_{}", self.collection_prefix(), category.as_str())
    }

    /// True if `name` lies in this tenant's collection namespace.
    pub fn owns_collection(&self, name: &str) -> bool {
        Category::ALL
            .iter()
            .any(|c| self.collection_name(*c) == name)
    }

    pub fn store_root(&self, base: &Path) -> PathBuf {
        base.join(self.as_str())
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the tenant for a request.
///
/// An authenticated user with a non-empty, non-reserved organization id gets
/// that organization; every other combination lands in the demo tenant.
/// Malformed organization ids are rejected rather than downgraded.
pub fn resolve_tenant(user_id: Option<&str>, org_id: Option<&str>) -> Result<TenantId> {
    let user = user_id.map(str::trim).filter(|u| !u.is_empty());
    let org = org_id.map(str::trim).filter(|o| !o.is_empty());
    match (user, org) {
        (Some(_), Some(org)) if org != DEMO_TENANT => TenantId::organization(org),
        _ => Ok(TenantId::Demo),
    }
}

/// Per-organization limits. `None` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantQuota {
    #[serde(default)]
    pub max_users: Option<u32>,
    #[serde(default)]
    pub max_documents: Option<u64>,
    #[serde(default)]
    pub storage_gb: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tenant {
    pub id: TenantId,
    pub quota: TenantQuota,
}

impl Tenant {
    pub fn demo() -> Self {
        Self {
            id: TenantId::Demo,
            quota: TenantQuota::default(),
        }
    }

    pub fn new(id: TenantId, quota: TenantQuota) -> Self {
        Self { id, quota }
    }
}

/// Collection category within a tenant's namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Main,
    Code,
    Documentation,
    Conversations,
    PullRequests,
    Tickets,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Main,
        Category::Code,
        Category::Documentation,
        Category::Conversations,
        Category::PullRequests,
        Category::Tickets,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Main => "main",
            Category::Code => "code",
            Category::Documentation => "documentation",
            Category::Conversations => "conversations",
            Category::PullRequests => "pull_requests",
            Category::Tickets => "tickets",
        }
    }
}

impl FromStr for Category {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| IndexError::InvalidCategory(s.to_string()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_without_user_is_demo() {
        assert_eq!(resolve_tenant(None, Some("acme")).unwrap(), TenantId::Demo);
        assert_eq!(resolve_tenant(None, None).unwrap(), TenantId::Demo);
    }

    #[test]
    fn test_resolve_user_with_org() {
        assert_eq!(
            resolve_tenant(Some("u1"), Some("acme")).unwrap(),
            TenantId::Organization("acme".into())
        );
    }

    #[test]
    fn test_resolve_user_without_org_or_reserved() {
        assert_eq!(resolve_tenant(Some("u1"), None).unwrap(), TenantId::Demo);
        assert_eq!(resolve_tenant(Some("u1"), Some("")).unwrap(), TenantId::Demo);
        assert_eq!(resolve_tenant(Some("u1"), Some("demo")).unwrap(), TenantId::Demo);
    }

    #[test]
    fn test_resolve_rejects_malformed_org() {
        assert!(resolve_tenant(Some("u1"), Some("../etc")).is_err());
    }

    #[test]
    fn test_collection_names() {
        let demo = TenantId::Demo;
        let acme = TenantId::organization("acme").unwrap();
        assert_eq!(demo.collection_name(Category::Code), "demo_code");
        assert_eq!(
            acme.collection_name(Category::PullRequests),
            "org_acme_pull_requests"
        );
        assert!(acme.owns_collection("org_acme_main"));
        assert!(!acme.owns_collection("demo_main"));
        assert!(!demo.owns_collection("org_acme_main"));
    }

    #[test]
    fn test_store_roots_are_disjoint() {
        let base = Path::new("/data/stores");
        assert_eq!(TenantId::Demo.store_root(base), base.join("demo"));
        assert_eq!(
            TenantId::organization("acme").unwrap().store_root(base),
            base.join("acme")
        );
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("tickets".parse::<Category>().unwrap(), Category::Tickets);
        assert!(matches!(
            "recipes".parse::<Category>(),
            Err(IndexError::InvalidCategory(_))
        ));
    }

    #[test]
    fn test_reserved_org_id() {
        assert!(TenantId::organization("demo").is_err());
        assert!(TenantId::organization("DEMO").is_err());
        assert_eq!(TenantId::parse("demo").unwrap(), TenantId::Demo);
    }
}

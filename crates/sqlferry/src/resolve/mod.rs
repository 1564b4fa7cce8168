//! Engine identity and dialect resolution.
//!
//! A connected engine reports a [`DatabaseInfo`] (product name and version
//! fields). Dialects are registered against the *least specific* info they
//! support; [`DialectResolver`] picks the most specific registered dialect
//! whose requirements the detected engine satisfies.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::{FerryError, Result};

/// Immutable product-identity descriptor for a database engine.
///
/// Field semantics follow a "more fields, more specific" rule: an info with
/// only a product name describes the whole product family, while one with
/// major/minor versions describes a concrete release line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    /// Product name as reported by the engine (e.g. "MySQL").
    pub product_name: String,
    /// Full product version string, if known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub product_version: Option<String>,
    /// Major version number, if known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub major_version: Option<u32>,
    /// Minor version number, if known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub minor_version: Option<u32>,
}

impl DatabaseInfo {
    /// Describe a product family by name only.
    pub fn new(product_name: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
            product_version: None,
            major_version: None,
            minor_version: None,
        }
    }

    /// Attach the full product version string.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.product_version = Some(version.into());
        self
    }

    /// Attach major/minor version numbers.
    pub fn with_major_minor(mut self, major: u32, minor: u32) -> Self {
        self.major_version = Some(major);
        self.minor_version = Some(minor);
        self
    }

    /// Check whether this (detected) info satisfies `required`.
    ///
    /// True iff the product name starts with `required`'s name
    /// (case-insensitive) and every non-null version field of `required`
    /// is less than or equal to the corresponding field here. A `required`
    /// field that is set while ours is unknown does not match: an engine
    /// of unknown version cannot satisfy a version-specific requirement.
    pub fn matches(&self, required: &DatabaseInfo) -> bool {
        if !starts_with_ignore_case(&self.product_name, &required.product_name) {
            return false;
        }
        satisfies(&self.product_version, &required.product_version)
            && satisfies(&self.major_version, &required.major_version)
            && satisfies(&self.minor_version, &required.minor_version)
    }
}

/// `actual` satisfies `required` when `required` is unset, or both are set
/// and `required <= actual`.
fn satisfies<T: PartialOrd>(actual: &Option<T>, required: &Option<T>) -> bool {
    match (required, actual) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(req), Some(act)) => req <= act,
    }
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack.len() >= prefix.len() && haystack[..prefix.len()].eq_ignore_ascii_case(prefix)
}

impl PartialOrd for DatabaseInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DatabaseInfo {
    /// Nulls-first lexicographic ordering over (name, version, major,
    /// minor). Under this ordering a more fully specified info sorts
    /// after a less specified one, which is what "most specific wins"
    /// resolution relies on.
    fn cmp(&self, other: &Self) -> Ordering {
        self.product_name
            .to_lowercase()
            .cmp(&other.product_name.to_lowercase())
            .then_with(|| self.product_version.cmp(&other.product_version))
            .then_with(|| self.major_version.cmp(&other.major_version))
            .then_with(|| self.minor_version.cmp(&other.minor_version))
    }
}

impl fmt::Display for DatabaseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.product_name)?;
        if let Some(ref version) = self.product_version {
            write!(f, " {}", version)?;
        }
        if let (Some(major), Some(minor)) = (self.major_version, self.minor_version) {
            write!(f, " ({}.{})", major, minor)?;
        }
        Ok(())
    }
}

/// Registry selecting the best-matching dialect for a detected engine.
///
/// Explicitly constructed and passed down; there is no process-wide
/// registry. Registration order matters only as a tie-breaker: among
/// equally specific matches the first registered wins.
#[derive(Default)]
pub struct DialectResolver {
    entries: Vec<(DatabaseInfo, Arc<dyn Dialect>)>,
}

impl DialectResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver with the standard built-in dialects registered.
    pub fn with_builtins() -> Self {
        use crate::dialect::{MysqlDialect, NuodbDialect, PostgresDialect};

        let mut resolver = Self::new();
        resolver.register(DatabaseInfo::new("MySQL"), Arc::new(MysqlDialect::new()));
        resolver.register(DatabaseInfo::new("MariaDB"), Arc::new(MysqlDialect::new()));
        resolver.register(
            DatabaseInfo::new("PostgreSQL"),
            Arc::new(PostgresDialect::new()),
        );
        resolver.register(DatabaseInfo::new("NuoDB"), Arc::new(NuodbDialect::new()));
        resolver
    }

    /// Register a dialect for engines satisfying `info`.
    pub fn register(&mut self, info: DatabaseInfo, dialect: Arc<dyn Dialect>) {
        self.entries.push((info, dialect));
    }

    /// Resolve the most specific dialect compatible with `detected`.
    ///
    /// # Errors
    ///
    /// Returns [`FerryError::UnsupportedEngine`] when no registered
    /// dialect's requirements are satisfied.
    pub fn resolve(&self, detected: &DatabaseInfo) -> Result<Arc<dyn Dialect>> {
        let mut best: Option<&(DatabaseInfo, Arc<dyn Dialect>)> = None;
        for entry in &self.entries {
            if !detected.matches(&entry.0) {
                continue;
            }
            // Strictly-greater comparison keeps the first registered
            // entry among equally specific matches.
            match best {
                Some((info, _)) if entry.0.cmp(info) != Ordering::Greater => {}
                _ => best = Some(entry),
            }
        }
        best.map(|(_, dialect)| Arc::clone(dialect))
            .ok_or_else(|| FerryError::UnsupportedEngine(detected.to_string()))
    }

    /// Registered requirement infos, in registration order.
    pub fn registered(&self) -> Vec<&DatabaseInfo> {
        self.entries.iter().map(|(info, _)| info).collect()
    }
}

impl fmt::Debug for DialectResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialectResolver")
            .field("entries", &self.registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_name_prefix() {
        let detected = DatabaseInfo::new("MySQL Community Server");
        assert!(detected.matches(&DatabaseInfo::new("mysql")));
        assert!(!detected.matches(&DatabaseInfo::new("PostgreSQL")));
    }

    #[test]
    fn test_matches_version_fields() {
        let detected = DatabaseInfo::new("MySQL")
            .with_version("5.5.28")
            .with_major_minor(5, 5);

        assert!(detected.matches(&DatabaseInfo::new("MySQL")));
        assert!(detected.matches(&DatabaseInfo::new("MySQL").with_major_minor(5, 1)));
        assert!(!detected.matches(&DatabaseInfo::new("MySQL").with_major_minor(5, 7)));
        assert!(!detected.matches(&DatabaseInfo::new("MySQL").with_major_minor(8, 0)));
    }

    #[test]
    fn test_versionless_engine_rejects_version_requirement() {
        let detected = DatabaseInfo::new("MySQL");
        assert!(!detected.matches(&DatabaseInfo::new("MySQL").with_major_minor(5, 7)));
    }

    #[test]
    fn test_resolver_most_specific_wins() {
        use crate::dialect::MysqlDialect;

        let mut resolver = DialectResolver::new();
        resolver.register(DatabaseInfo::new("MySQL"), Arc::new(MysqlDialect::new()));
        resolver.register(
            DatabaseInfo::new("MySQL").with_major_minor(8, 0),
            Arc::new(MysqlDialect::new()),
        );

        let modern = DatabaseInfo::new("MySQL")
            .with_version("8.0.36")
            .with_major_minor(8, 0);
        let resolved = resolver.resolve(&modern).unwrap();
        assert_eq!(resolved.name(), "mysql");

        // A name-only detection must fall back to the general dialect,
        // never the version-specific registration.
        let bare = DatabaseInfo::new("MySQL");
        assert!(resolver.resolve(&bare).is_ok());
    }

    #[test]
    fn test_resolver_deterministic() {
        let resolver = DialectResolver::with_builtins();
        let detected = DatabaseInfo::new("PostgreSQL").with_major_minor(15, 2);
        let a = resolver.resolve(&detected).unwrap();
        let b = resolver.resolve(&detected).unwrap();
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn test_resolver_unsupported_engine() {
        let resolver = DialectResolver::with_builtins();
        let detected = DatabaseInfo::new("Oracle").with_major_minor(19, 0);
        match resolver.resolve(&detected) {
            Err(FerryError::UnsupportedEngine(msg)) => assert!(msg.contains("Oracle")),
            other => panic!("expected UnsupportedEngine, got {:?}", other.map(|d| d.name().to_string())),
        }
    }
}

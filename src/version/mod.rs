// src/version/mod.rs

//! Version specifier parsing and comparison for NuGet-style dependencies
//!
//! Automation project manifests declare dependencies with NuGet range syntax:
//! exact (`[1.2.3]`), bare minimum (`1.2.3`), lower-bounded range
//! (`[1.0,2.0)`), or upper-bounded-only range (`(,1.0]`). This module
//! classifies specifiers, compares dotted version strings, and picks the best
//! available version for a specifier.

use regex::Regex;
use std::cmp::Ordering;
use std::sync::LazyLock;

static EXACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(\d+\.\d+\.\d+(?:\.\d+)?(?:-[\w\.]+)?)\]$").expect("valid regex")
});

static SIMPLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+\.\d+\.\d+(?:\.\d+)?(?:-[\w\.]+)?)$").expect("valid regex")
});

static LOWER_BOUND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(\d+\.\d+\.\d+(?:\.\d+)?)").expect("valid regex"));

static UPPER_BOUND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(,\s*(\d+\.\d+\.\d+(?:\.\d+)?)").expect("valid regex"));

/// Classification of a version specifier string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecKind {
    /// Bracketed single version: `[1.2.3]`
    Exact,
    /// Bare dotted version: `1.2.3` (floor; often treated as exact upstream)
    Minimum,
    /// Bounded range: `[1.0,2.0)` or `(,1.0]`
    Range,
    /// Anything else; degrades to "unresolved", never an error
    Unknown,
}

/// Classify a version specifier and extract its concrete version, if any.
///
/// Exact and minimum specs yield their version; a lower-bounded range yields
/// its lower bound. An upper-bounded-only range has no usable floor and yields
/// `None`. Unrecognized syntax classifies as `Unknown` with no version.
pub fn parse_version_spec(spec: &str) -> (SpecKind, Option<String>) {
    let spec = spec.trim();

    if let Some(caps) = EXACT_RE.captures(spec) {
        return (SpecKind::Exact, Some(caps[1].to_string()));
    }

    if let Some(caps) = SIMPLE_RE.captures(spec) {
        return (SpecKind::Minimum, Some(caps[1].to_string()));
    }

    if let Some(caps) = LOWER_BOUND_RE.captures(spec) {
        return (SpecKind::Range, Some(caps[1].to_string()));
    }

    if UPPER_BOUND_RE.is_match(spec) {
        // Upper bound alone gives no resolvable floor
        return (SpecKind::Range, None);
    }

    (SpecKind::Unknown, None)
}

/// Collapse a declared specifier to a concrete version where possible.
///
/// Used when reading nuspec dependency declarations: `[1.0.0]` becomes
/// `1.0.0`, a lower-bounded range becomes its lower bound, a bare version
/// passes through. Anything else is returned as-is, unresolved.
pub fn extract_version(spec: &str) -> String {
    match parse_version_spec(spec) {
        (_, Some(version)) => version,
        _ => spec.trim().to_string(),
    }
}

/// Split a version string into numeric segments for comparison.
///
/// Strips any pre-release suffix, then treats each dot-separated segment as a
/// number (non-numeric segments count as 0).
fn numeric_segments(version: &str) -> Vec<u64> {
    let base = version.split('-').next().unwrap_or(version);
    base.split('.')
        .map(|s| s.parse::<u64>().unwrap_or(0))
        .collect()
}

/// Compare two dotted version strings.
///
/// Total and deterministic over arbitrary strings: segments are compared
/// numerically after zero-padding to equal length, so `1.2` == `1.2.0`.
/// Pre-release suffixes are ignored.
pub fn compare_versions(v1: &str, v2: &str) -> Ordering {
    let mut n1 = numeric_segments(v1);
    let mut n2 = numeric_segments(v2);

    let max_len = n1.len().max(n2.len());
    n1.resize(max_len, 0);
    n2.resize(max_len, 0);

    n1.cmp(&n2)
}

/// Sort a list of version strings newest-first.
///
/// Registry version lists arrive in no guaranteed order; all "pick highest"
/// decisions depend on descending order.
pub fn sort_versions_descending(versions: &mut [String]) {
    versions.sort_by(|a, b| compare_versions(b, a));
}

/// Pick the best available version for a specifier.
///
/// Strategy, given `available` sorted descending:
/// 1. Exact spec: exact string match, else first candidate sharing the
///    numeric prefix (ignoring pre-release suffix differences).
/// 2. Minimum spec: lowest candidate that still satisfies the floor.
/// 3. Everything else, or no candidate matched: newest available.
///
/// Returns `None` only when `available` is empty. Note that an
/// upper-bounded-only range carries no floor and falls through to newest,
/// which may exceed the declared bound; this mirrors the upstream behavior.
pub fn resolve_best_version(available: &[String], spec: &str) -> Option<String> {
    if available.is_empty() {
        return None;
    }

    let (kind, extracted) = parse_version_spec(spec);

    if kind == SpecKind::Exact {
        if let Some(ref wanted) = extracted {
            if available.iter().any(|v| v == wanted) {
                return Some(wanted.clone());
            }
            // Close match: same numeric prefix, different build metadata
            let base = wanted.split('-').next().unwrap_or(wanted);
            for v in available {
                if v == wanted || v.starts_with(base) {
                    return Some(v.clone());
                }
            }
        }
    }

    if kind == SpecKind::Minimum {
        if let Some(ref floor) = extracted {
            // Lowest version that still satisfies the floor: walk the
            // descending list from the bottom up
            for v in available.iter().rev() {
                if compare_versions(v, floor) != Ordering::Less {
                    return Some(v.clone());
                }
            }
        }
    }

    // Fallback: newest available
    available.first().cloned()
}

/// Version component to bump when repackaging a project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bump {
    Major,
    Minor,
    Patch,
}

/// Increment a semantic version string.
///
/// Missing or non-numeric segments default to 0, so `"1.2"` bumps to
/// `"1.2.1"` on a patch bump.
pub fn increment_version(version: &str, bump: Bump) -> String {
    let segments = numeric_segments(version);
    let major = segments.first().copied().unwrap_or(0);
    let minor = segments.get(1).copied().unwrap_or(0);
    let patch = segments.get(2).copied().unwrap_or(0);

    match bump {
        Bump::Major => format!("{}.0.0", major + 1),
        Bump::Minor => format!("{}.{}.0", major, minor + 1),
        Bump::Patch => format!("{}.{}.{}", major, minor, patch + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exact_spec() {
        assert_eq!(
            parse_version_spec("[1.2.3]"),
            (SpecKind::Exact, Some("1.2.3".to_string()))
        );
        assert_eq!(
            parse_version_spec("[1.2.3.4]"),
            (SpecKind::Exact, Some("1.2.3.4".to_string()))
        );
        assert_eq!(
            parse_version_spec("[1.2.3-beta.1]"),
            (SpecKind::Exact, Some("1.2.3-beta.1".to_string()))
        );
    }

    #[test]
    fn test_parse_minimum_spec() {
        assert_eq!(
            parse_version_spec("1.2.3"),
            (SpecKind::Minimum, Some("1.2.3".to_string()))
        );
        assert_eq!(
            parse_version_spec("1.0.0-alpha"),
            (SpecKind::Minimum, Some("1.0.0-alpha".to_string()))
        );
    }

    #[test]
    fn test_parse_range_specs() {
        assert_eq!(
            parse_version_spec("[1.0.0,2.0.0)"),
            (SpecKind::Range, Some("1.0.0".to_string()))
        );
        assert_eq!(
            parse_version_spec("[1.0.0,)"),
            (SpecKind::Range, Some("1.0.0".to_string()))
        );
        assert_eq!(parse_version_spec("(,1.0.0]"), (SpecKind::Range, None));
        assert_eq!(parse_version_spec("(, 2.0.0)"), (SpecKind::Range, None));
    }

    #[test]
    fn test_parse_unknown_spec_never_errors() {
        assert_eq!(parse_version_spec("latest"), (SpecKind::Unknown, None));
        assert_eq!(parse_version_spec(""), (SpecKind::Unknown, None));
        assert_eq!(parse_version_spec("~> 1.0"), (SpecKind::Unknown, None));
    }

    #[test]
    fn test_extract_version() {
        assert_eq!(extract_version("[1.0.0]"), "1.0.0");
        assert_eq!(extract_version("[1.0.0, 2.0.0)"), "1.0.0");
        assert_eq!(extract_version("1.0.0"), "1.0.0");
        // Unresolvable specs pass through untouched
        assert_eq!(extract_version("(,1.0.0]"), "(,1.0.0]");
    }

    #[test]
    fn test_compare_versions_padding() {
        assert_eq!(compare_versions("1.2.0", "1.2"), Ordering::Equal);
        assert_eq!(compare_versions("1.2", "1.2.0.0"), Ordering::Equal);
    }

    #[test]
    fn test_compare_versions_ordering() {
        assert_eq!(compare_versions("2.0.0", "1.9.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.2.3", "1.2.4"), Ordering::Less);
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
    }

    #[test]
    fn test_compare_versions_prerelease_stripped() {
        assert_eq!(compare_versions("1.0.0-beta", "1.0.0"), Ordering::Equal);
    }

    #[test]
    fn test_compare_versions_non_numeric_segment() {
        // Non-numeric segments count as zero
        assert_eq!(compare_versions("1.x.0", "1.0.0"), Ordering::Equal);
    }

    #[test]
    fn test_sort_versions_descending() {
        let mut versions = vec![
            "1.0.0".to_string(),
            "2.1.0".to_string(),
            "1.10.0".to_string(),
            "1.9.0".to_string(),
        ];
        sort_versions_descending(&mut versions);
        assert_eq!(versions, vec!["2.1.0", "1.10.0", "1.9.0", "1.0.0"]);
    }

    #[test]
    fn test_resolve_exact_available() {
        let available: Vec<String> =
            vec!["2.0.0".into(), "1.5.0".into(), "1.0.0".into()];
        assert_eq!(
            resolve_best_version(&available, "[1.5.0]"),
            Some("1.5.0".to_string())
        );
    }

    #[test]
    fn test_resolve_minimum_next_higher() {
        let available: Vec<String> =
            vec!["2.0.0".into(), "1.5.0".into(), "1.0.0".into()];
        assert_eq!(
            resolve_best_version(&available, "1.2.0"),
            Some("1.5.0".to_string())
        );
    }

    #[test]
    fn test_resolve_exact_unsatisfiable_falls_back_to_newest() {
        let available: Vec<String> = vec!["2.0.0".into(), "1.5.0".into()];
        assert_eq!(
            resolve_best_version(&available, "[3.0.0]"),
            Some("2.0.0".to_string())
        );
    }

    #[test]
    fn test_resolve_empty_list() {
        assert_eq!(resolve_best_version(&[], "1.0.0"), None);
    }

    #[test]
    fn test_resolve_exact_prefix_match() {
        let available: Vec<String> = vec!["1.5.0-beta.2".into(), "1.0.0".into()];
        assert_eq!(
            resolve_best_version(&available, "[1.5.0]"),
            Some("1.5.0-beta.2".to_string())
        );
    }

    #[test]
    fn test_resolve_upper_bound_falls_through_to_newest() {
        // Documented quirk: (,X] carries no floor and resolves to newest
        let available: Vec<String> = vec!["3.0.0".into(), "1.0.0".into()];
        assert_eq!(
            resolve_best_version(&available, "(,2.0.0]"),
            Some("3.0.0".to_string())
        );
    }

    #[test]
    fn test_increment_version() {
        assert_eq!(increment_version("1.2.3", Bump::Patch), "1.2.4");
        assert_eq!(increment_version("1.2.3", Bump::Minor), "1.3.0");
        assert_eq!(increment_version("1.2.3", Bump::Major), "2.0.0");
        assert_eq!(increment_version("1.2", Bump::Patch), "1.2.1");
    }
}

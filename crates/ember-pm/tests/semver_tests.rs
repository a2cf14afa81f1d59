//! Integration tests for semver parsing, comparison and constraint matching

use ember_pm::{compare, satisfies, Constraint, Version};
use std::cmp::Ordering;

const SAMPLES: &[&str] = &[
    "0.0.1",
    "0.9.0",
    "1.0.0-alpha",
    "1.0.0-beta",
    "1.0.0",
    "1.0.0+build.7",
    "1.2",
    "1.2.3",
    "2.0.0",
    "latest",
    "not-a-version",
];

#[test]
fn test_compare_is_reflexive() {
    for v in SAMPLES {
        assert_eq!(compare(v, v), Ordering::Equal, "{}", v);
    }
}

#[test]
fn test_compare_is_antisymmetric() {
    for a in SAMPLES {
        for b in SAMPLES {
            assert_eq!(compare(a, b), compare(b, a).reverse(), "{} vs {}", a, b);
        }
    }
}

#[test]
fn test_prerelease_ordering() {
    assert_eq!(compare("1.0.0", "1.0.0-alpha"), Ordering::Greater);
    assert_eq!(compare("1.0.0-alpha", "1.0.0-beta"), Ordering::Less);
    assert_eq!(compare("1.0.0-rc.1", "0.9.9"), Ordering::Greater);
}

#[test]
fn test_build_metadata_ignored_in_compare() {
    assert_eq!(compare("1.0.0+a", "1.0.0+b"), Ordering::Equal);
    assert_eq!(compare("1.0.0+build.7", "1.0.0"), Ordering::Equal);
}

#[test]
fn test_latest_sorts_above_releases() {
    assert_eq!(compare("latest", "2.0.0"), Ordering::Greater);
    assert_eq!(compare("latest", "998.999.999"), Ordering::Greater);
    assert_eq!(compare("latest", "999.999.999"), Ordering::Equal);
    assert_eq!(compare("latest", "1000.0.0"), Ordering::Less);
}

#[test]
fn test_unparseable_compares_bytewise() {
    assert_eq!(compare("abc", "abd"), Ordering::Less);
    assert_eq!(compare("1.0.0", "beta"), "1.0.0".cmp("beta"));
}

#[test]
fn test_caret() {
    assert!(satisfies("1.5.2", "^1.2.0"));
    assert!(satisfies("1.2.0", "^1.2.0"));
    assert!(!satisfies("2.0.0", "^1.2.0"));
    assert!(!satisfies("1.1.9", "^1.2.0"));
    // Same-major rule also at zero
    assert!(satisfies("0.9.0", "^0.2.0"));
}

#[test]
fn test_tilde() {
    assert!(satisfies("1.2.5", "~1.2.0"));
    assert!(!satisfies("1.3.0", "~1.2.0"));
    assert!(!satisfies("1.2.0", "~1.2.1"));
}

#[test]
fn test_comparison_operators() {
    assert!(satisfies("1.2.3", ">=1.2.3"));
    assert!(satisfies("1.2.4", ">1.2.3"));
    assert!(!satisfies("1.2.3", ">1.2.3"));
    assert!(satisfies("1.2.2", "<1.2.3"));
    assert!(satisfies("1.2.3", "<=1.2.3"));
    assert!(!satisfies("1.0.0", ">=1.0.1"));
    assert!(satisfies("1.0.0-alpha", "<1.0.0"));
}

#[test]
fn test_wildcards() {
    assert!(satisfies("1.2.9", "1.2.x"));
    assert!(satisfies("1.2.0", "1.2.X"));
    assert!(!satisfies("1.3.0", "1.2.x"));
    // Minor wildcard behaves as a .0 minor
    assert!(satisfies("1.0.7", "1.x"));
    assert!(!satisfies("1.4.0", "1.x"));
}

#[test]
fn test_any_and_exact() {
    assert!(satisfies("0.0.1", "*"));
    assert!(satisfies("garbage", "latest"));
    assert!(satisfies("garbage", "garbage"));
    assert!(!satisfies("garbage", "^1.0.0"));
    assert!(satisfies("1.2.3", "1.2.3"));
    assert!(satisfies("1.2.3-rc.1", "1.2.3"));
    assert!(!satisfies("1.2.4", "1.2.3"));
    assert!(!satisfies("1.2.3", "=1.2.3"));
}

#[test]
fn test_constraint_parse_roundtrip_display() {
    for (input, shown) in [
        ("^1.2.3", "^1.2.3"),
        ("~0.4.0", "~0.4.0"),
        (">=2.0.0", ">=2.0.0"),
        ("1.x", "1.0.x"),
        ("*", "*"),
    ] {
        assert_eq!(Constraint::parse(input).unwrap().to_string(), shown);
    }
}

#[test]
fn test_partial_versions() {
    assert_eq!(Version::parse("3").unwrap(), Version::new(3, 0, 0));
    assert_eq!(Version::parse("3.1").unwrap(), Version::new(3, 1, 0));
    assert!(Version::parse("").is_err());
    assert!(Version::parse("v1.0.0").is_err());
}

#[test]
fn test_latest_as_version_is_not_a_wildcard() {
    assert!(satisfies("1.2.3", "latest"));
    assert!(satisfies("latest", "latest"));
    assert!(satisfies("latest", ">=1.0.0"));
    assert!(!satisfies("latest", "^1.0.0"));
    assert!(!satisfies("latest", "~2.1.0"));
    assert!(!satisfies("latest", "<2.0.0"));
}

//! Ordering laws for release versions.

use airdocs_updater::update::{Version, compare_versions, is_newer};
use proptest::prelude::*;
use std::cmp::Ordering;

fn version_string() -> impl Strategy<Value = String> {
    (
        0u32..30,
        0u32..30,
        0u32..30,
        prop::option::of(prop_oneof![
            Just("alpha".to_owned()),
            Just("beta.2".to_owned()),
            Just("rc.1".to_owned()),
            Just("rc.10".to_owned()),
            (0u32..5).prop_map(|n| n.to_string()),
        ]),
    )
        .prop_map(|(major, minor, patch, pre)| match pre {
            Some(pre) => format!("{major}.{minor}.{patch}-{pre}"),
            None => format!("{major}.{minor}.{patch}"),
        })
}

proptest! {
    #[test]
    fn comparison_is_reflexive(v in version_string()) {
        prop_assert_eq!(compare_versions(&v, &v), 0);
        prop_assert!(!is_newer(&v, &v));
    }

    #[test]
    fn comparison_is_antisymmetric(a in version_string(), b in version_string()) {
        prop_assert_eq!(compare_versions(&a, &b), -compare_versions(&b, &a));
    }

    #[test]
    fn comparison_is_transitive(
        a in version_string(),
        b in version_string(),
        c in version_string(),
    ) {
        let (va, vb, vc) = (Version::parse(&a), Version::parse(&b), Version::parse(&c));
        if va <= vb && vb <= vc {
            prop_assert!(va <= vc);
        }
    }

    #[test]
    fn build_metadata_is_ignored(v in version_string(), build in "[a-z0-9]{1,8}") {
        let with_build = format!("{v}+{build}");
        prop_assert_eq!(Version::parse(&v).cmp(&Version::parse(&with_build)), Ordering::Equal);
    }

    #[test]
    fn release_outranks_its_prerelease(
        major in 0u32..30,
        minor in 0u32..30,
        patch in 0u32..30,
    ) {
        let release = format!("{major}.{minor}.{patch}");
        let pre = format!("{release}-rc.1");
        prop_assert!(is_newer(&pre, &release));
        prop_assert!(!is_newer(&release, &pre));
    }
}

#[test]
fn known_orderings() {
    assert!(is_newer("1.9.3", "2.0.0"));
    assert!(is_newer("1.9.9", "1.10.0"));
    assert!(is_newer("2.0.0-rc.2", "2.0.0-rc.10"));
    assert!(!is_newer("2.0.0", "2.0.0+build.7"));
    assert!(is_newer("garbage", "0.0.1"));
}

use std::cmp::Ordering;

/// Compare two dotted numeric version strings.
///
/// Segments are parsed as integers; anything that does not parse counts as
/// `0`, and the shorter version is padded with zeros. Never fails.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = numeric_components(a);
    let right = numeric_components(b);
    let len = left.len().max(right.len());

    (0..len)
        .map(|i| {
            let l = left.get(i).copied().unwrap_or(0);
            let r = right.get(i).copied().unwrap_or(0);
            l.cmp(&r)
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Sort version strings newest first.
pub fn sort_newest_first(versions: &mut [String]) {
    versions.sort_by(|a, b| compare_versions(b, a).then_with(|| b.cmp(a)));
}

fn numeric_components(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|segment| segment.trim().parse::<u64>().unwrap_or(0))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::*;

    #[test]
    fn test_version_comparison() {
        assert_eq!(compare_versions("1.2.3", "1.2"), Ordering::Greater);
        assert_eq!(compare_versions("1.10.0", "1.9.9"), Ordering::Greater);
        assert_eq!(compare_versions("2.0.0", "1.99.99"), Ordering::Greater);
        assert_eq!(compare_versions("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.2.0.0", "1.2"), Ordering::Equal);
        assert_eq!(compare_versions("0.9", "1.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0.0", "1.0.1"), Ordering::Less);
    }

    #[test]
    fn malformed_segments_degrade_to_zero() {
        assert_eq!(compare_versions("1.x.3", "1.0.3"), Ordering::Equal);
        assert_eq!(compare_versions("", "0"), Ordering::Equal);
        assert_eq!(compare_versions("beta", "0.0.1"), Ordering::Less);
        assert_eq!(compare_versions("1..2", "1.0.2"), Ordering::Equal);
    }

    #[test]
    fn comparison_is_antisymmetric_and_transitive() {
        let versions = ["0.1", "1.0.0", "1.0.1", "1.2", "1.10.0", "2"];
        for a in versions {
            for b in versions {
                assert_eq!(compare_versions(a, b), compare_versions(b, a).reverse());
                for c in versions {
                    if compare_versions(a, b).is_gt() && compare_versions(b, c).is_gt() {
                        assert!(compare_versions(a, c).is_gt(), "{a} > {b} > {c}");
                    }
                }
            }
        }
    }

    #[test]
    fn sort_newest_first_orders_semantically() {
        let mut versions = vec![
            "1.0.0".to_string(),
            "1.10.0".to_string(),
            "1.2.0".to_string(),
            "1.9".to_string(),
        ];
        sort_newest_first(&mut versions);
        assert_eq!(versions, vec!["1.10.0", "1.9", "1.2.0", "1.0.0"]);
    }
}

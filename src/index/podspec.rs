use crate::error::Result;
use crate::model::{DeclaredConstraint, root_name};
use md5::{Digest, Md5};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Shard directories used by the sharded spec repository layout: the first
/// three hex digits of the MD5 of the pod name.
pub fn shard_prefix(pod: &str) -> [char; 3] {
    let digest = format!("{:x}", Md5::digest(pod.as_bytes()));
    let mut chars = digest.chars();
    [
        chars.next().unwrap_or('0'),
        chars.next().unwrap_or('0'),
        chars.next().unwrap_or('0'),
    ]
}

/// `d/a/2` for `Alamofire`
pub fn shard_path(pod: &str) -> String {
    let [a, b, c] = shard_prefix(pod);
    format!("{a}/{b}/{c}")
}

/// `all_pods_versions_d_a_2.txt` for `Alamofire`
pub fn shard_listing_name(pod: &str) -> String {
    let [a, b, c] = shard_prefix(pod);
    format!("all_pods_versions_{a}_{b}_{c}.txt")
}

/// Finds the versions of `pod` in a shard listing where each line reads
/// `Name/1.0.0/1.0.1/...`. Returns `None` when the pod is not listed.
pub fn parse_shard_listing(listing: &str, pod: &str) -> Option<Vec<String>> {
    listing.lines().find_map(|line| {
        let mut parts = line.trim().split('/');
        if parts.next()? != pod {
            return None;
        }
        Some(
            parts
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect(),
        )
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DependencyValue {
    List(Vec<String>),
    Single(String),
}

impl DependencyValue {
    fn requirement(&self) -> Option<String> {
        let joined = match self {
            DependencyValue::List(items) => items.join(", "),
            DependencyValue::Single(item) => item.clone(),
        };
        if joined.trim().is_empty() {
            None
        } else {
            Some(joined)
        }
    }
}

#[derive(Debug, Deserialize)]
struct PodspecNode {
    name: String,
    #[serde(default)]
    dependencies: BTreeMap<String, DependencyValue>,
    #[serde(default)]
    subspecs: Vec<PodspecNode>,
}

/// Extracts the constraints a podspec places on other pods, including the
/// ones declared by its subspecs. References to its own subspecs are skipped.
pub fn parse_podspec(json: &str) -> Result<Vec<DeclaredConstraint>> {
    let spec: PodspecNode = serde_json::from_str(json)?;
    let own_root = root_name(&spec.name).to_string();

    let mut constraints = Vec::new();
    collect_constraints(&spec, &own_root, &mut constraints);
    Ok(constraints)
}

fn collect_constraints(node: &PodspecNode, own_root: &str, out: &mut Vec<DeclaredConstraint>) {
    for (name, value) in &node.dependencies {
        if root_name(name) == own_root {
            continue;
        }
        let constraint = DeclaredConstraint::new(name.as_str(), value.requirement().as_deref());
        if !out.contains(&constraint) {
            out.push(constraint);
        }
    }

    for subspec in &node.subspecs {
        collect_constraints(subspec, own_root, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shards_match_spec_repo_layout() {
        assert_eq!(shard_path("Alamofire"), "d/a/2");
        assert_eq!(shard_listing_name("Alamofire"), "all_pods_versions_d_a_2.txt");
    }

    #[test]
    fn finds_pod_in_shard_listing() {
        let listing = "AlamofireImage/1.0.0/2.0.0\nAlamofire/3.0.0/3.5.1/4.4.0\n";
        assert_eq!(
            parse_shard_listing(listing, "Alamofire"),
            Some(vec![
                "3.0.0".to_string(),
                "3.5.1".to_string(),
                "4.4.0".to_string()
            ])
        );
        assert_eq!(parse_shard_listing(listing, "Nimble"), None);
    }

    #[test]
    fn collects_dependencies_from_subspecs() {
        let json = r#"{
            "name": "AFNetworking",
            "version": "3.1.0",
            "dependencies": { "Bolts": ["~> 1.2", "< 1.9"] },
            "subspecs": [
                {
                    "name": "NSURLSession",
                    "dependencies": {
                        "AFNetworking/Serialization": [],
                        "Mantle": []
                    }
                },
                { "name": "Legacy", "dependencies": { "Bolts": "~> 1.2, < 1.9" } }
            ]
        }"#;

        let constraints = parse_podspec(json).unwrap();
        assert_eq!(
            constraints,
            vec![
                DeclaredConstraint::new("Bolts", Some("~> 1.2, < 1.9")),
                DeclaredConstraint::new("Mantle", None),
            ]
        );
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(parse_podspec("{ not json").is_err());
    }
}

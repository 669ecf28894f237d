//! Content-identifier deduplication.
//!
//! Module images are often byte-identical across releases. Each distinct
//! identifier is copied once, named after the earliest version using it.

use std::collections::{BTreeMap, HashSet};

use a3s_mirror_core::error::{MirrorError, Result};
use semver::Version;

use crate::oci::reference::{ImageLocator, RegistryLocation};
use crate::versions::version_tag;

/// Prefix that marks a content identifier as a digest.
pub const DIGEST_PREFIX: &str = "sha256:";

/// One image to copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Logical image name (`module.image`)
    pub name: String,
    /// Digest or tag
    pub identifier: String,
    /// Earliest version that references the identifier
    pub version: Version,
}

impl WorkItem {
    pub fn is_digest(&self) -> bool {
        self.identifier.starts_with(DIGEST_PREFIX)
    }

    /// Tag the image is stored under.
    ///
    /// Digests are named `v<version>.<name>` so the name survives in
    /// tag-addressed destinations; tags are used as they are.
    pub fn tag(&self) -> String {
        if self.is_digest() {
            format!("{}.{}", version_tag(&self.version), self.name)
        } else {
            self.identifier.clone()
        }
    }

    /// Locator of the image in `registry`.
    pub fn locator(&self, registry: &RegistryLocation) -> ImageLocator {
        let digest = self.is_digest().then_some(self.identifier.as_str());
        registry.image("", Some(&self.tag()), digest)
    }
}

/// Keep one work item per identifier.
///
/// Versions are visited in ascending order and names in name order, so the
/// earliest version referencing an identifier always names it.
pub fn deduplicate(images: &BTreeMap<Version, BTreeMap<String, String>>) -> Vec<WorkItem> {
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for (version, names) in images {
        for (name, identifier) in names {
            if !seen.insert(identifier.as_str()) {
                tracing::debug!(
                    image = %name,
                    identifier = %identifier,
                    version = %version,
                    "Skipping duplicate content"
                );
                continue;
            }
            items.push(WorkItem {
                name: name.clone(),
                identifier: identifier.clone(),
                version: version.clone(),
            });
        }
    }

    items
}

/// Parse a module image manifest `{module: {image: identifier}}` into
/// `module.image -> identifier`.
pub fn parse_module_manifest(image: &str, data: &[u8]) -> Result<BTreeMap<String, String>> {
    let modules: BTreeMap<String, BTreeMap<String, String>> = serde_json::from_slice(data)
        .map_err(|e| MirrorError::MetadataMalformed {
            image: image.to_string(),
            message: e.to_string(),
        })?;

    Ok(modules
        .into_iter()
        .flat_map(|(module, images)| {
            images
                .into_iter()
                .map(move |(image, identifier)| (format!("{}.{}", module, image), identifier))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST_A: &str = "sha256:aaaa";
    const DIGEST_B: &str = "sha256:bbbb";

    fn names(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(n, i)| (n.to_string(), i.to_string()))
            .collect()
    }

    #[test]
    fn test_deduplicate_keeps_earliest_version() {
        let mut images = BTreeMap::new();
        images.insert(
            Version::new(1, 45, 3),
            names(&[("cni.agent", DIGEST_A), ("cni.operator", DIGEST_B)]),
        );
        images.insert(Version::new(1, 44, 1), names(&[("cni.agent", DIGEST_A)]));

        let items = deduplicate(&images);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].identifier, DIGEST_A);
        assert_eq!(items[0].version, Version::new(1, 44, 1));
        assert_eq!(items[1].identifier, DIGEST_B);
        assert_eq!(items[1].version, Version::new(1, 45, 3));
    }

    #[test]
    fn test_deduplicate_is_injective_on_identifier() {
        let mut images = BTreeMap::new();
        for minor in 40..45 {
            images.insert(
                Version::new(1, minor, 0),
                names(&[("a.x", DIGEST_A), ("b.y", DIGEST_A), ("c.z", "v1.40.0")]),
            );
        }

        let items = deduplicate(&images);
        let ids: Vec<&str> = items.iter().map(|i| i.identifier.as_str()).collect();
        assert_eq!(ids, vec![DIGEST_A, "v1.40.0"]);
        assert!(items.iter().all(|i| i.version == Version::new(1, 40, 0)));
        assert_eq!(items[0].name, "a.x");
    }

    #[test]
    fn test_digest_items_are_named_after_version() {
        let item = WorkItem {
            name: "cni.agent".to_string(),
            identifier: DIGEST_A.to_string(),
            version: Version::new(1, 44, 1),
        };
        assert!(item.is_digest());
        assert_eq!(item.tag(), "v1.44.1.cni.agent");

        let locator = item.locator(&RegistryLocation::registry("r.example.com/d8"));
        assert_eq!(locator.tag(), Some("v1.44.1.cni.agent"));
        assert_eq!(locator.digest(), Some(DIGEST_A));
    }

    #[test]
    fn test_tag_items_are_used_directly() {
        let item = WorkItem {
            name: "cni.agent".to_string(),
            identifier: "release-1.2".to_string(),
            version: Version::new(1, 44, 1),
        };
        assert!(!item.is_digest());
        let locator = item.locator(&RegistryLocation::registry("r.example.com/d8"));
        assert_eq!(locator.tag(), Some("release-1.2"));
        assert_eq!(locator.digest(), None);
    }

    #[test]
    fn test_parse_module_manifest() {
        let data = br#"{"cniCilium":{"agent":"sha256:aaaa","operator":"sha256:bbbb"},"common":{"pause":"v3.9"}}"#;
        let parsed = parse_module_manifest("v1.45.3", data).unwrap();
        assert_eq!(
            parsed,
            names(&[
                ("cniCilium.agent", DIGEST_A),
                ("cniCilium.operator", DIGEST_B),
                ("common.pause", "v3.9"),
            ])
        );
    }

    #[test]
    fn test_parse_module_manifest_malformed() {
        let err = parse_module_manifest("v1.45.3", br#"{"cni":"flat"}"#).unwrap_err();
        assert!(matches!(err, MirrorError::MetadataMalformed { .. }));
    }
}

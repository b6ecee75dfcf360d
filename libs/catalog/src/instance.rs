//! Service instance records.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tag::Tag;

/// A single instance of a service as recorded in the catalog.
///
/// The tag list is logically a set but stored as an ordered list; the
/// registry does not enforce uniqueness, only the add operation's pre-check
/// does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Node identifier hosting the instance.
    #[serde(rename = "Node")]
    pub node: String,

    /// Node address (public IP as seen by the scheduler).
    #[serde(rename = "Address")]
    pub address: String,

    /// Named addresses, e.g. "lan" and "wan".
    #[serde(rename = "TaggedAddresses", default)]
    pub tagged_addresses: HashMap<String, String>,

    /// Datacenter the record belongs to.
    #[serde(rename = "Datacenter", default)]
    pub datacenter: String,

    #[serde(rename = "ServiceID")]
    pub service_id: String,

    #[serde(rename = "ServiceName")]
    pub service_name: String,

    /// Ordered list of encoded `key=value` tag strings.
    #[serde(rename = "ServiceTags", default)]
    pub tags: Vec<String>,

    #[serde(rename = "ServicePort")]
    pub port: u16,
}

impl ServiceInstance {
    /// True iff the tag's encoded form is an exact element of the tag list.
    pub fn has_tag(&self, tag: &Tag) -> bool {
        let encoded = tag.encoded();
        self.tags.iter().any(|t| t == &encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(tags: &[&str]) -> ServiceInstance {
        ServiceInstance {
            node: "edge0001".to_string(),
            address: "10.0.0.1".to_string(),
            tagged_addresses: HashMap::new(),
            datacenter: "dc1".to_string(),
            service_id: "wz-1".to_string(),
            service_name: "wz".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            port: 8087,
        }
    }

    #[test]
    fn test_has_tag_exact_match() {
        let inst = instance(&["image=v1", "update=v2"]);
        assert!(inst.has_tag(&Tag::new("image", "v1").unwrap()));
        assert!(!inst.has_tag(&Tag::new("image", "v2").unwrap()));
    }

    #[test]
    fn test_has_tag_no_substring_match() {
        let inst = instance(&["image=v10"]);
        assert!(!inst.has_tag(&Tag::new("image", "v1").unwrap()));
    }
}

//! Service configuration hashes
//!
//! A digest changes whenever anything in the service definition changes, so
//! an engine can tell which containers need recreating after an edit.

use super::config::{Descriptor, ServiceConfig};
use crate::error::Result;
use sha2::{Digest, Sha256};

/// SHA-256 over the canonical JSON encoding of a service, hex encoded
pub fn service_digest(service: &ServiceConfig) -> Result<String> {
    let encoded = serde_json::to_vec(service)?;
    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Digest of every service, in declaration order
pub fn descriptor_digests(descriptor: &Descriptor) -> Result<Vec<(String, String)>> {
    descriptor
        .services
        .iter()
        .map(|(name, service)| service_digest(service).map(|digest| (name.to_string(), digest)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable() {
        let a = ServiceConfig::new("postgres:15").volume("db:/data");
        let b = ServiceConfig::new("postgres:15").volume("db:/data");
        let digest = service_digest(&a).unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, service_digest(&b).unwrap());
    }

    #[test]
    fn test_digest_changes_with_config() {
        let a = ServiceConfig::new("postgres:15");
        let b = ServiceConfig::new("postgres:16");
        assert_ne!(service_digest(&a).unwrap(), service_digest(&b).unwrap());
    }

    #[test]
    fn test_descriptor_digests_follow_declaration_order() {
        let mut d = Descriptor::default();
        d.services.insert("b".to_string(), ServiceConfig::new("b"));
        d.services.insert("a".to_string(), ServiceConfig::new("a"));
        let names: Vec<String> = descriptor_digests(&d)
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}

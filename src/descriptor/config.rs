//! Deployment descriptor configuration types

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Deployment descriptor file configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Format version marker
    #[serde(
        default,
        deserialize_with = "version_marker",
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<String>,
    /// Project name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Services
    #[serde(default, deserialize_with = "null_as_default")]
    pub services: IndexMap<String, ServiceConfig>,
    /// Named volumes
    #[serde(
        default,
        deserialize_with = "null_as_default",
        serialize_with = "default_as_null"
    )]
    pub volumes: IndexMap<String, VolumeConfig>,
    /// Keys this loader does not interpret
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Accepts `version: "3.8"` as well as the bare number `version: 3.8`
fn version_marker<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(serde::de::Error::custom(
            "format version must be a string or a number",
        )),
    }
}

/// `db:` under `volumes` declares a volume with default settings
fn null_as_default<'de, D, T>(deserializer: D) -> Result<IndexMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    let entries = Option::<IndexMap<String, Option<T>>>::deserialize(deserializer)?;
    Ok(entries
        .unwrap_or_default()
        .into_iter()
        .map(|(name, entry)| (name, entry.unwrap_or_default()))
        .collect())
}

fn default_as_null<S, T>(
    entries: &IndexMap<String, T>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Default + PartialEq + Serialize,
{
    let default = T::default();
    serializer.collect_map(
        entries
            .iter()
            .map(|(name, entry)| (name, (*entry != default).then_some(entry))),
    )
}

/// Service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Image reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Environment file(s)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<EnvFileConfig>,
    /// Services that must be available first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<DependsOnConfig>,
    /// Port mappings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<PortConfig>>,
    /// Volume bindings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<VolumeMount>>,
    /// Restart policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
    /// Keys this loader does not interpret
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ServiceConfig {
    /// Create a service running the given image
    pub fn new(image: &str) -> Self {
        Self {
            image: Some(image.to_string()),
            ..Self::default()
        }
    }

    /// Add a dependency on another service
    pub fn depends_on(mut self, service: &str) -> Self {
        match self.depends_on {
            Some(DependsOnConfig::Array(ref mut names)) => names.push(service.to_string()),
            Some(DependsOnConfig::Map(ref mut map)) => {
                map.insert(service.to_string(), DependsOnCondition::default());
            }
            None => self.depends_on = Some(DependsOnConfig::Array(vec![service.to_string()])),
        }
        self
    }

    /// Add a port mapping in short syntax
    pub fn port(mut self, spec: &str) -> Self {
        self.ports
            .get_or_insert_with(Vec::new)
            .push(PortConfig::Short(spec.to_string()));
        self
    }

    /// Add a volume binding in short syntax
    pub fn volume(mut self, spec: &str) -> Self {
        self.volumes
            .get_or_insert_with(Vec::new)
            .push(VolumeMount::Short(spec.to_string()));
        self
    }

    /// Set the restart policy
    pub fn restart(mut self, policy: &str) -> Self {
        self.restart = Some(policy.to_string());
        self
    }

    /// Set a single env file
    pub fn env_file(mut self, path: &str) -> Self {
        self.env_file = Some(EnvFileConfig::Single(path.to_string()));
        self
    }

    /// Env file paths in declaration order
    pub fn env_files(&self) -> Vec<&str> {
        match &self.env_file {
            Some(EnvFileConfig::Single(path)) => vec![path.as_str()],
            Some(EnvFileConfig::Multiple(paths)) => paths.iter().map(|p| p.as_str()).collect(),
            None => Vec::new(),
        }
    }

    /// Names of the services this one depends on, in declaration order
    pub fn dependency_names(&self) -> Vec<&str> {
        match &self.depends_on {
            Some(DependsOnConfig::Array(names)) => names.iter().map(|n| n.as_str()).collect(),
            Some(DependsOnConfig::Map(map)) => map.keys().map(|n| n.as_str()).collect(),
            None => Vec::new(),
        }
    }
}

/// Env file configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvFileConfig {
    /// Single file
    Single(String),
    /// Multiple files
    Multiple(Vec<String>),
}

/// Depends on configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependsOnConfig {
    /// Array of service names
    Array(Vec<String>),
    /// Map of service to condition
    Map(IndexMap<String, DependsOnCondition>),
}

/// Depends on condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependsOnCondition {
    /// Condition to wait for
    #[serde(default = "default_condition")]
    pub condition: String,
}

pub const CONDITION_STARTED: &str = "service_started";
pub const CONDITION_HEALTHY: &str = "service_healthy";
pub const CONDITION_COMPLETED: &str = "service_completed_successfully";

/// Conditions a long-form `depends_on` entry may wait for
pub const DEPENDENCY_CONDITIONS: &[&str] =
    &[CONDITION_STARTED, CONDITION_HEALTHY, CONDITION_COMPLETED];

fn default_condition() -> String {
    CONDITION_STARTED.to_string()
}

impl Default for DependsOnCondition {
    fn default() -> Self {
        Self {
            condition: default_condition(),
        }
    }
}

/// Port configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortConfig {
    /// Short syntax: "8080:80"
    Short(String),
    /// Bare container port: 80
    Number(u64),
    /// Long syntax
    Long(PortConfigLong),
}

impl fmt::Display for PortConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortConfig::Short(spec) => write!(f, "{}", spec),
            PortConfig::Number(port) => write!(f, "{}", port),
            PortConfig::Long(long) => {
                write!(f, "target={}", long.target)?;
                if let Some(published) = &long.published {
                    write!(f, ",published={}", published)?;
                }
                if let Some(ip) = &long.host_ip {
                    write!(f, ",host_ip={}", ip)?;
                }
                if let Some(protocol) = &long.protocol {
                    write!(f, ",protocol={}", protocol)?;
                }
                Ok(())
            }
        }
    }
}

/// Long port configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortConfigLong {
    /// Target port in container
    pub target: u64,
    /// Published port (or range) on host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<PortValue>,
    /// Host IP to bind to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    /// Protocol (tcp/udp/sctp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// A port written as a number or as a string such as "8000-8010"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u64),
    Text(String),
}

impl fmt::Display for PortValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortValue::Number(n) => write!(f, "{}", n),
            PortValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Volume mount configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VolumeMount {
    /// Short syntax: "source:target:mode"
    Short(String),
    /// Long syntax
    Long(VolumeMountLong),
}

impl fmt::Display for VolumeMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeMount::Short(spec) => write!(f, "{}", spec),
            VolumeMount::Long(long) => {
                let mut parts = Vec::new();
                if let Some(t) = &long.mount_type {
                    parts.push(format!("type={}", t));
                }
                if let Some(s) = &long.source {
                    parts.push(format!("source={}", s));
                }
                if let Some(t) = &long.target {
                    parts.push(format!("target={}", t));
                }
                if long.read_only == Some(true) {
                    parts.push("read_only".to_string());
                }
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

/// Long volume mount configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeMountLong {
    /// Mount type (volume, bind, tmpfs)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mount_type: Option<String>,
    /// Source path or volume name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Target path in container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Read only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
}

/// Volume configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Driver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Driver options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_opts: Option<BTreeMap<String, String>>,
    /// External volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalConfig>,
    /// Labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    /// Name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl VolumeConfig {
    pub fn is_external(&self) -> bool {
        match &self.external {
            Some(ExternalConfig::Bool(external)) => *external,
            Some(ExternalConfig::Named { .. }) => true,
            None => false,
        }
    }
}

/// External resource configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalConfig {
    /// Boolean
    Bool(bool),
    /// With name
    Named { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_accepts_number_and_string() {
        let d: Descriptor = serde_yaml::from_str("version: 3.8\nservices: {}\n").unwrap();
        assert_eq!(d.version.as_deref(), Some("3.8"));

        let d: Descriptor = serde_yaml::from_str("version: '2'\n").unwrap();
        assert_eq!(d.version.as_deref(), Some("2"));

        let d: Descriptor = serde_yaml::from_str("services: {}\n").unwrap();
        assert_eq!(d.version, None);
    }

    #[test]
    fn test_volume_declarations_accept_null() {
        let yaml = r#"
volumes:
  db:
  export: {}
  upload:
    driver: local
"#;
        let d: Descriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(d.volumes.len(), 3);
        assert_eq!(d.volumes["db"], VolumeConfig::default());
        assert_eq!(d.volumes["export"], VolumeConfig::default());
        assert_eq!(
            d.volumes.get("upload").unwrap().driver.as_deref(),
            Some("local")
        );
    }

    #[test]
    fn test_entries_keep_declaration_order() {
        let d: Descriptor =
            serde_yaml::from_str("services:\n  zeta:\n    image: z\n  alpha:\n    image: a\n")
                .unwrap();
        assert_eq!(d.services.keys().collect::<Vec<_>>(), vec!["zeta", "alpha"]);

        let d: Descriptor = serde_yaml::from_str("services:\nvolumes:\n").unwrap();
        assert!(d.services.is_empty());
        assert!(d.volumes.is_empty());
    }

    #[test]
    fn test_default_volumes_serialize_as_null() {
        let mut d = Descriptor::default();
        d.volumes.insert("db".to_string(), VolumeConfig::default());
        d.volumes.insert(
            "big".to_string(),
            VolumeConfig {
                driver: Some("local".to_string()),
                ..VolumeConfig::default()
            },
        );
        let json = serde_json::to_value(&d).unwrap();
        assert!(json["volumes"]["db"].is_null());
        assert_eq!(json["volumes"]["big"]["driver"], "local");
    }

    #[test]
    fn test_depends_on_forms() {
        let yaml = r#"
services:
  a:
    image: a
    depends_on: [b, c]
  b:
    image: b
    depends_on:
      c:
        condition: service_healthy
  c:
    image: c
"#;
        let d: Descriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            d.services.get("a").unwrap().dependency_names(),
            vec!["b", "c"]
        );
        let b = d.services.get("b").unwrap();
        assert_eq!(b.dependency_names(), vec!["c"]);
        match &b.depends_on {
            Some(DependsOnConfig::Map(map)) => {
                assert_eq!(map.get("c").unwrap().condition, CONDITION_HEALTHY)
            }
            other => panic!("unexpected depends_on: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_keys_are_kept() {
        let yaml = r#"
x-common: &common
  restart: always
services:
  web:
    image: nginx
    healthcheck:
      test: ["CMD", "true"]
"#;
        let d: Descriptor = serde_yaml::from_str(yaml).unwrap();
        assert!(d.extra.contains_key("x-common"));
        assert!(d.services.get("web").unwrap().extra.contains_key("healthcheck"));
    }

    #[test]
    fn test_port_and_mount_forms() {
        let yaml = r#"
services:
  web:
    image: nginx
    ports:
      - "8080:80"
      - 443
      - target: 53
        published: "5353"
        protocol: udp
    volumes:
      - data:/data
      - type: bind
        source: ./conf
        target: /etc/nginx
        read_only: true
"#;
        let d: Descriptor = serde_yaml::from_str(yaml).unwrap();
        let web = d.services.get("web").unwrap();
        let ports = web.ports.as_ref().unwrap();
        assert_eq!(ports[0], PortConfig::Short("8080:80".to_string()));
        assert_eq!(ports[1], PortConfig::Number(443));
        assert!(matches!(ports[2], PortConfig::Long(_)));
        assert_eq!(
            ports[2].to_string(),
            "target=53,published=5353,protocol=udp"
        );

        let volumes = web.volumes.as_ref().unwrap();
        assert_eq!(volumes[0].to_string(), "data:/data");
        assert_eq!(
            volumes[1].to_string(),
            "type=bind,source=./conf,target=/etc/nginx,read_only"
        );
    }

    #[test]
    fn test_builder_helpers() {
        let service = ServiceConfig::new("app:1")
            .depends_on("db")
            .depends_on("cache")
            .port("80:80")
            .volume("data:/data")
            .restart("always")
            .env_file("app.env");
        assert_eq!(service.dependency_names(), vec!["db", "cache"]);
        assert_eq!(service.env_files(), vec!["app.env"]);
        assert_eq!(service.restart.as_deref(), Some("always"));
    }
}

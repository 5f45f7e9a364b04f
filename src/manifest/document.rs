use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, fs, path::Path};

pub const MANIFEST_CONTEXT: &str = "https://w3id.org/ro/crate/1.1/context";
pub const ENVIRONMENT_NODE_TYPE: &str = "SoftwareEnvironment";
pub const NO_CONDA_ENVIRONMENT: &str = "Not in a Conda environment or CONDA_DEFAULT_ENV not set.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestDocument {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "@graph")]
    pub graph: Vec<SoftwareEnvironment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SoftwareEnvironment {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub node_type: String,
    pub python_version: String,
    pub platform: String,
    pub conda_environment: CondaEnvironment,
    pub pip_packages: PipPackages,
    pub data_urls: Vec<String>,
    pub seeds: Map<String, Value>,
}

/// Package specifiers, or the inline error recorded when listing failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PipPackages {
    Listed(Vec<String>),
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CondaEnvironment {
    Exported { name: String, export: String },
    Note(String),
}

impl ManifestDocument {
    pub fn new(environment: SoftwareEnvironment) -> Self {
        Self {
            context: MANIFEST_CONTEXT.into(),
            graph: vec![environment],
        }
    }

    pub fn environment(&self) -> Option<&SoftwareEnvironment> {
        self.graph
            .iter()
            .find(|node| node.node_type == ENVIRONMENT_NODE_TYPE)
    }

    /// Pretty JSON with four-space indentation; field order is fixed by the
    /// struct layout.
    pub fn to_json(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)
            .context("failed to serialize manifest")?;
        String::from_utf8(buf).context("manifest serialized to invalid UTF-8")
    }

    /// Overwrites `path`, creating parent directories as needed.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create manifest directory {}", parent.display())
            })?;
        }
        let json = self.to_json()?;
        fs::write(path, json)
            .with_context(|| format!("Error writing manifest file to {}", path.display()))
    }

    /// Reads a manifest back. Graph nodes of other types are skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let value: Value = serde_json::from_str(&raw)
            .with_context(|| format!("manifest {} is not valid JSON", path.display()))?;

        let context = value
            .get("@context")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("manifest {} has no @context", path.display()))?
            .to_string();

        let graph = value
            .get("@graph")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("manifest {} has no @graph", path.display()))?
            .iter()
            .filter(|node| {
                node.get("@type").and_then(Value::as_str) == Some(ENVIRONMENT_NODE_TYPE)
            })
            .map(|node| serde_json::from_value(node.clone()))
            .collect::<Result<Vec<SoftwareEnvironment>, _>>()
            .with_context(|| format!("malformed environment node in {}", path.display()))?;

        Ok(Self { context, graph })
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PackageChange {
    pub name: String,
    pub recorded: String,
    pub current: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PackageDrift {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<PackageChange>,
}

impl PackageDrift {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Normalized distribution name of a requirement specifier
/// (`Torch_Vision==0.1` -> `torch-vision`).
fn package_name(spec: &str) -> String {
    let end = spec
        .find(|c: char| matches!(c, '=' | '<' | '>' | '!' | '~' | ' ' | '@' | ';' | '['))
        .unwrap_or(spec.len());
    spec[..end].trim().to_ascii_lowercase().replace('_', "-")
}

/// Compares two package lists by name. `None` when either side only holds
/// an error string.
pub fn package_drift(recorded: &PipPackages, current: &PipPackages) -> Option<PackageDrift> {
    let (PipPackages::Listed(recorded), PipPackages::Listed(current)) = (recorded, current) else {
        return None;
    };

    let index = |specs: &[String]| -> BTreeMap<String, String> {
        specs
            .iter()
            .map(|spec| (package_name(spec), spec.clone()))
            .collect()
    };
    let before = index(recorded);
    let after = index(current);

    let mut drift = PackageDrift::default();
    for (name, spec) in &after {
        match before.get(name) {
            None => drift.added.push(spec.clone()),
            Some(old) if old != spec => drift.changed.push(PackageChange {
                name: name.clone(),
                recorded: old.clone(),
                current: spec.clone(),
            }),
            Some(_) => {}
        }
    }
    drift.removed = before
        .iter()
        .filter(|(name, _)| !after.contains_key(*name))
        .map(|(_, spec)| spec.clone())
        .collect();

    Some(drift)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listed(specs: &[&str]) -> PipPackages {
        PipPackages::Listed(specs.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn names_are_normalized() {
        assert_eq!(package_name("Torch_Vision==0.17.0"), "torch-vision");
        assert_eq!(package_name("numpy>=1.26"), "numpy");
        assert_eq!(package_name("mypkg @ file:///tmp/mypkg"), "mypkg");
        assert_eq!(package_name("requests[socks]==2.31"), "requests");
    }

    #[test]
    fn drift_reports_added_removed_and_changed() {
        let drift = package_drift(
            &listed(&["numpy==1.26.0", "torch==2.1.0", "tqdm==4.66.1"]),
            &listed(&["numpy==1.26.4", "torch==2.1.0", "rich==13.7.0"]),
        )
        .unwrap();

        assert_eq!(drift.added, vec!["rich==13.7.0"]);
        assert_eq!(drift.removed, vec!["tqdm==4.66.1"]);
        assert_eq!(
            drift.changed,
            vec![PackageChange {
                name: "numpy".into(),
                recorded: "numpy==1.26.0".into(),
                current: "numpy==1.26.4".into(),
            }]
        );
        assert!(!drift.is_empty());
    }

    #[test]
    fn identical_lists_have_no_drift() {
        let packages = listed(&["numpy==1.26.0"]);
        assert!(package_drift(&packages, &packages).unwrap().is_empty());
    }

    #[test]
    fn drift_unavailable_when_listing_failed() {
        let failed = PipPackages::Failed("Error: pip command not found.".into());
        assert!(package_drift(&failed, &listed(&["numpy==1"])).is_none());
    }

    #[test]
    fn untagged_fields_round_trip() {
        let env = SoftwareEnvironment {
            id: "#environment".into(),
            node_type: ENVIRONMENT_NODE_TYPE.into(),
            python_version: "Python 3.11.4".into(),
            platform: "Linux-6.1-x86_64".into(),
            conda_environment: CondaEnvironment::Exported {
                name: "ml".into(),
                export: "name: ml".into(),
            },
            pip_packages: PipPackages::Failed("Error: boom".into()),
            data_urls: vec![],
            seeds: Map::new(),
        };
        let doc = ManifestDocument::new(env);
        let parsed: ManifestDocument = serde_json::from_str(&doc.to_json().unwrap()).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn json_uses_four_space_indent_and_fixed_order() {
        let doc = ManifestDocument::new(SoftwareEnvironment {
            id: "#environment".into(),
            node_type: ENVIRONMENT_NODE_TYPE.into(),
            python_version: "3".into(),
            platform: "p".into(),
            conda_environment: CondaEnvironment::Note(NO_CONDA_ENVIRONMENT.into()),
            pip_packages: PipPackages::Listed(vec![]),
            data_urls: vec![],
            seeds: Map::new(),
        });
        let json = doc.to_json().unwrap();
        assert!(json.starts_with("{\n    \"@context\""));
        let context_at = json.find("@context").unwrap();
        let graph_at = json.find("@graph").unwrap();
        let python_at = json.find("python_version").unwrap();
        let seeds_at = json.find("seeds").unwrap();
        assert!(context_at < graph_at && python_at < seeds_at);
    }
}

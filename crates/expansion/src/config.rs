use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::candidate::DEFAULT_THRESHOLD;
use crate::error::ExpansionError;

/// Knobs of the round-based arbitration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationConfig {
    /// Improvement density a grown window must strictly exceed
    pub threshold: f32,

    /// Units added per growth operation
    pub step: usize,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            step: 1,
        }
    }
}

/// Which candidates of a cluster make it into the output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionPolicy {
    /// A cluster whose summed score exceeds this keeps every candidate
    pub cluster_threshold: f32,

    /// Otherwise, only candidates scoring above this are kept
    pub candidate_threshold: f32,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            cluster_threshold: 10.0,
            candidate_threshold: 2.0,
        }
    }
}

/// How clusters are admitted for expansion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum RetrievalMethod {
    /// The `k` clusters closest to the query
    TopK {
        #[serde(default = "default_top_k")]
        k: usize,
    },

    /// Every cluster whose similarity exceeds `min_similarity`
    Threshold {
        #[serde(default = "default_min_similarity")]
        min_similarity: f32,
    },
}

impl Default for RetrievalMethod {
    fn default() -> Self {
        Self::Threshold {
            min_similarity: default_min_similarity(),
        }
    }
}

const fn default_top_k() -> usize {
    7
}

const fn default_min_similarity() -> f32 {
    0.5
}

/// Complete expansion configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    pub schema_version: u32,
    pub arbitration: ArbitrationConfig,
    pub selection: SelectionPolicy,
    pub retrieval: RetrievalMethod,

    /// Candidates scoring at or below this are dropped by the filter pass
    pub filter_threshold: f32,

    /// Score pivot of the merge pass: only windows on the same side merge
    pub merge_threshold: f32,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            arbitration: ArbitrationConfig::default(),
            selection: SelectionPolicy::default(),
            retrieval: RetrievalMethod::default(),
            filter_threshold: -5.0,
            merge_threshold: 2.0,
        }
    }
}

impl ExpansionConfig {
    /// Load from a JSON or TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read expansion config {}", path.display()))?;
        Self::from_bytes(&bytes)
            .with_context(|| format!("Invalid expansion config {}", path.display()))
    }

    /// Parse JSON, falling back to TOML; missing fields take their defaults
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let value = parse_value(bytes)?;
        validate_config_value(&value)?;
        let config: Self =
            serde_json::from_value(value).map_err(|err| anyhow!("Config parse error: {err}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges that serde cannot express
    pub fn validate(&self) -> crate::Result<()> {
        if self.schema_version != 1 {
            return Err(ExpansionError::InvalidConfig(format!(
                "schema_version {} is not supported (expected 1)",
                self.schema_version
            )));
        }

        let finite = [
            ("arbitration.threshold", self.arbitration.threshold),
            ("selection.cluster_threshold", self.selection.cluster_threshold),
            ("selection.candidate_threshold", self.selection.candidate_threshold),
            ("filter_threshold", self.filter_threshold),
            ("merge_threshold", self.merge_threshold),
        ];
        if let Some((name, value)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ExpansionError::InvalidConfig(format!(
                "{name} must be finite, got {value}"
            )));
        }

        if self.arbitration.threshold < 0.0 {
            return Err(ExpansionError::InvalidConfig(format!(
                "arbitration.threshold must be >= 0, got {}",
                self.arbitration.threshold
            )));
        }
        if self.arbitration.step == 0 {
            return Err(ExpansionError::InvalidConfig(
                "arbitration.step must be > 0".to_string(),
            ));
        }

        match self.retrieval {
            RetrievalMethod::TopK { k: 0 } => Err(ExpansionError::InvalidConfig(
                "retrieval.k must be > 0".to_string(),
            )),
            RetrievalMethod::Threshold { min_similarity } if !min_similarity.is_finite() => {
                Err(ExpansionError::InvalidConfig(format!(
                    "retrieval.min_similarity must be finite, got {min_similarity}"
                )))
            }
            _ => Ok(()),
        }
    }
}

fn parse_value(bytes: &[u8]) -> Result<serde_json::Value> {
    let json_err = match serde_json::from_slice(bytes) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };
    let text = std::str::from_utf8(bytes)
        .with_context(|| format!("Config is neither JSON ({json_err}) nor UTF-8 text"))?;
    let table: toml::Table = toml::from_str(text)
        .map_err(|toml_err| anyhow!("Config is not valid JSON ({json_err}) or TOML ({toml_err})"))?;
    serde_json::to_value(table).context("TOML config has no JSON representation")
}

fn validate_config_value(value: &serde_json::Value) -> Result<()> {
    fn validate_object_keys(
        unknown: &mut Vec<String>,
        obj: &serde_json::Map<String, serde_json::Value>,
        base: &str,
        allowed: &[&str],
    ) {
        for key in obj.keys() {
            if !allowed.iter().any(|a| a == &key.as_str()) {
                if base.is_empty() {
                    unknown.push(key.to_string());
                } else {
                    unknown.push(format!("{base}.{key}"));
                }
            }
        }
    }

    let serde_json::Value::Object(root) = value else {
        return Err(anyhow!("Expansion config must be a JSON object"));
    };

    let mut unknown = Vec::new();
    validate_object_keys(
        &mut unknown,
        root,
        "",
        &[
            "schema_version",
            "arbitration",
            "selection",
            "retrieval",
            "filter_threshold",
            "merge_threshold",
        ],
    );

    let sections: [(&str, &[&str]); 3] = [
        ("arbitration", &["threshold", "step"]),
        ("selection", &["cluster_threshold", "candidate_threshold"]),
        ("retrieval", &["method", "k", "min_similarity"]),
    ];
    for (name, allowed) in sections {
        if let Some(serde_json::Value::Object(section)) = root.get(name) {
            validate_object_keys(&mut unknown, section, name, allowed);
        }
    }

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "Expansion config has unknown fields: {}",
            unknown.join(", ")
        ))
    }
}

use crate::error::{ReconError, Result};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_rate() -> Decimal {
    Decimal::new(5, 3)
}

fn default_floor() -> Decimal {
    Decimal::TEN
}

fn default_tree_count() -> usize {
    100
}

fn default_sample_size() -> usize {
    256
}

fn default_contamination() -> f64 {
    0.05
}

fn default_seed() -> u64 {
    42
}

/// Declarative selection rule deciding which subledger transactions roll up
/// into a logical account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase", tag = "kind")]
pub enum SubledgerRule {
    #[schemars(
        description = "Selects transactions whose recognition status contains any of the given values (e.g. ['Deferred', 'Partially'])."
    )]
    ByRecognitionStatus { values: Vec<String> },

    #[schemars(description = "Selects transactions whose source equals the given value exactly (e.g. 'AR Invoice').")]
    BySource { value: String },

    #[schemars(
        description = "Selects transactions whose item/account field contains the given substring (e.g. 'Bank')."
    )]
    ByTag { substring: String },

    #[schemars(description = "Matches when every nested rule matches.")]
    All { rules: Vec<SubledgerRule> },

    #[schemars(description = "Matches when at least one nested rule matches.")]
    Any { rules: Vec<SubledgerRule> },

    #[schemars(description = "Inverts the nested rule.")]
    Not { rule: Box<SubledgerRule> },

    #[schemars(description = "Selects every transaction in the subledger.")]
    Everything,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ToleranceParams {
    #[serde(default = "default_rate")]
    #[schemars(description = "Relative tolerance applied to the absolute GL balance. Defaults to 0.005 (0.5%).")]
    pub rate: Decimal,

    #[serde(default = "default_floor")]
    #[schemars(description = "Minimum absolute tolerance, used whenever the relative tolerance is smaller. Defaults to 10.")]
    pub floor: Decimal,
}

impl Default for ToleranceParams {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            floor: default_floor(),
        }
    }
}

impl ToleranceParams {
    pub fn validate(&self, logical_name: &str) -> Result<()> {
        if self.rate.is_sign_negative() {
            return Err(ReconError::config(
                logical_name,
                "rate",
                format!("tolerance rate must not be negative, got {}", self.rate),
            ));
        }
        if self.floor.is_sign_negative() {
            return Err(ReconError::config(
                logical_name,
                "floor",
                format!("tolerance floor must not be negative, got {}", self.floor),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct AnomalyParams {
    #[serde(default = "default_tree_count")]
    #[schemars(description = "Number of random partition trees in the ensemble.")]
    pub tree_count: usize,

    #[serde(default = "default_sample_size")]
    #[schemars(
        description = "Points drawn per tree. Sampled without replacement, or with replacement when the population is smaller."
    )]
    pub sample_size: usize,

    #[serde(default = "default_contamination")]
    #[schemars(description = "Expected fraction of anomalous transactions, between 0.0 and 0.5.")]
    pub contamination: f64,

    #[serde(default = "default_seed")]
    #[schemars(description = "Seed for the random source. Identical seeds reproduce identical scores.")]
    pub seed: u64,
}

impl Default for AnomalyParams {
    fn default() -> Self {
        Self {
            tree_count: default_tree_count(),
            sample_size: default_sample_size(),
            contamination: default_contamination(),
            seed: default_seed(),
        }
    }
}

impl AnomalyParams {
    pub fn validate(&self) -> Result<()> {
        if self.tree_count == 0 {
            return Err(ReconError::InvalidParameter {
                name: "tree_count".to_string(),
                value: self.tree_count.to_string(),
                details: "at least one tree is required".to_string(),
            });
        }
        if self.sample_size < 2 {
            return Err(ReconError::InvalidParameter {
                name: "sample_size".to_string(),
                value: self.sample_size.to_string(),
                details: "each tree needs at least two points".to_string(),
            });
        }
        if !(0.0..=0.5).contains(&self.contamination) {
            return Err(ReconError::InvalidParameter {
                name: "contamination".to_string(),
                value: self.contamination.to_string(),
                details: "must be between 0.0 and 0.5".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum DuplicateGlPolicy {
    #[default]
    #[schemars(description = "The first ledger row for an account is authoritative; later duplicates are ignored and reported.")]
    FirstMatch,

    #[schemars(description = "Any account with more than one ledger row aborts the run.")]
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct MappingConfig {
    #[schemars(description = "Human-facing account name, e.g. 'Accounts Receivable'. Must be unique.")]
    pub logical_name: String,

    #[schemars(description = "General ledger account identifier, e.g. '1200'.")]
    pub gl_account_id: String,

    #[schemars(description = "Rule selecting the subledger transactions that make up this account.")]
    pub rule: SubledgerRule,

    #[serde(default)]
    #[schemars(description = "Overrides the global tolerance rate for this account.")]
    pub rate: Option<Decimal>,

    #[serde(default)]
    #[schemars(description = "Overrides the global tolerance floor for this account.")]
    pub floor: Option<Decimal>,
}

impl MappingConfig {
    pub fn new(
        logical_name: impl Into<String>,
        gl_account_id: impl Into<String>,
        rule: SubledgerRule,
    ) -> Self {
        Self {
            logical_name: logical_name.into(),
            gl_account_id: gl_account_id.into(),
            rule,
            rate: None,
            floor: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ReconciliationConfig {
    #[serde(default)]
    #[schemars(description = "Name of the reporting entity, used in report headings.")]
    pub entity_name: String,

    #[serde(default)]
    #[schemars(
        description = "Reporting period as YYYY-MM or YYYY-MM-DD. When set, ledger records from other periods are ignored."
    )]
    pub period: Option<String>,

    #[serde(default)]
    pub tolerance: ToleranceParams,

    #[serde(default)]
    pub duplicate_gl_policy: DuplicateGlPolicy,

    #[serde(default)]
    pub anomaly: AnomalyParams,

    #[schemars(description = "Logical accounts in reporting order.")]
    pub mappings: Vec<MappingConfig>,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            entity_name: String::new(),
            period: None,
            tolerance: ToleranceParams::default(),
            duplicate_gl_policy: DuplicateGlPolicy::default(),
            anomaly: AnomalyParams::default(),
            mappings: Self::default_account_mappings(),
        }
    }
}

impl ReconciliationConfig {
    /// The four logical accounts reconciled in a typical month-end close.
    pub fn default_account_mappings() -> Vec<MappingConfig> {
        vec![
            MappingConfig::new(
                "Deferred Revenue - Current",
                "2200",
                SubledgerRule::ByRecognitionStatus {
                    values: vec!["Deferred".to_string(), "Partially".to_string()],
                },
            ),
            MappingConfig::new(
                "Deferred Revenue - Long Term",
                "2210",
                SubledgerRule::ByRecognitionStatus {
                    values: vec!["Deferred".to_string(), "Partially".to_string()],
                },
            ),
            MappingConfig::new(
                "Accounts Receivable",
                "1200",
                SubledgerRule::BySource {
                    value: "AR Invoice".to_string(),
                },
            ),
            MappingConfig::new(
                "Bank - Operating - USD",
                "1010",
                SubledgerRule::ByTag {
                    substring: "Bank".to_string(),
                },
            ),
        ]
    }

    pub fn from_json_str(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_toml_str(input: &str) -> Result<Self> {
        Ok(toml::from_str(input)?)
    }

    /// Loads a configuration file, choosing the format from the extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&contents),
            _ => Self::from_json_str(&contents),
        }
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ReconciliationConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_generation() {
        let schema_json = ReconciliationConfig::schema_as_json().unwrap();
        assert!(schema_json.contains("logical_name"));
        assert!(schema_json.contains("gl_account_id"));
        assert!(schema_json.contains("ByRecognitionStatus"));
    }

    #[test]
    fn test_json_config_with_defaults() {
        let json = r#"{
            "entity_name": "Acme",
            "mappings": [
                {
                    "logical_name": "Accounts Receivable",
                    "gl_account_id": "1200",
                    "rule": { "kind": "BySource", "value": "AR Invoice" }
                }
            ]
        }"#;

        let config = ReconciliationConfig::from_json_str(json).unwrap();
        assert_eq!(config.entity_name, "Acme");
        assert_eq!(config.tolerance.rate, Decimal::new(5, 3));
        assert_eq!(config.tolerance.floor, Decimal::TEN);
        assert_eq!(config.anomaly.tree_count, 100);
        assert_eq!(config.anomaly.seed, 42);
        assert_eq!(config.duplicate_gl_policy, DuplicateGlPolicy::FirstMatch);
        assert_eq!(
            config.mappings[0].rule,
            SubledgerRule::BySource {
                value: "AR Invoice".to_string()
            }
        );
    }

    #[test]
    fn test_toml_config_with_overrides() {
        let input = r#"
entity_name = "Acme"
period = "2025-11"
duplicate_gl_policy = "Reject"

[tolerance]
rate = 0.01
floor = 25

[anomaly]
tree_count = 50
seed = 7

[[mappings]]
logical_name = "Bank - Operating - USD"
gl_account_id = "1010"
floor = 1
rule = { kind = "ByTag", substring = "Bank" }

[[mappings]]
logical_name = "Deferred Revenue"
gl_account_id = "2200"

[mappings.rule]
kind = "Not"
rule = { kind = "BySource", value = "Manual" }
"#;

        let config = ReconciliationConfig::from_toml_str(input).unwrap();
        assert_eq!(config.period.as_deref(), Some("2025-11"));
        assert_eq!(config.duplicate_gl_policy, DuplicateGlPolicy::Reject);
        assert_eq!(config.tolerance.rate, Decimal::new(1, 2));
        assert_eq!(config.tolerance.floor, Decimal::from(25));
        assert_eq!(config.anomaly.tree_count, 50);
        assert_eq!(config.anomaly.sample_size, 256);
        assert_eq!(config.mappings.len(), 2);
        assert_eq!(config.mappings[0].floor, Some(Decimal::ONE));
        assert!(matches!(config.mappings[1].rule, SubledgerRule::Not { .. }));
    }

    #[test]
    fn test_anomaly_params_validation() {
        assert!(AnomalyParams::default().validate().is_ok());

        let bad = AnomalyParams {
            contamination: 0.75,
            ..AnomalyParams::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ReconError::InvalidParameter { .. })
        ));

        let no_trees = AnomalyParams {
            tree_count: 0,
            ..AnomalyParams::default()
        };
        assert!(no_trees.validate().is_err());
    }

    #[test]
    fn test_default_mappings_cover_reference_accounts() {
        let config = ReconciliationConfig::default();
        let ids: Vec<&str> = config
            .mappings
            .iter()
            .map(|m| m.gl_account_id.as_str())
            .collect();
        assert_eq!(ids, vec!["2200", "2210", "1200", "1010"]);
    }
}

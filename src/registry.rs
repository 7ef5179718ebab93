use crate::error::{ReconError, Result};
use crate::records::Transaction;
use crate::schema::{MappingConfig, ReconciliationConfig, SubledgerRule, ToleranceParams};
use log::debug;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Subledger rule after validation. Built once per registry, evaluated per row.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledRule {
    StatusContainsAny(Vec<String>),
    SourceEquals(String),
    ItemContains(String),
    All(Vec<CompiledRule>),
    Any(Vec<CompiledRule>),
    Not(Box<CompiledRule>),
    Everything,
}

impl CompiledRule {
    pub fn compile(rule: &SubledgerRule, logical_name: &str) -> Result<Self> {
        match rule {
            SubledgerRule::ByRecognitionStatus { values } => {
                let values: Vec<String> = values
                    .iter()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect();
                if values.is_empty() {
                    return Err(ReconError::config(
                        logical_name,
                        "rule.values",
                        "ByRecognitionStatus needs at least one non-empty status",
                    ));
                }
                Ok(Self::StatusContainsAny(values))
            }
            SubledgerRule::BySource { value } => {
                if value.trim().is_empty() {
                    return Err(ReconError::config(
                        logical_name,
                        "rule.value",
                        "BySource needs a non-empty source",
                    ));
                }
                Ok(Self::SourceEquals(value.clone()))
            }
            SubledgerRule::ByTag { substring } => {
                if substring.is_empty() {
                    return Err(ReconError::config(
                        logical_name,
                        "rule.substring",
                        "ByTag needs a non-empty substring",
                    ));
                }
                Ok(Self::ItemContains(substring.clone()))
            }
            SubledgerRule::All { rules } => {
                Ok(Self::All(Self::compile_all(rules, logical_name, "All")?))
            }
            SubledgerRule::Any { rules } => {
                Ok(Self::Any(Self::compile_all(rules, logical_name, "Any")?))
            }
            SubledgerRule::Not { rule } => {
                Ok(Self::Not(Box::new(Self::compile(rule, logical_name)?)))
            }
            SubledgerRule::Everything => Ok(Self::Everything),
        }
    }

    fn compile_all(rules: &[SubledgerRule], logical_name: &str, kind: &str) -> Result<Vec<Self>> {
        if rules.is_empty() {
            return Err(ReconError::config(
                logical_name,
                "rule.rules",
                format!("{} needs at least one nested rule", kind),
            ));
        }
        rules
            .iter()
            .map(|r| Self::compile(r, logical_name))
            .collect()
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        match self {
            Self::StatusContainsAny(values) => tx
                .recognition_status
                .as_deref()
                .is_some_and(|status| values.iter().any(|v| status.contains(v.as_str()))),
            Self::SourceEquals(value) => tx.source.as_deref() == Some(value.as_str()),
            Self::ItemContains(substring) => tx
                .item_or_account
                .as_deref()
                .is_some_and(|item| item.contains(substring.as_str())),
            Self::All(rules) => rules.iter().all(|r| r.matches(tx)),
            Self::Any(rules) => rules.iter().any(|r| r.matches(tx)),
            Self::Not(rule) => !rule.matches(tx),
            Self::Everything => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountMapping {
    pub logical_name: String,
    pub gl_account_id: String,
    pub subledger_rule: CompiledRule,
    /// Global tolerance with any per-mapping override applied.
    pub tolerance: ToleranceParams,
}

impl AccountMapping {
    fn from_config(config: &MappingConfig, defaults: &ToleranceParams) -> Result<Self> {
        let logical_name = config.logical_name.trim();
        if logical_name.is_empty() {
            return Err(ReconError::config(
                "<unnamed>",
                "logical_name",
                format!(
                    "mapping for GL account '{}' has an empty logical name",
                    config.gl_account_id
                ),
            ));
        }

        let gl_account_id = config.gl_account_id.trim();
        if gl_account_id.is_empty() {
            return Err(ReconError::config(
                logical_name,
                "gl_account_id",
                "GL account identifier must not be empty",
            ));
        }

        let tolerance = ToleranceParams {
            rate: config.rate.unwrap_or(defaults.rate),
            floor: config.floor.unwrap_or(defaults.floor),
        };
        tolerance.validate(logical_name)?;

        Ok(Self {
            logical_name: logical_name.to_string(),
            gl_account_id: gl_account_id.to_string(),
            subledger_rule: CompiledRule::compile(&config.rule, logical_name)?,
            tolerance,
        })
    }

    pub fn selects(&self, tx: &Transaction) -> bool {
        self.subledger_rule.matches(tx)
    }
}

/// Ordered, immutable set of logical accounts.
#[derive(Debug, Clone, Default)]
pub struct AccountMappingRegistry {
    mappings: Vec<AccountMapping>,
}

impl AccountMappingRegistry {
    pub fn from_config(config: &ReconciliationConfig) -> Result<Self> {
        Self::from_mappings(&config.mappings, &config.tolerance)
    }

    pub fn from_mappings(configs: &[MappingConfig], defaults: &ToleranceParams) -> Result<Self> {
        defaults.validate("<global>")?;

        let mut seen = HashSet::new();
        let mut mappings = Vec::with_capacity(configs.len());

        for config in configs {
            let mapping = AccountMapping::from_config(config, defaults)?;
            if !seen.insert(mapping.logical_name.clone()) {
                return Err(ReconError::DuplicateLogicalName(mapping.logical_name));
            }
            debug!(
                "Registered logical account '{}' -> GL {}",
                mapping.logical_name, mapping.gl_account_id
            );
            mappings.push(mapping);
        }

        Ok(Self { mappings })
    }

    pub fn resolve(&self, logical_name: &str) -> Option<&AccountMapping> {
        self.mappings.iter().find(|m| m.logical_name == logical_name)
    }

    pub fn all(&self) -> &[AccountMapping] {
        &self.mappings
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

/// Holder for a registry that can be swapped while runs are in flight.
/// Readers take an `Arc` snapshot; `publish` replaces the whole table at once.
#[derive(Debug, Default)]
pub struct SharedRegistry {
    current: RwLock<Arc<AccountMappingRegistry>>,
}

impl SharedRegistry {
    pub fn new(registry: AccountMappingRegistry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    pub fn snapshot(&self) -> Arc<AccountMappingRegistry> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    pub fn publish(&self, registry: AccountMappingRegistry) {
        let next = Arc::new(registry);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Builds a registry from `config` and publishes it only if it is valid.
    pub fn reload(&self, config: &ReconciliationConfig) -> Result<()> {
        let registry = AccountMappingRegistry::from_config(config)?;
        self.publish(registry);
        Ok(())
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Invalid mapping configuration for '{logical_name}' ({field}): {details}")]
    Configuration {
        logical_name: String,
        field: String,
        details: String,
    },

    #[error("Duplicate logical account name in mapping configuration: {0}")]
    DuplicateLogicalName(String),

    #[error("Ledger snapshot contains more than one balance for account {account_id} in period {period}")]
    DuplicateLedgerAccount { account_id: String, period: String },

    #[error("Invalid parameter {name} = {value}: {details}")]
    InvalidParameter {
        name: String,
        value: String,
        details: String,
    },

    #[error("Subledger balance overflowed while aggregating '{logical_name}'")]
    BalanceOverflow { logical_name: String },

    #[error("Invalid period '{0}': expected YYYY-MM or YYYY-MM-DD")]
    InvalidPeriod(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ReconError {
    pub(crate) fn config(
        logical_name: impl Into<String>,
        field: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self::Configuration {
            logical_name: logical_name.into(),
            field: field.into(),
            details: details.into(),
        }
    }

    /// True for errors that abort a run before any classification or scoring.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::DuplicateLogicalName(_)
                | Self::DuplicateLedgerAccount { .. }
                | Self::InvalidParameter { .. }
                | Self::InvalidPeriod(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ReconError>;

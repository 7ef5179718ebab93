use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One general ledger balance for one account in one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub account_id: String,
    pub balance: Decimal,
    pub period: NaiveDate,
}

impl LedgerRecord {
    pub fn new(account_id: impl Into<String>, balance: Decimal, period: NaiveDate) -> Self {
        Self {
            account_id: account_id.into(),
            balance,
            period,
        }
    }
}

/// A subledger line. `amount` is `None` when the source value was missing
/// or not a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub amount: Option<Decimal>,
    pub recognition_status: Option<String>,
    pub source: Option<String>,
    pub item_or_account: Option<String>,
}

impl Transaction {
    pub fn new(id: impl Into<String>, amount: Option<Decimal>) -> Self {
        Self {
            id: id.into(),
            amount,
            recognition_status: None,
            source: None,
            item_or_account: None,
        }
    }

    pub fn with_recognition_status(mut self, status: impl Into<String>) -> Self {
        self.recognition_status = Some(status.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_item_or_account(mut self, item: impl Into<String>) -> Self {
        self.item_or_account = Some(item.into());
        self
    }

    pub fn has_valid_amount(&self) -> bool {
        self.amount.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconciliationStatus {
    /// Variance within tolerance
    Matched,
    /// Variance outside tolerance
    Exception,
    /// No ledger balance found for the mapped GL account
    Unmapped,
}

impl fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Matched => write!(f, "Matched"),
            Self::Exception => write!(f, "Exception"),
            Self::Unmapped => write!(f, "Unmapped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub logical_name: String,
    pub gl_account_id: String,
    pub gl_balance: Option<Decimal>,
    pub subledger_balance: Decimal,
    /// `gl_balance - subledger_balance`, signed. Absent when unmapped.
    pub variance: Option<Decimal>,
    pub tolerance: Option<Decimal>,
    pub status: ReconciliationStatus,
    /// Why the account could not be computed. Such accounts are reported as
    /// `Exception` with no variance or tolerance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ReconciliationResult {
    pub fn is_matched(&self) -> bool {
        self.status == ReconciliationStatus::Matched
    }

    pub fn is_exception(&self) -> bool {
        self.status == ReconciliationStatus::Exception
    }

    pub fn is_unmapped(&self) -> bool {
        self.status == ReconciliationStatus::Unmapped
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyScore {
    pub transaction_id: String,
    pub score: f64,
    pub is_outlier: bool,
}

//! # Ledger Recon
//!
//! A library for reconciling general ledger balances against subledger
//! transaction detail, and for flagging statistically unusual transactions
//! for audit review.
//!
//! ## Core Concepts
//!
//! - **Logical account**: a named financial concept (e.g. "Accounts Receivable")
//!   bound to a GL account identifier and a declarative subledger selection rule
//! - **Variance**: signed `gl_balance - subledger_balance`
//! - **Tolerance**: `max(|gl_balance| * rate, floor)`; variances within it are `Matched`
//! - **Unmapped**: the GL account has no ledger balance; the account is still reported
//! - **Anomaly score**: isolation-forest score over transaction amounts; the
//!   top `contamination` share is flagged
//!
//! ## Example
//!
//! ```rust,ignore
//! use ledger_recon::*;
//! use chrono::NaiveDate;
//! use rust_decimal::Decimal;
//!
//! let config = ReconciliationConfig {
//!     entity_name: "ACME Corp".to_string(),
//!     mappings: vec![MappingConfig::new(
//!         "Accounts Receivable",
//!         "1200",
//!         SubledgerRule::BySource { value: "AR Invoice".to_string() },
//!     )],
//!     ..ReconciliationConfig::default()
//! };
//!
//! let period = NaiveDate::from_ymd_opt(2025, 11, 30).unwrap();
//! let ledger = vec![LedgerRecord::new("1200", Decimal::from(100_000), period)];
//! let transactions = vec![
//!     Transaction::new("INV-1", Some(Decimal::from(99_950))).with_source("AR Invoice"),
//! ];
//!
//! let output = run_reconciliation(&config, &ledger, &transactions).unwrap();
//! assert!(output.reconciliation.results[0].is_matched());
//! ```

pub mod aggregator;
pub mod anomaly;
pub mod classifier;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod records;
pub mod registry;
pub mod report;
pub mod schema;
pub mod utils;

pub use aggregator::{BalanceAggregator, LedgerIndex, MissingAccount};
pub use anomaly::{AnomalyScorer, IsolationForest, NEUTRAL_SCORE};
pub use classifier::{tolerance_for, ReconciliationClassifier};
pub use engine::{reconcile, run_reconciliation, ReconciliationEngine};
pub use error::{ReconError, Result};
pub use ingestion::*;
pub use records::*;
pub use registry::{AccountMapping, AccountMappingRegistry, CompiledRule, SharedRegistry};
pub use report::*;
pub use schema::*;
pub use utils::{last_day_of_month, parse_period, period_end, same_period};

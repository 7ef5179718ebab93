use crate::aggregator::{BalanceAggregator, LedgerIndex};
use crate::anomaly::AnomalyScorer;
use crate::classifier::ReconciliationClassifier;
use crate::error::Result;
use crate::records::{LedgerRecord, ReconciliationResult, ReconciliationStatus, Transaction};
use crate::registry::{AccountMapping, AccountMappingRegistry};
use crate::report::{AnomalyReport, EngineOutput, ReconciliationReport, ReportSink, RunSummary};
use crate::schema::{DuplicateGlPolicy, ReconciliationConfig};
use crate::utils::{par_map, parse_period};
use chrono::NaiveDate;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Runs one reconciliation over an immutable ledger/subledger snapshot.
pub struct ReconciliationEngine {
    entity_name: String,
    period: Option<NaiveDate>,
    duplicate_gl_policy: DuplicateGlPolicy,
    registry: Arc<AccountMappingRegistry>,
    scorer: AnomalyScorer,
}

impl ReconciliationEngine {
    /// Validates the whole configuration. Any error here is fatal and is
    /// raised before classification or scoring begins.
    pub fn from_config(config: &ReconciliationConfig) -> Result<Self> {
        let registry = AccountMappingRegistry::from_config(config)?;
        Self::with_registry(config, Arc::new(registry))
    }

    /// Uses a prebuilt registry snapshot (e.g. from a `SharedRegistry`) and
    /// takes the remaining settings from `config`.
    pub fn with_registry(
        config: &ReconciliationConfig,
        registry: Arc<AccountMappingRegistry>,
    ) -> Result<Self> {
        let period = config.period.as_deref().map(parse_period).transpose()?;
        let scorer = AnomalyScorer::new(config.anomaly.clone())?;

        Ok(Self {
            entity_name: config.entity_name.clone(),
            period,
            duplicate_gl_policy: config.duplicate_gl_policy,
            registry,
            scorer,
        })
    }

    pub fn registry(&self) -> &AccountMappingRegistry {
        &self.registry
    }

    pub fn run(&self, ledger: &[LedgerRecord], transactions: &[Transaction]) -> Result<EngineOutput> {
        info!(
            "Reconciling {} logical accounts against {} ledger rows and {} transactions",
            self.registry.len(),
            ledger.len(),
            transactions.len()
        );

        let index = LedgerIndex::build(ledger, self.period, self.duplicate_gl_policy)?;
        let duplicate_gl_rows = index.duplicate_rows;
        let out_of_period_gl_rows = index.out_of_period_rows;
        let aggregator = BalanceAggregator::new(index, transactions);

        let results = reconcile(self.registry.all(), &aggregator);
        let scores = self.scorer.score(transactions);

        let reconciliation = ReconciliationReport { results };
        let anomalies = AnomalyReport { scores };

        let summary = RunSummary {
            entity_name: self.entity_name.clone(),
            period: self.period,
            mapping_count: reconciliation.results.len(),
            matched: reconciliation.count(ReconciliationStatus::Matched),
            exceptions: reconciliation.count(ReconciliationStatus::Exception),
            unmapped: reconciliation.count(ReconciliationStatus::Unmapped),
            failed: reconciliation.failed().count(),
            transaction_count: transactions.len(),
            scored_transactions: anomalies.scores.len(),
            flagged_transactions: anomalies.flagged_count(),
            invalid_amounts: transactions.iter().filter(|tx| !tx.has_valid_amount()).count(),
            duplicate_gl_rows,
            out_of_period_gl_rows,
        };

        info!(
            "Reconciliation complete: {} matched, {} exceptions, {} unmapped, {} anomalous transactions",
            summary.matched, summary.exceptions, summary.unmapped, summary.flagged_transactions
        );

        Ok(EngineOutput {
            reconciliation,
            anomalies,
            summary,
        })
    }

    /// Runs and hands the output to `sink`; the output is returned as well.
    pub fn run_into<S: ReportSink + ?Sized>(
        &self,
        ledger: &[LedgerRecord],
        transactions: &[Transaction],
        sink: &mut S,
    ) -> Result<EngineOutput> {
        let output = self.run(ledger, transactions)?;
        sink.accept(&output)?;
        Ok(output)
    }
}

/// Classifies every mapping, one result per mapping in registry order.
/// A mapping whose balances cannot be computed is reported as failed and
/// does not stop the others.
pub fn reconcile(
    mappings: &[AccountMapping],
    aggregator: &BalanceAggregator<'_>,
) -> Vec<ReconciliationResult> {
    par_map(mappings, |mapping| reconcile_one(mapping, aggregator))
}

fn reconcile_one(mapping: &AccountMapping, aggregator: &BalanceAggregator<'_>) -> ReconciliationResult {
    let gl_balance = match aggregator.gl_balance(mapping) {
        Ok(balance) => Some(balance),
        Err(missing) => {
            warn!("'{}' is unmapped: {}", mapping.logical_name, missing);
            None
        }
    };

    let result = match aggregator.subledger_balance(mapping) {
        Ok(subledger_balance) => {
            ReconciliationClassifier::classify(mapping, gl_balance, subledger_balance)
        }
        Err(e) => ReconciliationClassifier::failed(mapping, gl_balance, Decimal::ZERO, e.to_string()),
    };

    if let Some(reason) = &result.failure {
        warn!("'{}' reported as failed: {}", result.logical_name, reason);
    }
    debug!(
        "{}: GL {:?}, subledger {}, variance {:?}, tolerance {:?} -> {}",
        result.logical_name,
        result.gl_balance,
        result.subledger_balance,
        result.variance,
        result.tolerance,
        result.status
    );
    result
}

pub fn run_reconciliation(
    config: &ReconciliationConfig,
    ledger: &[LedgerRecord],
    transactions: &[Transaction],
) -> Result<EngineOutput> {
    ReconciliationEngine::from_config(config)?.run(ledger, transactions)
}

use crate::error::Result;
use crate::records::{AnomalyScore, ReconciliationResult, ReconciliationStatus, Transaction};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-account results in mapping registration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub results: Vec<ReconciliationResult>,
}

impl ReconciliationReport {
    pub fn count(&self, status: ReconciliationStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn get(&self, logical_name: &str) -> Option<&ReconciliationResult> {
        self.results.iter().find(|r| r.logical_name == logical_name)
    }

    pub fn exceptions(&self) -> impl Iterator<Item = &ReconciliationResult> {
        self.results.iter().filter(|r| r.is_exception())
    }

    /// Accounts whose balances could not be computed.
    pub fn failed(&self) -> impl Iterator<Item = &ReconciliationResult> {
        self.results.iter().filter(|r| r.is_failed())
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str("Account,GL_Account,GL_Balance,Subledger_Balance,Variance,Tolerance,Status\n");

        for result in &self.results {
            output.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                csv_field(&result.logical_name),
                csv_field(&result.gl_account_id),
                optional(result.gl_balance),
                result.subledger_balance,
                optional(result.variance),
                optional(result.tolerance),
                result.status
            ));
        }

        output
    }
}

fn optional(value: Option<Decimal>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub scores: Vec<AnomalyScore>,
}

/// A flagged transaction joined back to its subledger record.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewItem<'a> {
    pub transaction: &'a Transaction,
    pub score: f64,
}

impl AnomalyReport {
    pub fn flagged(&self) -> impl Iterator<Item = &AnomalyScore> {
        self.scores.iter().filter(|s| s.is_outlier)
    }

    pub fn flagged_count(&self) -> usize {
        self.flagged().count()
    }

    /// Flagged transactions, most anomalous first.
    pub fn exceptions_to_review<'a>(&self, transactions: &'a [Transaction]) -> Vec<ReviewItem<'a>> {
        let by_id: HashMap<&str, &Transaction> =
            transactions.iter().map(|tx| (tx.id.as_str(), tx)).collect();

        let mut items: Vec<ReviewItem<'a>> = self
            .flagged()
            .filter_map(|score| {
                by_id
                    .get(score.transaction_id.as_str())
                    .copied()
                    .map(|tx| ReviewItem {
                        transaction: tx,
                        score: score.score,
                    })
            })
            .collect();

        items.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.transaction.id.cmp(&b.transaction.id))
        });
        items
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub entity_name: String,
    pub period: Option<NaiveDate>,
    pub mapping_count: usize,
    pub matched: usize,
    pub exceptions: usize,
    pub unmapped: usize,
    #[serde(default)]
    pub failed: usize,
    pub transaction_count: usize,
    pub scored_transactions: usize,
    pub flagged_transactions: usize,
    pub invalid_amounts: usize,
    pub duplicate_gl_rows: usize,
    pub out_of_period_gl_rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineOutput {
    pub reconciliation: ReconciliationReport,
    pub anomalies: AnomalyReport,
    pub summary: RunSummary,
}

impl EngineOutput {
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_markdown(&self) -> String {
        let summary = &self.summary;
        let mut output = String::new();

        let title = if summary.entity_name.is_empty() {
            "Account Reconciliation".to_string()
        } else {
            format!("Account Reconciliation - {}", summary.entity_name)
        };
        output.push_str(&format!("# {}\n\n", title));
        if let Some(period) = summary.period {
            output.push_str(&format!("**Period:** {}\n\n", period.format("%B %Y")));
        }

        output.push_str("## Summary\n\n");
        output.push_str("| Account | GL Balance | Subledger Balance | Variance | Status |\n");
        output.push_str("|---|---:|---:|---:|---|\n");
        for result in &self.reconciliation.results {
            output.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                result.logical_name,
                optional(result.gl_balance),
                result.subledger_balance,
                optional(result.variance),
                result.status
            ));
        }
        output.push('\n');

        output.push_str(&format!(
            "- Auto-matched accounts: {}/{}\n",
            summary.matched, summary.mapping_count
        ));
        output.push_str(&format!(
            "- Exception accounts: {}/{}\n",
            summary.exceptions, summary.mapping_count
        ));
        if summary.unmapped > 0 {
            output.push_str(&format!(
                "- Unmapped accounts: {}/{}\n",
                summary.unmapped, summary.mapping_count
            ));
        }
        for result in self.reconciliation.failed() {
            output.push_str(&format!(
                "- Could not reconcile {}: {}\n",
                result.logical_name,
                result.failure.as_deref().unwrap_or_default()
            ));
        }
        output.push_str(&format!(
            "- Anomalous transactions flagged: {}\n",
            summary.flagged_transactions
        ));
        if summary.invalid_amounts > 0 {
            output.push_str(&format!(
                "- Transactions with missing or invalid amounts: {}\n",
                summary.invalid_amounts
            ));
        }
        output.push('\n');

        output.push_str(&format!(
            "## Exceptions Requiring Review ({})\n\n",
            summary.flagged_transactions
        ));
        let mut flagged: Vec<&AnomalyScore> = self.anomalies.flagged().collect();
        flagged.sort_by(|a, b| b.score.total_cmp(&a.score));
        for score in flagged {
            output.push_str(&format!(
                "- {} (score {:.3})\n",
                score.transaction_id, score.score
            ));
        }

        output
    }
}

/// Consumer of a finished run (evidence renderer, exporter, ...).
pub trait ReportSink {
    fn accept(&mut self, output: &EngineOutput) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn output() -> EngineOutput {
        EngineOutput {
            reconciliation: ReconciliationReport {
                results: vec![
                    ReconciliationResult {
                        logical_name: "Accounts Receivable".to_string(),
                        gl_account_id: "1200".to_string(),
                        gl_balance: Some(dec!(100000)),
                        subledger_balance: dec!(99950),
                        variance: Some(dec!(50)),
                        tolerance: Some(dec!(500)),
                        status: ReconciliationStatus::Matched,
                        failure: None,
                    },
                    ReconciliationResult {
                        logical_name: "Bank, Operating".to_string(),
                        gl_account_id: "1010".to_string(),
                        gl_balance: None,
                        subledger_balance: dec!(12.5),
                        variance: None,
                        tolerance: None,
                        status: ReconciliationStatus::Unmapped,
                        failure: None,
                    },
                ],
            },
            anomalies: AnomalyReport {
                scores: vec![
                    AnomalyScore {
                        transaction_id: "T1".to_string(),
                        score: 0.42,
                        is_outlier: false,
                    },
                    AnomalyScore {
                        transaction_id: "T2".to_string(),
                        score: 0.71,
                        is_outlier: true,
                    },
                    AnomalyScore {
                        transaction_id: "T3".to_string(),
                        score: 0.83,
                        is_outlier: true,
                    },
                ],
            },
            summary: RunSummary {
                entity_name: "Test Corp".to_string(),
                period: NaiveDate::from_ymd_opt(2025, 11, 30),
                mapping_count: 2,
                matched: 1,
                unmapped: 1,
                flagged_transactions: 2,
                ..RunSummary::default()
            },
        }
    }

    #[test]
    fn test_report_to_csv() {
        let csv = output().reconciliation.to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "Account,GL_Account,GL_Balance,Subledger_Balance,Variance,Tolerance,Status"
        );
        assert_eq!(lines[1], "Accounts Receivable,1200,100000,99950,50,500,Matched");
        assert_eq!(lines[2], "\"Bank, Operating\",1010,,12.5,,,Unmapped");
    }

    #[test]
    fn test_markdown_summary() {
        let markdown = output().to_markdown();
        assert!(markdown.contains("# Account Reconciliation - Test Corp"));
        assert!(markdown.contains("**Period:** November 2025"));
        assert!(markdown.contains("Auto-matched accounts: 1/2"));
        assert!(markdown.contains("Unmapped accounts: 1/2"));
        assert!(markdown.contains("Exceptions Requiring Review (2)"));
        let t3 = markdown.find("- T3").unwrap();
        let t2 = markdown.find("- T2").unwrap();
        assert!(t3 < t2);
    }

    #[test]
    fn test_exceptions_to_review_orders_by_score() {
        let transactions = vec![
            Transaction::new("T1", Some(dec!(10))),
            Transaction::new("T2", Some(dec!(5000))),
            Transaction::new("T3", Some(dec!(-9000))),
        ];
        let items = output().anomalies.exceptions_to_review(&transactions);
        let ids: Vec<&str> = items.iter().map(|i| i.transaction.id.as_str()).collect();
        assert_eq!(ids, vec!["T3", "T2"]);
    }

    #[test]
    fn test_csv_quotes_line_breaks() {
        let mut report = output().reconciliation;
        report.results[0].logical_name = "Accounts\nReceivable".to_string();
        report.results[1].logical_name = "Say \"Bank\"\r".to_string();

        let csv = report.to_csv();
        assert!(csv.contains("\"Accounts\nReceivable\",1200,"));
        assert!(csv.contains("\"Say \"\"Bank\"\"\r\",1010,"));
        assert_eq!(csv_field("plain"), "plain");
    }

    #[test]
    fn test_json_round_trip_keeps_exact_decimals() {
        let mut original = output();
        original.reconciliation.results[0].gl_balance = Some(dec!(12345678901234567.89));
        original.reconciliation.results[0].variance = Some(dec!(0.0000000001));

        let json = original.to_json().unwrap();
        assert!(json.contains("12345678901234567.89"));

        let restored: EngineOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, original);
        assert_eq!(
            restored.reconciliation.results[0].gl_balance,
            Some(dec!(12345678901234567.89))
        );
    }

    #[test]
    fn test_failed_accounts_listed_in_markdown() {
        let mut output = output();
        output.reconciliation.results[0].status = ReconciliationStatus::Exception;
        output.reconciliation.results[0].variance = None;
        output.reconciliation.results[0].failure = Some("sum overflowed".to_string());

        assert_eq!(output.reconciliation.failed().count(), 1);
        assert!(output
            .to_markdown()
            .contains("- Could not reconcile Accounts Receivable: sum overflowed"));
    }

    #[test]
    fn test_report_counts() {
        let report = output().reconciliation;
        assert_eq!(report.count(ReconciliationStatus::Matched), 1);
        assert_eq!(report.count(ReconciliationStatus::Exception), 0);
        assert!(report.get("Accounts Receivable").is_some());
        assert_eq!(report.exceptions().count(), 0);
    }
}

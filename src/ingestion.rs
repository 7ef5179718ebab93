//! Conversion of loosely typed loader rows into engine records.

use crate::records::{LedgerRecord, Transaction};
use crate::utils::parse_period;
use chrono::NaiveDate;
use log::warn;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

/// A subledger row as a CSV or spreadsheet loader produces it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionRow {
    #[serde(alias = "Transaction_ID", alias = "ID")]
    pub id: String,
    #[serde(default, alias = "Amount")]
    pub amount: Option<String>,
    #[serde(default, alias = "Recognition_Status")]
    pub recognition_status: Option<String>,
    #[serde(default, alias = "Source")]
    pub source: Option<String>,
    #[serde(default, alias = "Item_or_Account")]
    pub item_or_account: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerRow {
    #[serde(alias = "Account_Number")]
    pub account_id: String,
    #[serde(alias = "Balance")]
    pub balance: String,
    #[serde(default, alias = "Period")]
    pub period: Option<String>,
}

/// Parses a monetary amount. Accepts thousands separators, a leading `$`,
/// and accounting-style parentheses for negatives. Returns `None` for blank
/// or non-numeric input.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (negative, body) = match trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
    {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };

    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let value = Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()?;

    Some(if negative { -value } else { value })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn convert_transaction_rows(rows: &[TransactionRow]) -> Vec<Transaction> {
    rows.iter()
        .map(|row| {
            let amount = row.amount.as_deref().and_then(parse_amount);
            if amount.is_none() {
                warn!(
                    "Transaction {} has a missing or invalid amount {:?}",
                    row.id, row.amount
                );
            }

            Transaction {
                id: row.id.trim().to_string(),
                amount,
                recognition_status: non_empty(&row.recognition_status),
                source: non_empty(&row.source),
                item_or_account: non_empty(&row.item_or_account),
            }
        })
        .collect()
}

/// Converts ledger rows, stamping `default_period` on rows without their own.
/// Rows whose balance or period cannot be read are skipped with a warning,
/// which leaves the affected account unmapped rather than zero.
pub fn convert_ledger_rows(rows: &[LedgerRow], default_period: NaiveDate) -> Vec<LedgerRecord> {
    rows.iter()
        .filter_map(|row| {
            let Some(balance) = parse_amount(&row.balance) else {
                warn!(
                    "Skipping ledger row for account {}: invalid balance '{}'",
                    row.account_id, row.balance
                );
                return None;
            };

            let period = match row.period.as_deref().map(str::trim) {
                Some(p) if !p.is_empty() => match parse_period(p) {
                    Ok(period) => period,
                    Err(e) => {
                        warn!("Skipping ledger row for account {}: {}", row.account_id, e);
                        return None;
                    }
                },
                _ => default_period,
            };

            Some(LedgerRecord::new(row.account_id.trim(), balance, period))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_amount_formats() {
        assert_eq!(parse_amount("1234.50"), Some(dec!(1234.50)));
        assert_eq!(parse_amount(" $1,234.50 "), Some(dec!(1234.50)));
        assert_eq!(parse_amount("(500.00)"), Some(dec!(-500.00)));
        assert_eq!(parse_amount("-42"), Some(dec!(-42)));
        assert_eq!(parse_amount("1.5e3"), Some(dec!(1500)));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("N/A"), None);
        assert_eq!(parse_amount("$"), None);
    }

    #[test]
    fn test_convert_transaction_rows() {
        let rows = vec![
            TransactionRow {
                id: "T1".to_string(),
                amount: Some("1,000".to_string()),
                source: Some("AR Invoice".to_string()),
                recognition_status: Some("  ".to_string()),
                ..TransactionRow::default()
            },
            TransactionRow {
                id: "T2".to_string(),
                amount: Some("pending".to_string()),
                ..TransactionRow::default()
            },
        ];

        let txs = convert_transaction_rows(&rows);
        assert_eq!(txs[0].amount, Some(dec!(1000)));
        assert_eq!(txs[0].source.as_deref(), Some("AR Invoice"));
        assert_eq!(txs[0].recognition_status, None);
        assert_eq!(txs[1].amount, None);
    }

    #[test]
    fn test_convert_ledger_rows() {
        let default_period = NaiveDate::from_ymd_opt(2025, 11, 30).unwrap();
        let rows = vec![
            LedgerRow {
                account_id: " 1200 ".to_string(),
                balance: "100,000.00".to_string(),
                period: None,
            },
            LedgerRow {
                account_id: "2200".to_string(),
                balance: "#REF!".to_string(),
                period: None,
            },
            LedgerRow {
                account_id: "1010".to_string(),
                balance: "(250)".to_string(),
                period: Some("2025-10".to_string()),
            },
        ];

        let records = convert_ledger_rows(&rows, default_period);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].account_id, "1200");
        assert_eq!(records[0].period, default_period);
        assert_eq!(records[1].balance, dec!(-250));
        assert_eq!(
            records[1].period,
            NaiveDate::from_ymd_opt(2025, 10, 31).unwrap()
        );
    }
}

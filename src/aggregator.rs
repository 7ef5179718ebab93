use crate::error::{ReconError, Result};
use crate::records::{LedgerRecord, Transaction};
use crate::registry::AccountMapping;
use crate::schema::DuplicateGlPolicy;
use crate::utils::same_period;
use chrono::NaiveDate;
use log::warn;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;

/// The mapped GL account has no balance in the ledger snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingAccount {
    pub gl_account_id: String,
}

impl fmt::Display for MissingAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no ledger balance for GL account {}", self.gl_account_id)
    }
}

/// First-match lookup over a ledger snapshot.
#[derive(Debug)]
pub struct LedgerIndex<'a> {
    by_account: HashMap<&'a str, &'a LedgerRecord>,
    pub duplicate_rows: usize,
    pub out_of_period_rows: usize,
}

impl<'a> LedgerIndex<'a> {
    pub fn build(
        records: &'a [LedgerRecord],
        period: Option<NaiveDate>,
        policy: DuplicateGlPolicy,
    ) -> Result<Self> {
        let mut by_account: HashMap<&'a str, &'a LedgerRecord> = HashMap::new();
        let mut duplicate_rows = 0;
        let mut out_of_period_rows = 0;

        for record in records {
            if let Some(period) = period {
                if !same_period(record.period, period) {
                    out_of_period_rows += 1;
                    continue;
                }
            }

            let account_id = record.account_id.trim();
            if let Some(first) = by_account.get(account_id) {
                if policy == DuplicateGlPolicy::Reject {
                    return Err(ReconError::DuplicateLedgerAccount {
                        account_id: account_id.to_string(),
                        period: record.period.format("%Y-%m").to_string(),
                    });
                }
                warn!(
                    "Duplicate ledger row for account {} (balance {}); keeping first balance {}",
                    account_id, record.balance, first.balance
                );
                duplicate_rows += 1;
                continue;
            }
            by_account.insert(account_id, record);
        }

        if out_of_period_rows > 0 {
            warn!(
                "Ignored {} ledger rows outside the reporting period",
                out_of_period_rows
            );
        }

        Ok(Self {
            by_account,
            duplicate_rows,
            out_of_period_rows,
        })
    }

    pub fn get(&self, account_id: &str) -> Option<&'a LedgerRecord> {
        self.by_account.get(account_id).copied()
    }
}

pub struct BalanceAggregator<'a> {
    ledger: LedgerIndex<'a>,
    transactions: &'a [Transaction],
}

impl<'a> BalanceAggregator<'a> {
    pub fn new(ledger: LedgerIndex<'a>, transactions: &'a [Transaction]) -> Self {
        Self {
            ledger,
            transactions,
        }
    }

    pub fn ledger(&self) -> &LedgerIndex<'a> {
        &self.ledger
    }

    pub fn gl_balance(&self, mapping: &AccountMapping) -> std::result::Result<Decimal, MissingAccount> {
        self.ledger
            .get(&mapping.gl_account_id)
            .map(|record| record.balance)
            .ok_or_else(|| MissingAccount {
                gl_account_id: mapping.gl_account_id.clone(),
            })
    }

    /// Sums the amounts of every transaction the mapping selects.
    /// Transactions without a valid amount contribute zero.
    pub fn subledger_balance(&self, mapping: &AccountMapping) -> Result<Decimal> {
        self.transactions
            .iter()
            .filter(|tx| mapping.selects(tx))
            .filter_map(|tx| tx.amount)
            .try_fold(Decimal::ZERO, |acc, amount| {
                acc.checked_add(amount)
                    .ok_or_else(|| ReconError::BalanceOverflow {
                        logical_name: mapping.logical_name.clone(),
                    })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AccountMappingRegistry;
    use crate::schema::{MappingConfig, SubledgerRule, ToleranceParams};

    fn period() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 30).unwrap()
    }

    fn registry() -> AccountMappingRegistry {
        AccountMappingRegistry::from_mappings(
            &[
                MappingConfig::new(
                    "Accounts Receivable",
                    "1200",
                    SubledgerRule::BySource {
                        value: "AR Invoice".to_string(),
                    },
                ),
                MappingConfig::new(
                    "Inventory",
                    "1300",
                    SubledgerRule::ByTag {
                        substring: "Inventory".to_string(),
                    },
                ),
            ],
            &ToleranceParams::default(),
        )
        .unwrap()
    }

    fn transactions() -> Vec<Transaction> {
        vec![
            Transaction::new("T1", Some(Decimal::new(150_000, 2))).with_source("AR Invoice"),
            Transaction::new("T2", Some(Decimal::new(-2_550, 2))).with_source("AR Invoice"),
            Transaction::new("T3", None).with_source("AR Invoice"),
            Transaction::new("T4", Some(Decimal::new(99_999, 0))).with_source("AP Bill"),
        ]
    }

    #[test]
    fn test_first_ledger_match_wins() {
        let ledger = vec![
            LedgerRecord::new("1200", Decimal::from(1000), period()),
            LedgerRecord::new("1200", Decimal::from(5000), period()),
        ];
        let index = LedgerIndex::build(&ledger, None, DuplicateGlPolicy::FirstMatch).unwrap();
        assert_eq!(index.duplicate_rows, 1);

        let txs = transactions();
        let aggregator = BalanceAggregator::new(index, &txs);
        let registry = registry();
        assert_eq!(
            aggregator.gl_balance(&registry.all()[0]),
            Ok(Decimal::from(1000))
        );
    }

    #[test]
    fn test_reject_policy_fails_on_duplicates() {
        let ledger = vec![
            LedgerRecord::new("1200", Decimal::from(1000), period()),
            LedgerRecord::new("1200", Decimal::from(5000), period()),
        ];
        let err = LedgerIndex::build(&ledger, None, DuplicateGlPolicy::Reject).unwrap_err();
        assert!(err.is_validation_error());
        assert!(matches!(err, ReconError::DuplicateLedgerAccount { account_id, .. } if account_id == "1200"));
    }

    #[test]
    fn test_missing_account_is_reported_not_fatal() {
        let ledger = vec![LedgerRecord::new("1200", Decimal::from(1000), period())];
        let index = LedgerIndex::build(&ledger, None, DuplicateGlPolicy::FirstMatch).unwrap();
        let txs = transactions();
        let aggregator = BalanceAggregator::new(index, &txs);
        let registry = registry();

        let missing = aggregator.gl_balance(&registry.all()[1]).unwrap_err();
        assert_eq!(missing.gl_account_id, "1300");
        assert_eq!(
            aggregator.subledger_balance(&registry.all()[1]).unwrap(),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_period_filter_skips_other_periods() {
        let ledger = vec![
            LedgerRecord::new(
                "1200",
                Decimal::from(42),
                NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
            ),
            LedgerRecord::new("1200", Decimal::from(1000), period()),
        ];
        let index =
            LedgerIndex::build(&ledger, Some(period()), DuplicateGlPolicy::Reject).unwrap();
        assert_eq!(index.out_of_period_rows, 1);
        assert_eq!(index.get("1200").unwrap().balance, Decimal::from(1000));
    }

    #[test]
    fn test_subledger_sum_skips_invalid_amounts() {
        let index = LedgerIndex::build(&[], None, DuplicateGlPolicy::FirstMatch).unwrap();
        let txs = transactions();
        let aggregator = BalanceAggregator::new(index, &txs);
        let registry = registry();

        assert_eq!(
            aggregator.subledger_balance(&registry.all()[0]).unwrap(),
            Decimal::new(147_450, 2)
        );
    }

    #[test]
    fn test_subledger_sum_is_order_independent() {
        let registry = registry();
        let mut txs = transactions();
        let forward = {
            let index = LedgerIndex::build(&[], None, DuplicateGlPolicy::FirstMatch).unwrap();
            BalanceAggregator::new(index, &txs)
                .subledger_balance(&registry.all()[0])
                .unwrap()
        };

        txs.reverse();
        txs.swap(0, 2);
        let index = LedgerIndex::build(&[], None, DuplicateGlPolicy::FirstMatch).unwrap();
        let permuted = BalanceAggregator::new(index, &txs)
            .subledger_balance(&registry.all()[0])
            .unwrap();

        assert_eq!(forward, permuted);
    }
}

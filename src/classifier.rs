use crate::records::{ReconciliationResult, ReconciliationStatus};
use crate::registry::AccountMapping;
use crate::schema::ToleranceParams;
use rust_decimal::Decimal;

/// Tolerance band for a GL balance: the larger of the relative band and the floor.
/// A relative band too large to represent saturates at `Decimal::MAX`.
pub fn tolerance_for(gl_balance: Decimal, params: &ToleranceParams) -> Decimal {
    let relative = gl_balance
        .abs()
        .checked_mul(params.rate)
        .unwrap_or(Decimal::MAX);
    relative.max(params.floor)
}

pub struct ReconciliationClassifier;

impl ReconciliationClassifier {
    /// Classifies one logical account using the mapping's own tolerance.
    pub fn classify(
        mapping: &AccountMapping,
        gl_balance: Option<Decimal>,
        subledger_balance: Decimal,
    ) -> ReconciliationResult {
        Self::classify_with(mapping, gl_balance, subledger_balance, &mapping.tolerance)
    }

    pub fn classify_with(
        mapping: &AccountMapping,
        gl_balance: Option<Decimal>,
        subledger_balance: Decimal,
        params: &ToleranceParams,
    ) -> ReconciliationResult {
        let Some(gl) = gl_balance else {
            return ReconciliationResult {
                logical_name: mapping.logical_name.clone(),
                gl_account_id: mapping.gl_account_id.clone(),
                gl_balance: None,
                subledger_balance,
                variance: None,
                tolerance: None,
                status: ReconciliationStatus::Unmapped,
                failure: None,
            };
        };

        let Some(variance) = gl.checked_sub(subledger_balance) else {
            return Self::failed(
                mapping,
                Some(gl),
                subledger_balance,
                "variance between GL and subledger balances overflowed",
            );
        };
        let tolerance = tolerance_for(gl, params);
        let status = if variance.abs() <= tolerance {
            ReconciliationStatus::Matched
        } else {
            ReconciliationStatus::Exception
        };

        ReconciliationResult {
            logical_name: mapping.logical_name.clone(),
            gl_account_id: mapping.gl_account_id.clone(),
            gl_balance: Some(gl),
            subledger_balance,
            variance: Some(variance),
            tolerance: Some(tolerance),
            status,
            failure: None,
        }
    }

    /// An account whose balances could not be computed. It goes to review as
    /// an exception; the rest of the run is unaffected.
    pub fn failed(
        mapping: &AccountMapping,
        gl_balance: Option<Decimal>,
        subledger_balance: Decimal,
        reason: impl Into<String>,
    ) -> ReconciliationResult {
        ReconciliationResult {
            logical_name: mapping.logical_name.clone(),
            gl_account_id: mapping.gl_account_id.clone(),
            gl_balance,
            subledger_balance,
            variance: None,
            tolerance: None,
            status: ReconciliationStatus::Exception,
            failure: Some(reason.into()),
        }
    }
}

//! Static business configuration for routing and split allocation
//!
//! All of these are small immutable values supplied by the operator at
//! construction time. Nothing in here is mutated during a run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{ReconcileError, ReconcileResult};

/// Fixed components of the monthly rent payment.
///
/// A bank-line payment to the primary rent account that exceeds the sum of
/// the two fixed components is pre-split: both fixed amounts go to their
/// own expense accounts and the residual is posted to the electric account.
/// The residual absorbs all variance and is never itself configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentSchedule {
    /// Account the upstream feed tags rent payments with
    pub primary_account: String,
    /// Second fixed rent component's expense account
    pub secondary_account: String,
    /// Account that receives the residual
    pub electric_account: String,
    /// Fixed amount of the primary component, minor units
    pub primary_minor: i64,
    /// Fixed amount of the secondary component, minor units
    pub secondary_minor: i64,
}

/// Minimum payment that counts as a membership fee.
///
/// Payments below the threshold are goodwill, not membership, and route to
/// the donations sub-account in full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipThreshold {
    /// Membership income account the feed tags payments with
    pub income_account: String,
    /// Donations sub-account for below-threshold and surplus amounts
    pub donations_account: String,
    /// Minimum membership fee, minor units
    pub minimum_minor: i64,
}

/// Principal/interest portions of one known repayment amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaymentSplit {
    pub principal_minor: i64,
    pub interest_minor: i64,
}

/// Finite lookup table of known loan repayment amounts.
///
/// Keys are exact signed gross amounts in minor units. An amount absent
/// from the table degrades to a principal-only allocation with a warning,
/// so a malformed table row (a data-quality issue for the operator) never
/// blocks the repayment from being recorded for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRepaymentTable {
    /// Loan liability account the feed tags repayments with
    pub liability_account: String,
    /// Interest expense account
    pub interest_account: String,
    /// Known gross amount (minor units) to principal/interest breakdown
    pub amounts: HashMap<i64, RepaymentSplit>,
}

impl LoanRepaymentTable {
    /// Exact integer-minor-unit lookup.
    pub fn lookup(&self, gross_minor: i64) -> Option<RepaymentSplit> {
        self.amounts.get(&gross_minor).copied()
    }
}

/// Routing rules for card and POS sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteTable {
    /// Recognized category tag values (lowercase) to income account paths
    pub categories: HashMap<String, String>,
    /// Known statement descriptors / suffixes to account paths
    pub descriptors: HashMap<String, String>,
    /// General donations income account, the routing default
    pub donations_account: String,
    /// Expense account for refunds and negative-net adjustments
    pub miscellaneous_account: String,
    /// Income account POS payments default to
    pub pos_default_account: String,
}

impl RouteTable {
    /// Income account for a recognized category name, case-insensitive.
    pub fn category_account(&self, name: &str) -> Option<&str> {
        self.categories
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Account for a known statement descriptor, exact match.
    pub fn descriptor_account(&self, descriptor: &str) -> Option<&str> {
        self.descriptors.get(descriptor).map(String::as_str)
    }
}

/// Per-source ledger accounts and identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceProfile {
    /// Source label used in logs and watermarks
    pub source_name: String,
    /// Asset account this source settles into
    pub source_account: String,
    /// Expense account for processor fees
    pub fee_account: String,
    /// Reporting currency code
    pub currency: String,
}

/// Everything the split allocator needs, bundled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationConfig {
    pub rent: RentSchedule,
    pub membership: MembershipThreshold,
    pub loan: LoanRepaymentTable,
}

impl AllocationConfig {
    /// Check internal consistency before a run.
    ///
    /// A loan table row must decompose its own key exactly; one that does
    /// not would only surface mid-run as an unbalanced allocation, so it
    /// is rejected here where the operator can see the offending row.
    pub fn validate(&self) -> ReconcileResult<()> {
        if self.rent.primary_minor <= 0 || self.rent.secondary_minor <= 0 {
            return Err(ReconcileError::Config(
                "rent components must be positive".to_string(),
            ));
        }

        if self.membership.minimum_minor <= 0 {
            return Err(ReconcileError::Config(format!(
                "membership minimum must be positive, got {}",
                self.membership.minimum_minor
            )));
        }

        for (gross, split) in &self.loan.amounts {
            if split.principal_minor + split.interest_minor != -gross {
                return Err(ReconcileError::Config(format!(
                    "loan table row {} decomposes to {} + {}, expected {}",
                    gross, split.principal_minor, split.interest_minor, -gross
                )));
            }
        }

        Ok(())
    }
}

//! Split allocation: decomposing a gross amount into balanced ledger splits

use log::warn;

use crate::config::{AllocationConfig, SourceProfile};
use crate::types::{
    ExternalTransaction, ReconcileError, ReconcileResult, SourceKind, Split,
};

/// A balanced split set, plus any warning produced while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub splits: Vec<Split>,
    pub warning: Option<String>,
}

/// Applies the source- and category-specific allocation policies.
///
/// Pure: the same transaction, accounts and configuration always produce
/// the same split set. Every returned set sums to exactly zero at two
/// fraction digits; a nonzero sum is a rules-engine defect and surfaces as
/// [`ReconcileError::UnbalancedSplits`], never as a committed entry.
pub struct SplitAllocator {
    config: AllocationConfig,
}

impl SplitAllocator {
    pub fn new(config: AllocationConfig) -> Self {
        Self { config }
    }

    /// Allocate `tx` between the source's settlement account and the routed
    /// destination account.
    pub fn allocate(
        &self,
        tx: &ExternalTransaction,
        profile: &SourceProfile,
        dest_account: &str,
    ) -> ReconcileResult<Allocation> {
        let allocation = match tx.kind {
            SourceKind::CardCharge
            | SourceKind::CardAdjustment
            | SourceKind::PosPayment
            | SourceKind::PosChargeback => self.charge_with_fee(tx, profile, dest_account),

            SourceKind::CardRefund | SourceKind::PosRefund => {
                self.simple_transfer(tx.net_minor, &profile.source_account, dest_account)
            }

            SourceKind::BankLine => self.bank_line(tx, profile, dest_account),

            // payouts are skipped by the router before allocation
            SourceKind::CardPayout => {
                return Err(ReconcileError::InvalidEntry(
                    "card payouts are not allocated".to_string(),
                ))
            }
        };

        Self::check_balanced(allocation)
    }

    /// Three splits: settlement account takes the net, the destination the
    /// full gross, and the fee account the processor fee.
    fn charge_with_fee(
        &self,
        tx: &ExternalTransaction,
        profile: &SourceProfile,
        dest_account: &str,
    ) -> Allocation {
        Allocation {
            splits: vec![
                Split::from_minor(&profile.source_account, tx.net_minor),
                Split::from_minor(dest_account, -tx.amount_minor),
                Split::from_minor(&profile.fee_account, tx.fee_minor),
            ],
            warning: None,
        }
    }

    /// Two splits with the fee (if any) absorbed into the net.
    fn simple_transfer(&self, net_minor: i64, source: &str, dest: &str) -> Allocation {
        Allocation {
            splits: vec![
                Split::from_minor(source, net_minor),
                Split::from_minor(dest, -net_minor),
            ],
            warning: None,
        }
    }

    /// Bank-line dispatch: rent pre-split, membership threshold, loan
    /// repayment table, or a plain two-way transfer.
    fn bank_line(
        &self,
        tx: &ExternalTransaction,
        profile: &SourceProfile,
        dest_account: &str,
    ) -> Allocation {
        let rent = &self.config.rent;
        let membership = &self.config.membership;
        let loan = &self.config.loan;
        let gross = tx.amount_minor;

        if dest_account == rent.primary_account
            && -gross > rent.primary_minor + rent.secondary_minor
        {
            return self.rent_pre_split(gross, profile);
        }

        if dest_account == membership.income_account {
            return self.membership_split(gross, profile, dest_account);
        }

        if dest_account == loan.liability_account {
            return self.loan_split(gross, profile);
        }

        self.simple_transfer(gross, &profile.source_account, dest_account)
    }

    /// Four splits: the two fixed rent components at their configured
    /// amounts and the residual on the electric account. The residual
    /// absorbs all variance and is never itself configured.
    fn rent_pre_split(&self, gross_minor: i64, profile: &SourceProfile) -> Allocation {
        let rent = &self.config.rent;
        let residual = -(gross_minor + rent.primary_minor + rent.secondary_minor);

        Allocation {
            splits: vec![
                Split::from_minor(&profile.source_account, gross_minor),
                Split::from_minor(&rent.primary_account, rent.primary_minor),
                Split::from_minor(&rent.secondary_account, rent.secondary_minor),
                Split::from_minor(&rent.electric_account, residual),
            ],
            warning: None,
        }
    }

    /// Below the threshold the whole payment is goodwill, exactly the
    /// threshold is a plain membership fee, and any surplus above it goes
    /// to donations.
    fn membership_split(
        &self,
        gross_minor: i64,
        profile: &SourceProfile,
        membership_account: &str,
    ) -> Allocation {
        let membership = &self.config.membership;
        let minimum = membership.minimum_minor;

        let splits = if gross_minor < minimum {
            vec![
                Split::from_minor(&profile.source_account, gross_minor),
                Split::from_minor(&membership.donations_account, -gross_minor),
            ]
        } else if gross_minor == minimum {
            vec![
                Split::from_minor(&profile.source_account, gross_minor),
                Split::from_minor(membership_account, -gross_minor),
            ]
        } else {
            vec![
                Split::from_minor(&profile.source_account, gross_minor),
                Split::from_minor(membership_account, -minimum),
                Split::from_minor(&membership.donations_account, -(gross_minor - minimum)),
            ]
        };

        Allocation {
            splits,
            warning: None,
        }
    }

    /// Table hit: principal against the liability, interest to expense.
    /// Table miss: the full amount as principal, recorded anyway so the
    /// repayment stays auditable, with a warning for the operator.
    fn loan_split(&self, gross_minor: i64, profile: &SourceProfile) -> Allocation {
        let loan = &self.config.loan;

        match loan.lookup(gross_minor) {
            Some(split) => Allocation {
                splits: vec![
                    Split::from_minor(&profile.source_account, gross_minor),
                    Split::from_minor(&loan.liability_account, split.principal_minor),
                    Split::from_minor(&loan.interest_account, split.interest_minor),
                ],
                warning: None,
            },
            None => {
                let warning = format!(
                    "loan repayment of {} not in repayment table, allocated as principal only",
                    gross_minor
                );
                warn!("{}", warning);
                Allocation {
                    splits: vec![
                        Split::from_minor(&profile.source_account, gross_minor),
                        Split::from_minor(&loan.liability_account, -gross_minor),
                    ],
                    warning: Some(warning),
                }
            }
        }
    }

    fn check_balanced(allocation: Allocation) -> ReconcileResult<Allocation> {
        let sum: bigdecimal::BigDecimal = allocation.splits.iter().map(|s| &s.value).sum();
        if sum != bigdecimal::BigDecimal::from(0) {
            return Err(ReconcileError::UnbalancedSplits(format!(
                "allocation sums to {}, expected 0",
                sum
            )));
        }
        Ok(allocation)
    }
}

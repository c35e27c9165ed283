//! Balance delta reporting over the committed ledger
//!
//! Read-only: everything here is derived from the store's balance query.
//! Rendering (CSV, Markdown, wiki pages) is an output concern that lives
//! outside this crate; these functions only assemble the data.

use bigdecimal::BigDecimal;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::traits::LedgerStore;
use crate::types::{AccountType, ReconcileResult};

/// Account's balance movement between two dates: balance at `end` minus
/// balance at `start`, optionally recursing into child accounts.
pub async fn delta<S: LedgerStore>(
    store: &S,
    path: &str,
    start: NaiveDate,
    end: NaiveDate,
    recursive: bool,
) -> ReconcileResult<BigDecimal> {
    let at_end = store.get_balance(path, end, recursive).await?;
    let at_start = store.get_balance(path, start, recursive).await?;
    Ok(at_end - at_start)
}

/// Last day of the month containing `date`.
pub fn end_of_month(date: NaiveDate) -> NaiveDate {
    let (next_year, next_month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    // day 1 of any month always exists
    NaiveDate::from_ymd_opt(next_year, next_month, 1).unwrap() - Duration::days(1)
}

/// Last day of the month before the one containing `date`.
pub fn end_of_previous_month(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap() - Duration::days(1)
}

/// Rolling VAT window ending with `date`'s month: from the end of the same
/// month one year earlier (exclusive lower bound) to the end of the month.
pub fn vat_window(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let end = end_of_month(date);
    let start_year = date.year() - 1;
    // day 1 always exists; clamping to it avoids Feb 29 issues
    let start = NaiveDate::from_ymd_opt(start_year, date.month(), 1).unwrap() - Duration::days(1);
    (start, end)
}

/// One income account's movement for the snapshot month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatRow {
    /// Full hierarchical account path
    pub account: String,
    /// One-month balance delta, own postings only
    pub delta: BigDecimal,
}

/// Flat per-income-account snapshot for one month of the VAT window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatSnapshot {
    /// Last day of the reported month
    pub month_end: NaiveDate,
    /// Rows ordered by account path
    pub rows: Vec<VatRow>,
}

/// Build the flat income snapshot for the month containing `date`.
pub async fn vat_snapshot<S: LedgerStore>(
    store: &S,
    date: NaiveDate,
) -> ReconcileResult<VatSnapshot> {
    let month_end = end_of_month(date);
    let previous_end = end_of_previous_month(date);

    let mut accounts = store.list_accounts(Some(AccountType::Income)).await?;
    accounts.sort_by(|a, b| a.path.cmp(&b.path));

    let mut rows = Vec::with_capacity(accounts.len());
    for account in &accounts {
        let movement = delta(store, &account.path, previous_end, month_end, false).await?;
        rows.push(VatRow {
            account: account.path.clone(),
            delta: movement,
        });
    }

    Ok(VatSnapshot { month_end, rows })
}

/// Top-level account paths the monthly summary reports over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportAccounts {
    pub assets: String,
    pub current_assets: String,
    pub other_assets: String,
    pub income: String,
    pub expenses: String,
    pub imbalance: String,
}

impl Default for ReportAccounts {
    fn default() -> Self {
        Self {
            assets: "Assets".to_string(),
            current_assets: "Assets:Current Assets".to_string(),
            other_assets: "Assets:Other Assets".to_string(),
            income: "Income".to_string(),
            expenses: "Expenses".to_string(),
            imbalance: "Imbalance-GBP".to_string(),
        }
    }
}

/// One named amount in a report section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceLine {
    pub name: String,
    pub amount: BigDecimal,
}

/// An asset group: total plus per-child balances at month end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetGroup {
    pub name: String,
    pub total: BigDecimal,
    pub children: Vec<BalanceLine>,
}

/// One income or expense category with its month delta and per-child
/// breakdown. Placeholder categories carry no own amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDelta {
    pub name: String,
    pub amount: Option<BigDecimal>,
    pub children: Vec<BalanceLine>,
}

/// Hierarchical monthly financial summary for narrative reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    pub month_end: NaiveDate,
    pub overall_assets: BigDecimal,
    pub current_assets: AssetGroup,
    pub other_assets: AssetGroup,
    pub imbalance: BigDecimal,
    pub income: Vec<CategoryDelta>,
    pub expenses: Vec<CategoryDelta>,
    pub total_revenue: BigDecimal,
    pub total_expenses: BigDecimal,
    pub net: BigDecimal,
}

/// Assemble the monthly summary for the month containing `date`.
pub async fn monthly_summary<S: LedgerStore>(
    store: &S,
    date: NaiveDate,
    accounts: &ReportAccounts,
) -> ReconcileResult<MonthlySummary> {
    let month_end = end_of_month(date);
    let previous_end = end_of_previous_month(date);

    let overall_assets = store.get_balance(&accounts.assets, month_end, true).await?;
    let imbalance = store
        .get_balance(&accounts.imbalance, month_end, true)
        .await?;

    let current_assets = asset_group(store, &accounts.current_assets, month_end).await?;
    let other_assets = asset_group(store, &accounts.other_assets, month_end).await?;

    let income = category_deltas(store, &accounts.income, previous_end, month_end).await?;
    let expenses = category_deltas(store, &accounts.expenses, previous_end, month_end).await?;

    let total_revenue = delta(store, &accounts.income, previous_end, month_end, true).await?;
    let total_expenses = delta(store, &accounts.expenses, previous_end, month_end, true).await?;
    let net = &total_revenue - &total_expenses;

    Ok(MonthlySummary {
        month_end,
        overall_assets,
        current_assets,
        other_assets,
        imbalance,
        income,
        expenses,
        total_revenue,
        total_expenses,
        net,
    })
}

async fn asset_group<S: LedgerStore>(
    store: &S,
    path: &str,
    at_date: NaiveDate,
) -> ReconcileResult<AssetGroup> {
    let total = store.get_balance(path, at_date, true).await?;

    let mut children = Vec::new();
    for child in store.child_accounts(path).await? {
        let amount = store.get_balance(&child.path, at_date, true).await?;
        children.push(BalanceLine {
            name: child.name,
            amount,
        });
    }

    let name = path.rsplit(':').next().unwrap_or(path).to_string();
    Ok(AssetGroup {
        name,
        total,
        children,
    })
}

async fn category_deltas<S: LedgerStore>(
    store: &S,
    path: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> ReconcileResult<Vec<CategoryDelta>> {
    let mut categories = Vec::new();

    for category in store.child_accounts(path).await? {
        let amount = if category.placeholder {
            None
        } else {
            Some(delta(store, &category.path, start, end, false).await?)
        };

        let mut children = Vec::new();
        for child in store.child_accounts(&category.path).await? {
            let child_amount = delta(store, &child.path, start, end, false).await?;
            children.push(BalanceLine {
                name: child.name,
                amount: child_amount,
            });
        }

        categories.push(CategoryDelta {
            name: category.name,
            amount,
            children,
        });
    }

    Ok(categories)
}

//! # Reconcile Core
//!
//! A transaction reconciliation and split-allocation engine for importing
//! external payment activity into a double-entry ledger.
//!
//! ## Features
//!
//! - **Idempotent import**: Deterministic external keys (native ids or
//!   content hashes) make every run safely repeatable
//! - **Account routing**: Metadata-driven classification of card, POS and
//!   bank records onto existing ledger accounts
//! - **Split allocation**: Fee-aware three-way charge splits, rent
//!   pre-splits, membership thresholds and loan repayment tables, all
//!   guaranteed to balance to zero
//! - **Watermarked batch runs**: Overlapping fetch windows with the
//!   idempotency gate absorbing the re-fetched tail
//! - **Balance delta reporting**: VAT snapshots and monthly summaries
//!   derived from point-in-time balances
//! - **Storage abstraction**: Ledger-agnostic design with trait-based
//!   store and feed collaborators
//!
//! ## Quick Start
//!
//! ```rust
//! use reconcile_core::{
//!     AccountRouter, LedgerImporter, MemoryStore, SplitAllocator,
//! };
//!
//! // This example shows basic usage - you need to implement the
//! // LedgerStore trait (or use MemoryStore) and supply configuration:
//! // let importer = LedgerImporter::new(store, router, allocator, profile);
//! ```

pub mod config;
pub mod reconcile;
pub mod report;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::*;
pub use reconcile::*;
pub use traits::*;
pub use types::*;
pub use utils::MemoryStore;

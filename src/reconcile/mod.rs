//! The reconciliation engine: key derivation, routing, allocation, import

pub mod allocate;
pub mod importer;
pub mod key;
pub mod router;

pub use allocate::*;
pub use importer::*;
pub use key::*;
pub use router::*;

//! LedgerBank Common Types
//!
//! Value types shared by the ledger engine, the HTTP service and the
//! simulator: account and user identifiers, currencies and validated amounts.

pub mod identifiers;
pub mod monetary;

pub use identifiers::*;
pub use monetary::*;

//! Data access: scoped market sessions, as-of alignment, statement pivots.

pub mod align;
pub mod memory;
pub mod source;
pub mod statements;

pub use memory::InMemoryMarket;
pub use source::{CompanyRef, MarketData, MarketSession, SourceError};

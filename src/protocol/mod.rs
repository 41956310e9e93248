//! Protocol module - hub, price queries and the atomic facade.
//!
//! [`Protocol`] wires the components together over one ledger store and runs
//! every [`ProtocolOperation`] all-or-nothing.

pub mod events;
pub mod hub;
pub mod operations;
pub mod query;
pub mod state_machine;

pub use events::*;
pub use hub::{BuyQuote, Hub, Settlement};
pub use operations::*;
pub use query::{PendingQuery, QueryKind};
pub use state_machine::*;

//! `mozfiscal-engine` — the transactional core.
//!
//! Owns the store, the sequencer, and every workflow command: each command is
//! one atomic unit that validates, mutates, numbers, moves stock, appends to
//! the audit journal, and only then publishes outbound events.

pub mod config;
pub mod declaration;
pub mod escrow_ops;
pub mod lifecycle;
pub mod sequencer;
pub mod stock_ops;
pub mod store;

pub use config::EngineConfig;
pub use declaration::DeclarationEvent;
pub use lifecycle::{AcceptOutcome, CounterOffer, FiscalEngine};
pub use stock_ops::StockEvent;
pub use store::{StoreState, Tx, TxStore};

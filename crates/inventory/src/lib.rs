//! `mozfiscal-inventory` — stock items and the immutable movement ledger.

pub mod stock;

pub use stock::{MovementKind, StockItem, StockItemId, StockMovement};

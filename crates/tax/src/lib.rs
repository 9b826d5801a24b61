//! `mozfiscal-tax` — per-line IVA computation and the periodic declaration.
//!
//! Everything here is pure: the calculator is a function of its inputs, and
//! the declaration's settlement arithmetic has no IO. Scanning documents into
//! accumulators is the engine's job.

pub mod calculator;
pub mod declaration;

pub use calculator::{document_totals, line_computation, DocumentTotals, LineComputation};
pub use declaration::{
    DeclarationAccumulators, DeclarationId, DeclarationState, IvaBracket, Period, Settlement,
    TaxDeclaration, TaxOperation,
};

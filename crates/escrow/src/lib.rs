//! `mozfiscal-escrow` — held buyer funds and payment-method dispatch.

pub mod escrow;
pub mod events;
pub mod payment;

pub use escrow::{DisputeOutcome, EscrowId, EscrowState, EscrowTransaction};
pub use events::EscrowEvent;
pub use payment::{
    GatewayEvent, PaymentMethod, PaymentOutcome, PaymentProcessor, PaymentRequest, PaymentStatus,
};

// mercado_app/src/web/handlers/mod.rs

pub mod checkout_handlers;
pub mod claim_handlers;
pub mod order_handlers;
pub mod reputation_handlers;
pub mod scan_handlers;

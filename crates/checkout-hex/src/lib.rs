//! checkout-hex: order-payment-booking reconciliation core (application
//! services + inbound HTTP).

pub mod config;
pub mod errors;

pub mod application;

pub use checkout_types::{domain, ports};

pub mod inbound; // HTTP adapter (server + handlers)

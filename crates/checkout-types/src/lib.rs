//! checkout-types: domain entities and ports for the checkout core.

pub mod domain;
pub mod ports;

//! Domain services, one per feature module. Each file also holds the
//! `routes` function its module's `run` hook calls.

pub mod auth;
pub mod cart;
pub mod order;
pub mod payment;
pub mod product;

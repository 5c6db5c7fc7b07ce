//! # Shop Errors
//!
//! Every service in the shop reports through [`ShopError`]. The router turns
//! each variant into a status code, so handlers just propagate with `?`.

use modwire::WiringError;

#[derive(Debug, thiserror::Error)]
pub enum ShopError {
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Invalid authentication token")]
    InvalidToken,
    #[error("Admin access required")]
    Forbidden,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("User already exists with this email")]
    UserExists,
    #[error("{0} not found")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Insufficient inventory")]
    InsufficientInventory,
    #[error("Cart is empty")]
    EmptyCart,
    #[error("Payment failed: {0}")]
    PaymentFailed(String),
    #[error("No route for {method} {path}")]
    NoRoute { method: String, path: String },
    #[error("App server closed")]
    ServerClosed,
    #[error("App server dropped response channel")]
    ServerDropped,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Wiring(#[from] WiringError),
}

impl ShopError {
    /// HTTP-style status code reported by the router.
    pub fn status(&self) -> u16 {
        match self {
            ShopError::Unauthenticated | ShopError::InvalidToken | ShopError::InvalidCredentials => {
                401
            }
            ShopError::Forbidden => 403,
            ShopError::NotFound(_) | ShopError::NoRoute { .. } => 404,
            ShopError::UserExists => 409,
            ShopError::BadRequest(_)
            | ShopError::InsufficientInventory
            | ShopError::EmptyCart => 400,
            ShopError::PaymentFailed(_) => 402,
            ShopError::ServerClosed
            | ShopError::ServerDropped
            | ShopError::Config(_)
            | ShopError::Wiring(_) => 500,
        }
    }
}

impl From<serde_json::Error> for ShopError {
    fn from(e: serde_json::Error) -> Self {
        ShopError::BadRequest(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ShopError::Unauthenticated.status(), 401);
        assert_eq!(ShopError::NotFound("Order".into()).status(), 404);
        assert_eq!(ShopError::PaymentFailed("declined".into()).status(), 402);
        assert_eq!(ShopError::NotFound("Order".into()).to_string(), "Order not found");
    }
}

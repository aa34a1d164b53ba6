//! HTTP request handlers (route handlers).
//!
//! Each handler extracts request data, delegates to a service and maps the result to a
//! JSON response. Errors become responses through `AppError`.

/// Admin login, stats and key creation
pub mod admin;
/// Liveness and record store connectivity
pub mod health;
/// Image upload endpoints
pub mod images;

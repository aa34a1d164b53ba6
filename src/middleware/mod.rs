//! HTTP middleware components.
//!
//! Middleware run before route handlers. They can reject a request before it reaches
//! the handler, as admin authentication does.

/// Admin session authentication middleware
pub mod admin_auth;

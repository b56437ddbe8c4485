//! Wayline Server
//!
//! Administrator authentication core for the Wayline transportation-data
//! platform: credential verification with progressive lockout, TOTP MFA with
//! single-use backup codes, correlated access/refresh token pairs, and
//! session tracking with replay-safe rotation.

pub mod audit;
pub mod auth;
pub mod config;
pub mod email;
pub mod store;

//! Core use-case services.
//!
//! # Responsibility
//! - Reconcile in-memory key values with the key and value stores.
//! - Keep callers decoupled from storage details.

pub mod persistence_service;

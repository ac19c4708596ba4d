//! Command handlers.

pub mod fetch;

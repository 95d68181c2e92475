//! Core traits and types for dirauth authentication back-ends.

pub mod auth;

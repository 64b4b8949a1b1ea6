//! Volume expander operator
//!
//! Wires the expander library to a Kubernetes controller and serves
//! health and metrics endpoints.

pub mod api;
pub mod config;
pub mod controller;

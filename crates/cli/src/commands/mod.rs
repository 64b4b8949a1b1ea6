//! CLI subcommands

pub mod claims;
pub mod plan;
pub mod policy;

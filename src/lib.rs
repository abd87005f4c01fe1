//! Workspace/widget configuration engine.
//!
//! Dashboard-like surfaces are composed from a registry of pluggable widgets,
//! arranged in a resizable grid, persisted per user, migrated across schema
//! versions and exchanged via export files. The host application registers
//! its widget types once at bootstrap, then reads and mutates configurations
//! through [`store::WorkspaceStore`]; every configuration passes through
//! [`lifecycle::complete_configuration`] before it is trusted.

pub mod codec;
pub mod config;
pub mod ids;
pub mod layout;
pub mod lifecycle;
pub mod logging;
pub mod registry;
pub mod store;

//! Core library: filename matching, watch rules, label reconciliation.

pub mod admin;
pub mod config;
pub mod error;
pub mod events;
pub mod labels;
pub mod matcher;
pub mod memory;
pub mod models;
pub mod options;
pub mod reconciler;
pub mod rules;
pub mod sqlite;
pub mod store;

//! Public library modules for the CLI crate
pub mod app;
pub mod event;
pub mod views;

//! Task text parsing and an offline cache controller for the toolbox app.

pub mod config;
pub mod daemon;
pub mod db;
pub mod logging;
pub mod nlp;
pub mod offline;

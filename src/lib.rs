//! Terminal chat client that reveals every reply through falling code.

pub mod ai;
pub mod app;
pub mod chat;
pub mod commands;
pub mod config;
pub mod rain;
pub mod terminal;

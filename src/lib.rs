//! Aqua Buddy library — re-exports modules for the binary and integration tests.

pub mod chat;
pub mod command;
pub mod config;
pub mod controller;
pub mod logging;
pub mod notify;
pub mod scheduler;
pub mod state;
pub mod storage;
pub mod ui;
pub mod worker;

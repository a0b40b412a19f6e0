//! Snippet playground: runs JavaScript in a disposable sandbox process and
//! Python in a long-lived interpreter, capturing output into one sink.

pub mod cli;
pub mod config;
pub mod controller;
pub mod execution;
pub mod output;
pub mod printer;
pub mod process;
pub mod protocol;
pub mod store;
pub mod tui;
pub mod utils;

// src/lib.rs
// runcell - Execution session manager for notebook-style code cells

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod error;
pub mod executor;
pub mod export;

pub use error::{Result, RuncellError};
pub use executor::{CellExecutor, ExecutionResult, ExecutorConfig, InterpreterProfile};
pub use export::{render_notebook, render_script, Cell, CellKind};

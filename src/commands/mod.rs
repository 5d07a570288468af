//! CLI subcommand implementations for mangahub.
//!
//! - [`join`] - Interactive chat session
//! - [`history`] - One-shot chat history view
//! - [`config`] - Show and edit the config file
//!
//! # Usage
//!
//! Commands are invoked from the main CLI dispatcher:
//!
//! ```ignore
//! use mangahub::commands;
//!
//! commands::join::run(&config, Some("one-piece")).await?;
//! commands::history::run(&config, None, Some(50)).await?;
//! commands::config::show(&config)?;
//! ```

pub mod config;
pub mod history;
pub mod join;

//! daobot: Discord bot for AI pull-request review and DAO governance.
//!
//! Receives slash commands over Discord's HTTP interactions endpoint:
//! - PR analysis and code review via the Groq inference API
//! - Premium commands gated by a Crossmint token-balance check
//! - Token-weighted yes/no voting on governance proposals

pub mod commands;
pub mod config;
pub mod gate;
pub mod github;
pub mod governance;
pub mod interactions;
pub mod llm;
pub mod output;
pub mod registry;
pub mod wallet;

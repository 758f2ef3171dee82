//! Runtime configuration.
//!
//! Everything comes from CLI flags or environment variables. Required API
//! credentials have no defaults — missing ones fail at startup with a clear
//! clap error instead of surfacing mid-request.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "daobot", about = "Discord bot for AI PR review and DAO voting")]
pub struct BotConfig {
    /// Discord bot token (used for command registration and follow-ups)
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    pub discord_token: String,

    /// Discord application id
    #[arg(long, env = "DISCORD_APP_ID")]
    pub discord_app_id: String,

    /// Hex-encoded Ed25519 public key for interaction signature checks
    #[arg(long, env = "DISCORD_PUBLIC_KEY")]
    pub discord_public_key: String,

    /// Groq API key
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub groq_api_key: String,

    /// Crossmint API key
    #[arg(long, env = "CROSSMINT_API_KEY", hide_env_values = true)]
    pub crossmint_api_key: String,

    /// GitHub API token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: String,

    /// Address for the interactions HTTP server
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Governance database path
    #[arg(long, default_value = "daobot.db")]
    pub db_path: PathBuf,

    /// Crossmint environment: "staging" or "production"
    #[arg(long, env = "CROSSMINT_ENV", default_value = "staging")]
    pub crossmint_env: String,

    /// Currency symbol of the governance token on Crossmint
    #[arg(long, default_value = "gdt")]
    pub token_currency: String,

    /// Minimum balance (base units) for premium commands
    #[arg(long, env = "PREMIUM_THRESHOLD", default_value_t = 1_000)]
    pub premium_threshold: u64,

    /// Minimum balance (base units) to create a proposal
    #[arg(long, default_value_t = 100_000)]
    pub min_propose_balance: u64,

    /// Minimum total vote weight for a proposal to pass on close
    #[arg(long, default_value_t = 0)]
    pub quorum_weight: u64,

    /// Groq model name
    #[arg(long, default_value = "mixtral-8x7b-32768")]
    pub groq_model: String,
}

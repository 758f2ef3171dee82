//! daobot: Discord bot for AI PR review, token-gated premium access, and
//! DAO voting.
//!
//! Runs as a single HTTP server receiving Discord interaction webhooks.
//! Commands:
//!
//!   /analyze-pr <url>        — AI pull-request analysis
//!   /review-code <code>      — AI code review
//!   /analyze-pr-deep <url>   — in-depth analysis (premium)
//!   /security-scan <url>     — security audit (premium)
//!   /optimize <code>         — performance review (premium)
//!   /vote <id> <yes|no>      — token-weighted governance vote
//!   /proposal ...            — create / show / tally / close proposals
//!   /balance                 — token balance and tier
//!   /register                — create a custodial wallet
//!
//! Requires DISCORD_TOKEN, DISCORD_APP_ID, DISCORD_PUBLIC_KEY,
//! GROQ_API_KEY, CROSSMINT_API_KEY, and GITHUB_TOKEN.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use daobot::commands::Handler;
use daobot::config::BotConfig;
use daobot::gate::AccessGate;
use daobot::github::GithubClient;
use daobot::governance::{Governance, VoteStore};
use daobot::interactions::{self, AppState, SignatureVerifier};
use daobot::llm::GroqClient;
use daobot::registry::DiscordRest;
use daobot::wallet::CrossmintWallet;

#[tokio::main]
async fn main() -> Result<()> {
    // Use JSON logs in production (DAOBOT_LOG_JSON=1), human-readable otherwise
    let json_logs = std::env::var("DAOBOT_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("daobot=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = BotConfig::parse();

    let store = Arc::new(VoteStore::open(&config.db_path).context("Failed to open governance database")?);

    let wallet = CrossmintWallet::new(
        config.crossmint_api_key.clone(),
        &config.crossmint_env,
        config.token_currency.clone(),
    );
    let gate = AccessGate::new(wallet.clone(), config.premium_threshold);
    let governance = Governance::new(
        store.clone(),
        wallet.clone(),
        config.min_propose_balance,
        config.quorum_weight,
    );
    let llm = GroqClient::new(config.groq_api_key.clone()).with_model(&config.groq_model);
    let github = GithubClient::new(config.github_token.clone());
    let rest = DiscordRest::new(config.discord_token.clone(), config.discord_app_id.clone());

    rest.register_commands()
        .await
        .context("Failed to register slash commands")?;

    let verifier = SignatureVerifier::from_hex(&config.discord_public_key)
        .context("Invalid DISCORD_PUBLIC_KEY")?;
    let handler = Arc::new(Handler::new(gate, governance, wallet, llm, github, rest));
    let state = Arc::new(AppState {
        verifier,
        handler,
        store,
    });

    tracing::info!(
        listen = %config.listen_addr,
        db = %config.db_path.display(),
        threshold = config.premium_threshold,
        "Starting daobot"
    );

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    axum::serve(listener, interactions::router(state))
        .await
        .context("HTTP server error")?;

    Ok(())
}

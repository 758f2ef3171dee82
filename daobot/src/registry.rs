//! Discord REST: slash-command registration and interaction follow-ups.
//!
//! Registration happens once at startup with a bulk PUT; Discord replaces
//! the whole command set with the manifest. Follow-ups are webhook POSTs
//! used after a deferred response.

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};

const API_BASE: &str = "https://discord.com/api/v10";

// Discord application command option types.
const OPT_SUB_COMMAND: u8 = 1;
const OPT_STRING: u8 = 3;
const OPT_INTEGER: u8 = 4;

/// Discord REST client (bot-token auth).
#[derive(Clone)]
pub struct DiscordRest {
    bot_token: String,
    app_id: String,
    http: reqwest::Client,
}

impl DiscordRest {
    pub fn new(bot_token: String, app_id: String) -> Self {
        Self {
            bot_token,
            app_id,
            http: reqwest::Client::new(),
        }
    }

    /// Replace the application's global command set with [`command_manifest`].
    pub async fn register_commands(&self) -> Result<()> {
        let url = format!("{API_BASE}/applications/{}/commands", self.app_id);
        let resp = self
            .http
            .put(&url)
            .header("Authorization", format!("Bot {}", self.bot_token))
            .json(&command_manifest())
            .send()
            .await
            .context("Failed to call Discord API")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Command registration failed {status}: {body}");
        }
        tracing::info!("Registered slash commands");
        Ok(())
    }

    /// Post a follow-up message for a deferred interaction.
    pub async fn followup(&self, interaction_token: &str, data: &Value) -> Result<()> {
        let url = format!("{API_BASE}/webhooks/{}/{interaction_token}", self.app_id);
        let resp = self
            .http
            .post(&url)
            .json(data)
            .send()
            .await
            .context("Failed to post follow-up")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Follow-up failed {status}: {body}");
        }
        Ok(())
    }
}

fn url_option() -> Value {
    json!({
        "type": OPT_STRING,
        "name": "url",
        "description": "GitHub pull request URL",
        "required": true,
    })
}

fn code_option() -> Value {
    json!({
        "type": OPT_STRING,
        "name": "code",
        "description": "Code snippet",
        "required": true,
    })
}

fn id_option() -> Value {
    json!({
        "type": OPT_INTEGER,
        "name": "proposal-id",
        "description": "Proposal id",
        "required": true,
    })
}

/// The full slash-command set.
pub fn command_manifest() -> Value {
    json!([
        {
            "name": "analyze-pr",
            "description": "Analyze a GitHub pull request",
            "options": [url_option()],
        },
        {
            "name": "review-code",
            "description": "Review a code snippet",
            "options": [code_option()],
        },
        {
            "name": "analyze-pr-deep",
            "description": "In-depth PR analysis (premium)",
            "options": [url_option()],
        },
        {
            "name": "security-scan",
            "description": "Security scan of a pull request (premium)",
            "options": [url_option()],
        },
        {
            "name": "optimize",
            "description": "Optimization suggestions for a snippet (premium)",
            "options": [code_option()],
        },
        {
            "name": "vote",
            "description": "Vote on a governance proposal",
            "options": [
                id_option(),
                {
                    "type": OPT_STRING,
                    "name": "choice",
                    "description": "Your vote",
                    "required": true,
                    "choices": [
                        { "name": "yes", "value": "yes" },
                        { "name": "no", "value": "no" },
                    ],
                },
            ],
        },
        {
            "name": "proposal",
            "description": "Manage governance proposals",
            "options": [
                {
                    "type": OPT_SUB_COMMAND,
                    "name": "create",
                    "description": "Create a proposal",
                    "options": [
                        {
                            "type": OPT_STRING,
                            "name": "title",
                            "description": "Short title",
                            "required": true,
                        },
                        {
                            "type": OPT_STRING,
                            "name": "description",
                            "description": "What is being decided",
                            "required": true,
                        },
                    ],
                },
                {
                    "type": OPT_SUB_COMMAND,
                    "name": "show",
                    "description": "Show a proposal",
                    "options": [id_option()],
                },
                {
                    "type": OPT_SUB_COMMAND,
                    "name": "tally",
                    "description": "Show the running tally",
                    "options": [id_option()],
                },
                {
                    "type": OPT_SUB_COMMAND,
                    "name": "close",
                    "description": "Close a proposal and compute the outcome",
                    "options": [id_option()],
                },
            ],
        },
        {
            "name": "balance",
            "description": "Show your token balance and tier",
        },
        {
            "name": "register",
            "description": "Create your custodial wallet",
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_covers_all_commands() {
        let manifest = command_manifest();
        let names: Vec<&str> = manifest
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        for expected in [
            "analyze-pr",
            "review-code",
            "analyze-pr-deep",
            "security-scan",
            "optimize",
            "vote",
            "proposal",
            "balance",
            "register",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn vote_choice_is_constrained() {
        let manifest = command_manifest();
        let vote = manifest
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["name"] == "vote")
            .unwrap();
        let choice = vote["options"]
            .as_array()
            .unwrap()
            .iter()
            .find(|o| o["name"] == "choice")
            .unwrap();
        let values: Vec<&str> = choice["choices"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["value"].as_str().unwrap())
            .collect();
        assert_eq!(values, vec!["yes", "no"]);
    }
}

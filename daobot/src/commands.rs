//! Slash-command dispatch and handlers.
//!
//! Governance and balance commands answer inline. Analysis commands call
//! the inference API, which can outlast Discord's 3-second response window,
//! so they acknowledge with a deferred response and post the result as a
//! follow-up from a spawned task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use crate::gate::AccessGate;
use crate::github::{self, GithubClient};
use crate::governance::{Governance, GovernanceError, VoteChoice};
use crate::interactions::{
    CommandData, Interaction, RESPONSE_DEFERRED, RESPONSE_MESSAGE,
};
use crate::llm::GroqClient;
use crate::output;
use crate::registry::DiscordRest;
use crate::wallet::CrossmintWallet;

/// Minimum gap between analysis requests per user.
const ANALYSIS_COOLDOWN: Duration = Duration::from_secs(30);

const PROVIDER_DOWN: &str =
    "The wallet provider is unavailable right now — please try again later.";

const PR_ANALYSIS_SYSTEM: &str = "\
You are a senior engineer reviewing a pull request. Provide:
1. Overview of the changes
2. Impact analysis
3. Implementation quality
4. Recommendations
Be specific; reference the actual files and hunks in the diff.";

const CODE_REVIEW_SYSTEM: &str = "\
You are a senior engineer reviewing a code snippet. Provide:
1. A brief summary
2. Potential issues or risks
3. Best-practice recommendations
Be concrete and reference the code directly.";

const DEEP_ANALYSIS_SYSTEM: &str = "\
You are a principal engineer performing an in-depth pull request review.
Provide:
1. Overview and intent of the changes
2. Architecture and design impact
3. Correctness concerns, edge cases, race conditions
4. Test coverage gaps
5. Prioritized recommendations
Reference actual files and hunks. No generic advice.";

const SECURITY_SCAN_SYSTEM: &str = "\
You are a security engineer auditing a pull request. Report:
1. Injection, authn/authz, and data-exposure risks introduced
2. Unsafe handling of untrusted input
3. Secrets or credentials in the diff
4. Severity-ranked findings with concrete fixes
If nothing is concerning, say so explicitly.";

const OPTIMIZE_SYSTEM: &str = "\
You are a performance engineer. For the given code, provide:
1. Algorithmic complexity of the hot paths
2. Allocation and copy overhead
3. Concrete optimization suggestions, highest impact first
Only suggest changes that preserve behavior.";

/// What an analysis command operates on.
enum AnalysisInput {
    PrUrl,
    Code,
}

struct AnalysisSpec {
    kind: &'static str,
    system: &'static str,
    input: AnalysisInput,
    premium: bool,
}

fn analysis_spec(command: &str) -> Option<AnalysisSpec> {
    match command {
        "analyze-pr" => Some(AnalysisSpec {
            kind: "pr",
            system: PR_ANALYSIS_SYSTEM,
            input: AnalysisInput::PrUrl,
            premium: false,
        }),
        "review-code" => Some(AnalysisSpec {
            kind: "review",
            system: CODE_REVIEW_SYSTEM,
            input: AnalysisInput::Code,
            premium: false,
        }),
        "analyze-pr-deep" => Some(AnalysisSpec {
            kind: "pr-deep",
            system: DEEP_ANALYSIS_SYSTEM,
            input: AnalysisInput::PrUrl,
            premium: true,
        }),
        "security-scan" => Some(AnalysisSpec {
            kind: "security",
            system: SECURITY_SCAN_SYSTEM,
            input: AnalysisInput::PrUrl,
            premium: true,
        }),
        "optimize" => Some(AnalysisSpec {
            kind: "optimize",
            system: OPTIMIZE_SYSTEM,
            input: AnalysisInput::Code,
            premium: true,
        }),
        _ => None,
    }
}

/// Command handler with all service dependencies.
pub struct Handler {
    gate: AccessGate<CrossmintWallet>,
    governance: Governance<CrossmintWallet>,
    wallet: CrossmintWallet,
    llm: GroqClient,
    github: GithubClient,
    rest: DiscordRest,
    cooldowns: Mutex<HashMap<String, Instant>>,
}

fn respond(data: Value) -> Value {
    json!({ "type": RESPONSE_MESSAGE, "data": data })
}

fn deferred() -> Value {
    json!({ "type": RESPONSE_DEFERRED })
}

impl Handler {
    pub fn new(
        gate: AccessGate<CrossmintWallet>,
        governance: Governance<CrossmintWallet>,
        wallet: CrossmintWallet,
        llm: GroqClient,
        github: GithubClient,
        rest: DiscordRest,
    ) -> Self {
        Self {
            gate,
            governance,
            wallet,
            llm,
            github,
            rest,
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    /// Route an application-command interaction to its handler and produce
    /// the interaction response.
    pub async fn dispatch(self: Arc<Self>, interaction: Interaction) -> Value {
        let Some(data) = interaction.data.clone() else {
            return respond(output::ephemeral("Malformed command."));
        };
        let Some(user_id) = interaction.invoker().map(|u| u.id.clone()) else {
            return respond(output::ephemeral("Could not identify the invoking user."));
        };
        tracing::info!(command = %data.name, user = %user_id, "Dispatching command");

        if let Some(spec) = analysis_spec(&data.name) {
            return self.analysis(interaction, data, user_id, spec).await;
        }

        match data.name.as_str() {
            "vote" => self.vote(&data, &user_id).await,
            "proposal" => self.proposal(&data, &user_id).await,
            "balance" => self.balance(&user_id).await,
            "register" => self.register(&user_id).await,
            other => {
                tracing::debug!(command = other, "Unknown command");
                respond(output::ephemeral("Unknown command."))
            }
        }
    }

    // ── Analysis commands ──────────────────────────────────────────────

    async fn analysis(
        self: Arc<Self>,
        interaction: Interaction,
        data: CommandData,
        user_id: String,
        spec: AnalysisSpec,
    ) -> Value {
        if !self.can_analyze(&user_id) {
            return respond(output::ephemeral(
                "Please wait before requesting another analysis.",
            ));
        }

        if spec.premium {
            match self.gate.check(&user_id).await {
                Err(e) => {
                    tracing::warn!(error = %e, user = %user_id, "Gate check failed");
                    return respond(output::ephemeral(PROVIDER_DOWN));
                }
                Ok(decision) if !decision.premium => {
                    return respond(output::ephemeral(&format!(
                        "This command needs a balance of {} — you hold {}.",
                        self.gate.threshold(),
                        decision.balance
                    )));
                }
                Ok(_) => {}
            }
        }

        // Validate the argument before deferring, so bad input gets an
        // immediate ephemeral reply instead of a dangling "thinking" state.
        let (content_source, url) = match spec.input {
            AnalysisInput::PrUrl => {
                let Some(raw) = CommandData::str_option(&data.options, "url") else {
                    return respond(output::ephemeral("A pull request URL is required."));
                };
                match github::parse_pr_url(raw) {
                    Ok(pr) => (ContentSource::Pr(pr), Some(raw.to_string())),
                    Err(e) => {
                        return respond(output::ephemeral(&format!("Bad PR URL: {e}")));
                    }
                }
            }
            AnalysisInput::Code => {
                let Some(code) = CommandData::str_option(&data.options, "code") else {
                    return respond(output::ephemeral("A code snippet is required."));
                };
                (ContentSource::Code(code.to_string()), None)
            }
        };

        let Some(token) = interaction.token.clone() else {
            return respond(output::ephemeral("Malformed command."));
        };

        self.note_analysis(&user_id);

        let handler = self.clone();
        tokio::spawn(async move {
            let result = handler
                .run_analysis(&spec, content_source, url.as_deref())
                .await;
            let payload = match result {
                Ok(embed) => output::embeds(embed),
                Err(e) => {
                    tracing::error!(error = %e, kind = spec.kind, "Analysis failed");
                    output::message(&format!("Sorry, the analysis failed: {e}"))
                }
            };
            if let Err(e) = handler.rest.followup(&token, &payload).await {
                tracing::error!(error = %e, "Failed to post follow-up");
            }
        });

        deferred()
    }

    async fn run_analysis(
        &self,
        spec: &AnalysisSpec,
        source: ContentSource,
        url: Option<&str>,
    ) -> anyhow::Result<Value> {
        let (title, content) = match source {
            ContentSource::Pr(pr) => {
                let digest = self.github.pr_digest(&pr).await?;
                (format!("{}/{} #{}", pr.owner, pr.repo, pr.number), digest)
            }
            ContentSource::Code(code) => ("Code review".to_string(), code),
        };
        let analysis = self.llm.analyze(spec.kind, spec.system, &content).await?;
        Ok(output::analysis_embed(&title, url, &analysis))
    }

    fn can_analyze(&self, user_id: &str) -> bool {
        let cooldowns = self.cooldowns.lock().unwrap();
        match cooldowns.get(user_id) {
            Some(last) => last.elapsed() >= ANALYSIS_COOLDOWN,
            None => true,
        }
    }

    fn note_analysis(&self, user_id: &str) {
        self.cooldowns
            .lock()
            .unwrap()
            .insert(user_id.to_string(), Instant::now());
    }

    // ── Governance commands ────────────────────────────────────────────

    async fn vote(&self, data: &CommandData, user_id: &str) -> Value {
        let Some(proposal_id) = CommandData::int_option(&data.options, "proposal-id") else {
            return respond(output::ephemeral("A proposal id is required."));
        };
        let choice = CommandData::str_option(&data.options, "choice")
            .and_then(VoteChoice::parse);
        let Some(choice) = choice else {
            return respond(output::ephemeral("Vote must be yes or no."));
        };

        match self.governance.cast_vote(proposal_id, user_id, choice).await {
            Ok(vote) => respond(output::message(&format!(
                "Recorded your **{}** vote on proposal #{} with weight {}.",
                choice.as_str(),
                proposal_id,
                vote.weight
            ))),
            Err(e) => respond(output::ephemeral(&governance_error_message(e))),
        }
    }

    async fn proposal(&self, data: &CommandData, user_id: &str) -> Value {
        let Some((sub, options)) = data.subcommand() else {
            return respond(output::ephemeral("A proposal subcommand is required."));
        };

        match sub {
            "create" => {
                let title = CommandData::str_option(options, "title");
                let description = CommandData::str_option(options, "description");
                let (Some(title), Some(description)) = (title, description) else {
                    return respond(output::ephemeral("Title and description are required."));
                };
                match self.governance.propose(title, description, user_id).await {
                    Ok(p) => respond(output::embeds(output::proposal_embed(&p))),
                    Err(e) => respond(output::ephemeral(&governance_error_message(e))),
                }
            }
            "show" => match self.required_id(options) {
                Ok(id) => match self.governance.proposal(id) {
                    Ok(p) => respond(output::embeds(output::proposal_embed(&p))),
                    Err(e) => respond(output::ephemeral(&governance_error_message(e))),
                },
                Err(msg) => respond(output::ephemeral(msg)),
            },
            "tally" => match self.required_id(options) {
                Ok(id) => {
                    let result = self
                        .governance
                        .proposal(id)
                        .and_then(|p| Ok((self.governance.tally(id)?, p)));
                    match result {
                        Ok((tally, p)) => respond(output::embeds(output::tally_embed(&p, &tally))),
                        Err(e) => respond(output::ephemeral(&governance_error_message(e))),
                    }
                }
                Err(msg) => respond(output::ephemeral(msg)),
            },
            "close" => match self.required_id(options) {
                Ok(id) => match self.governance.close(id, user_id) {
                    Ok(outcome) => respond(output::message(&format!(
                        "Proposal #{} closed: **{}** (yes {} / no {}, {} voters).",
                        id,
                        if outcome.passed { "passed" } else { "defeated" },
                        outcome.tally.yes_weight,
                        outcome.tally.no_weight,
                        outcome.tally.voters
                    ))),
                    Err(e) => respond(output::ephemeral(&governance_error_message(e))),
                },
                Err(msg) => respond(output::ephemeral(msg)),
            },
            other => {
                tracing::debug!(subcommand = other, "Unknown proposal subcommand");
                respond(output::ephemeral("Unknown proposal subcommand."))
            }
        }
    }

    fn required_id(
        &self,
        options: &[crate::interactions::CommandOption],
    ) -> Result<i64, &'static str> {
        CommandData::int_option(options, "proposal-id").ok_or("A proposal id is required.")
    }

    async fn register(&self, user_id: &str) -> Value {
        match self.wallet.create_wallet(user_id).await {
            Ok(wallet) => respond(output::ephemeral(&format!(
                "Your custodial wallet is ready: `{}`",
                wallet.address
            ))),
            Err(e) => {
                tracing::warn!(error = %e, user = %user_id, "Wallet creation failed");
                respond(output::ephemeral(PROVIDER_DOWN))
            }
        }
    }

    async fn balance(&self, user_id: &str) -> Value {
        match self.gate.check(user_id).await {
            Ok(decision) => respond(output::embeds(output::balance_embed(
                &decision,
                self.gate.threshold(),
            ))),
            Err(e) => {
                tracing::warn!(error = %e, user = %user_id, "Balance lookup failed");
                respond(output::ephemeral(PROVIDER_DOWN))
            }
        }
    }
}

enum ContentSource {
    Pr(github::PrRef),
    Code(String),
}

fn governance_error_message(err: GovernanceError) -> String {
    match err {
        GovernanceError::UnknownProposal(id) => format!("Proposal {id} not found."),
        GovernanceError::ProposalClosed(id) => format!("Proposal {id} is closed."),
        GovernanceError::InsufficientBalance { required, held } => format!(
            "Creating a proposal needs a balance of {required} — you hold {held}."
        ),
        GovernanceError::NotProposer(id) => {
            format!("Only the proposer can close proposal {id}.")
        }
        GovernanceError::Wallet(_) => PROVIDER_DOWN.to_string(),
        GovernanceError::Db(e) => {
            tracing::error!(error = %e, "Governance database error");
            "Something went wrong — please try again later.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_specs_cover_all_analysis_commands() {
        for name in [
            "analyze-pr",
            "review-code",
            "analyze-pr-deep",
            "security-scan",
            "optimize",
        ] {
            assert!(analysis_spec(name).is_some(), "missing spec for {name}");
        }
        assert!(analysis_spec("vote").is_none());
    }

    #[test]
    fn premium_flags_match_tiering() {
        assert!(!analysis_spec("analyze-pr").unwrap().premium);
        assert!(!analysis_spec("review-code").unwrap().premium);
        assert!(analysis_spec("analyze-pr-deep").unwrap().premium);
        assert!(analysis_spec("security-scan").unwrap().premium);
        assert!(analysis_spec("optimize").unwrap().premium);
    }

    #[test]
    fn error_messages_are_user_facing() {
        let msg = governance_error_message(GovernanceError::UnknownProposal(9));
        assert!(msg.contains("9"));
        let msg = governance_error_message(GovernanceError::Wallet(
            crate::wallet::WalletError::Provider("timeout".into()),
        ));
        assert_eq!(msg, PROVIDER_DOWN);
        // Internal detail never leaks to the user.
        assert!(!msg.contains("timeout"));
    }
}

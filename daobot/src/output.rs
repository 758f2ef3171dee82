//! Discord message and embed assembly.
//!
//! Interaction responses are plain JSON; these builders keep the handlers
//! free of format noise and enforce Discord's length limits (256-char
//! titles, 4096-char descriptions).

use serde_json::{Value, json};

use crate::gate::AccessDecision;
use crate::governance::{Proposal, Tally};

const COLOR_BLUE: u32 = 0x3498db;
const COLOR_GREEN: u32 = 0x2ecc71;
const COLOR_RED: u32 = 0xe74c3c;

const MAX_TITLE: usize = 256;
const MAX_DESCRIPTION: usize = 4096;

/// Ephemeral message flag.
pub const EPHEMERAL: u64 = 64;

/// Response data: a visible text message.
pub fn message(content: &str) -> Value {
    json!({ "content": content })
}

/// Response data: a message only the invoking user sees.
pub fn ephemeral(content: &str) -> Value {
    json!({ "content": content, "flags": EPHEMERAL })
}

/// Response data wrapping a single embed.
pub fn embeds(embed: Value) -> Value {
    json!({ "embeds": [embed] })
}

/// An AI analysis result, linking back to the analyzed URL when there is one.
pub fn analysis_embed(title: &str, url: Option<&str>, body: &str) -> Value {
    let mut embed = json!({
        "title": clip(title, MAX_TITLE),
        "description": clip(body, MAX_DESCRIPTION),
        "color": COLOR_BLUE,
    });
    if let Some(url) = url {
        embed["url"] = json!(url);
    }
    embed
}

pub fn proposal_embed(proposal: &Proposal) -> Value {
    json!({
        "title": clip(&format!("Proposal #{}: {}", proposal.id, proposal.title), MAX_TITLE),
        "description": clip(&proposal.description, MAX_DESCRIPTION),
        "color": COLOR_GREEN,
        "fields": [
            { "name": "Status", "value": proposal.status.as_str(), "inline": true },
            { "name": "Proposer", "value": format!("<@{}>", proposal.proposer), "inline": true },
            { "name": "Created", "value": proposal.created_at.clone(), "inline": true },
        ],
    })
}

pub fn tally_embed(proposal: &Proposal, tally: &Tally) -> Value {
    json!({
        "title": clip(&format!("Tally — Proposal #{}: {}", proposal.id, proposal.title), MAX_TITLE),
        "description": weight_bar(tally),
        "color": COLOR_BLUE,
        "fields": [
            { "name": "Yes", "value": tally.yes_weight.to_string(), "inline": true },
            { "name": "No", "value": tally.no_weight.to_string(), "inline": true },
            { "name": "Voters", "value": tally.voters.to_string(), "inline": true },
        ],
    })
}

pub fn balance_embed(decision: &AccessDecision, threshold: u64) -> Value {
    let (status, color) = if decision.premium {
        ("premium", COLOR_GREEN)
    } else {
        ("standard", COLOR_RED)
    };
    json!({
        "title": "Token Balance",
        "color": color,
        "fields": [
            { "name": "Balance", "value": decision.balance.to_string(), "inline": true },
            { "name": "Tier", "value": status, "inline": true },
            { "name": "Premium threshold", "value": threshold.to_string(), "inline": true },
        ],
    })
}

/// Horizontal yes/no bar, 20 cells.
fn weight_bar(tally: &Tally) -> String {
    let total = tally.total_weight();
    if total == 0 {
        return "No weighted votes yet".to_string();
    }
    let yes_cells = ((tally.yes_weight as f64 / total as f64) * 20.0).round() as usize;
    let yes_cells = yes_cells.min(20);
    let pct = (tally.yes_weight as f64 / total as f64) * 100.0;
    format!(
        "`{}{}` {:.0}% yes",
        "█".repeat(yes_cells),
        "░".repeat(20 - yes_cells),
        pct
    )
}

fn clip(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

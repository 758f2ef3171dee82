//! GitHub pull request fetch.
//!
//! Resolves a PR URL to a bounded text digest (title, author, body, changed
//! files with patches) for the inference prompt. First page of files only —
//! huge PRs get truncated, not paginated.

use anyhow::{Context, Result, bail};
use serde::Deserialize;

const API_BASE: &str = "https://api.github.com";
const MAX_BODY: usize = 2000;
const MAX_PATCH: usize = 3000;
const MAX_FILES: usize = 20;

/// owner/repo/number parsed out of a PR URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

/// Parse `https://github.com/{owner}/{repo}/pull/{number}`.
pub fn parse_pr_url(url: &str) -> Result<PrRef> {
    let rest = url
        .strip_prefix("https://github.com/")
        .or_else(|| url.strip_prefix("http://github.com/"))
        .with_context(|| format!("not a GitHub URL: {url}"))?;

    let mut parts = rest.split('/');
    let owner = parts.next().unwrap_or_default();
    let repo = parts.next().unwrap_or_default();
    let kind = parts.next().unwrap_or_default();
    let number = parts.next().unwrap_or_default();

    if owner.is_empty() || repo.is_empty() || kind != "pull" {
        bail!("not a pull request URL: {url}");
    }
    let number: u64 = number
        .parse()
        .with_context(|| format!("bad PR number in URL: {url}"))?;

    Ok(PrRef {
        owner: owner.to_string(),
        repo: repo.to_string(),
        number,
    })
}

#[derive(Debug, Deserialize)]
struct PrData {
    title: String,
    body: Option<String>,
    user: PrUser,
    additions: u64,
    deletions: u64,
    changed_files: u64,
}

#[derive(Debug, Deserialize)]
struct PrUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct PrFile {
    filename: String,
    status: String,
    additions: u64,
    deletions: u64,
    patch: Option<String>,
}

/// GitHub REST client.
#[derive(Clone)]
pub struct GithubClient {
    token: String,
    http: reqwest::Client,
}

impl GithubClient {
    pub fn new(token: String) -> Self {
        Self {
            token,
            http: reqwest::Client::new(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .http
            .get(format!("{API_BASE}{path}"))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "daobot")
            .send()
            .await
            .context("Failed to call GitHub API")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("GitHub API error {status}: {body}");
        }
        resp.json::<T>().await.context("Failed to parse GitHub response")
    }

    /// Fetch a PR and assemble the analysis digest.
    pub async fn pr_digest(&self, pr: &PrRef) -> Result<String> {
        let base = format!("/repos/{}/{}/pulls/{}", pr.owner, pr.repo, pr.number);
        let data: PrData = self.get(&base).await?;
        let files: Vec<PrFile> = self.get(&format!("{base}/files")).await?;

        let mut digest = format!(
            "# {} (#{})\nAuthor: {}\n+{} -{} across {} files\n",
            data.title, pr.number, data.user.login, data.additions, data.deletions,
            data.changed_files,
        );
        if let Some(body) = &data.body {
            if !body.is_empty() {
                digest.push_str("\n## Description\n");
                digest.push_str(truncated(body, MAX_BODY));
                digest.push('\n');
            }
        }

        digest.push_str("\n## Changes\n");
        for file in files.iter().take(MAX_FILES) {
            digest.push_str(&format!(
                "\n### {} ({}, +{} -{})\n",
                file.filename, file.status, file.additions, file.deletions
            ));
            if let Some(patch) = &file.patch {
                digest.push_str("```diff\n");
                digest.push_str(truncated(patch, MAX_PATCH));
                digest.push_str("\n```\n");
            }
        }
        if files.len() > MAX_FILES {
            digest.push_str(&format!("\n... and {} more files\n", files.len() - MAX_FILES));
        }

        Ok(digest)
    }
}

/// Truncate on a char boundary.
fn truncated(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_pr_url() {
        let pr = parse_pr_url("https://github.com/rust-lang/rust/pull/1234").unwrap();
        assert_eq!(
            pr,
            PrRef {
                owner: "rust-lang".into(),
                repo: "rust".into(),
                number: 1234,
            }
        );
    }

    #[test]
    fn accepts_trailing_segments() {
        let pr = parse_pr_url("https://github.com/o/r/pull/7/files").unwrap();
        assert_eq!(pr.number, 7);
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!(parse_pr_url("https://gitlab.com/o/r/pull/1").is_err());
        assert!(parse_pr_url("https://github.com/o/r/issues/1").is_err());
        assert!(parse_pr_url("https://github.com/o/r/pull/abc").is_err());
        assert!(parse_pr_url("https://github.com/o").is_err());
        assert!(parse_pr_url("not a url").is_err());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncated("hello", 10), "hello");
        assert_eq!(truncated("hello", 3), "hel");
        // 'é' is two bytes; don't split it.
        assert_eq!(truncated("héllo", 2), "h");
    }
}

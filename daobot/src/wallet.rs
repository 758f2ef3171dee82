//! Crossmint custodial wallet client.
//!
//! Wallets are linked to Discord user ids, so a balance lookup is one GET
//! against the wallet locator. All failures surface as `WalletError` — the
//! access gate treats any error as "not eligible", never as a default grant.

use std::future::Future;

use serde::Deserialize;

/// Wallet provider failure.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// The provider call failed (network, auth, rate limit, non-2xx).
    #[error("wallet provider unavailable: {0}")]
    Provider(String),
    /// The provider answered with something we could not decode.
    #[error("malformed wallet response: {0}")]
    Malformed(String),
}

/// Source of governance-token balances, keyed by Discord user id.
///
/// Abstracted so the gate and governance logic are testable without the
/// network; the one production impl is [`CrossmintWallet`].
pub trait BalanceSource {
    /// Fetch a user's token balance in base units.
    fn balance(&self, user_id: &str) -> impl Future<Output = Result<u64, WalletError>> + Send;
}

/// One currency entry in a wallet balances response.
#[derive(Debug, Deserialize)]
struct BalanceEntry {
    currency: String,
    /// Base-unit amount, returned as a decimal string.
    amount: String,
}

/// A freshly created custodial wallet.
#[derive(Debug, Deserialize)]
pub struct CreatedWallet {
    pub address: String,
}

/// Crossmint API client.
#[derive(Clone)]
pub struct CrossmintWallet {
    api_key: String,
    base_url: String,
    currency: String,
    http: reqwest::Client,
}

impl CrossmintWallet {
    /// `environment` is the Crossmint environment subdomain ("staging" or
    /// "production"); `currency` the governance token symbol.
    pub fn new(api_key: String, environment: &str, currency: String) -> Self {
        Self {
            api_key,
            base_url: format!("https://{environment}.crossmint.com/api/v1-alpha2"),
            currency,
            http: reqwest::Client::new(),
        }
    }

    fn locator(user_id: &str) -> String {
        format!("userId:{user_id}")
    }

    /// Create a custodial wallet linked to a Discord user.
    pub async fn create_wallet(&self, user_id: &str) -> Result<CreatedWallet, WalletError> {
        let body = serde_json::json!({
            "type": "solana-custodial-wallet",
            "linkedUser": Self::locator(user_id),
        });
        let resp = self
            .http
            .post(format!("{}/wallets", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| WalletError::Provider(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(WalletError::Provider(format!("create wallet {status}: {body}")));
        }
        resp.json::<CreatedWallet>()
            .await
            .map_err(|e| WalletError::Malformed(e.to_string()))
    }

    async fn fetch_balances(&self, user_id: &str) -> Result<Vec<BalanceEntry>, WalletError> {
        let url = format!(
            "{}/wallets/{}/balances?currency={}",
            self.base_url,
            Self::locator(user_id),
            self.currency
        );
        let resp = self
            .http
            .get(url)
            .header("X-API-KEY", &self.api_key)
            .send()
            .await
            .map_err(|e| WalletError::Provider(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(WalletError::Provider(format!("get balances {status}: {body}")));
        }
        resp.json::<Vec<BalanceEntry>>()
            .await
            .map_err(|e| WalletError::Malformed(e.to_string()))
    }
}

impl BalanceSource for CrossmintWallet {
    async fn balance(&self, user_id: &str) -> Result<u64, WalletError> {
        let entries = self.fetch_balances(user_id).await?;
        pick_balance(&entries, &self.currency)
    }
}

/// Select the matching currency entry and parse its base-unit amount.
/// A wallet with no entry for the currency holds zero.
fn pick_balance(entries: &[BalanceEntry], currency: &str) -> Result<u64, WalletError> {
    let Some(entry) = entries.iter().find(|e| e.currency.eq_ignore_ascii_case(currency)) else {
        return Ok(0);
    };
    entry
        .amount
        .parse::<u64>()
        .map_err(|_| WalletError::Malformed(format!("amount {:?} is not an integer", entry.amount)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_matching_currency() {
        let entries: Vec<BalanceEntry> = serde_json::from_str(
            r#"[{"currency":"usdc","amount":"12"},{"currency":"gdt","amount":"5000"}]"#,
        )
        .unwrap();
        assert_eq!(pick_balance(&entries, "gdt").unwrap(), 5000);
        assert_eq!(pick_balance(&entries, "GDT").unwrap(), 5000);
    }

    #[test]
    fn missing_currency_is_zero() {
        let entries: Vec<BalanceEntry> =
            serde_json::from_str(r#"[{"currency":"usdc","amount":"12"}]"#).unwrap();
        assert_eq!(pick_balance(&entries, "gdt").unwrap(), 0);
        assert_eq!(pick_balance(&[], "gdt").unwrap(), 0);
    }

    #[test]
    fn fractional_amount_is_malformed() {
        let entries: Vec<BalanceEntry> =
            serde_json::from_str(r#"[{"currency":"gdt","amount":"5.5"}]"#).unwrap();
        assert!(matches!(
            pick_balance(&entries, "gdt"),
            Err(WalletError::Malformed(_))
        ));
    }
}

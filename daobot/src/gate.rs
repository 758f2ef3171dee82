//! Token-gated premium access.
//!
//! A user is premium-eligible when their governance-token balance meets the
//! configured threshold. Decisions are recomputed on every request and never
//! stored. A failed balance lookup is an error, not a denial and certainly
//! not a grant — callers decide how to phrase "try again later".

use crate::wallet::{BalanceSource, WalletError};

/// Outcome of a gate check. Ephemeral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    pub user_id: String,
    /// Balance in base units at check time.
    pub balance: u64,
    /// `balance >= threshold`, threshold inclusive.
    pub premium: bool,
}

/// Premium access gate over some balance source.
pub struct AccessGate<B> {
    source: B,
    threshold: u64,
}

impl<B: BalanceSource> AccessGate<B> {
    pub fn new(source: B, threshold: u64) -> Self {
        Self { source, threshold }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Fetch the user's balance and decide eligibility.
    pub async fn check(&self, user_id: &str) -> Result<AccessDecision, WalletError> {
        let balance = self.source.balance(user_id).await?;
        Ok(AccessDecision {
            user_id: user_id.to_string(),
            balance,
            premium: balance >= self.threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed-balance source; `None` simulates a provider outage.
    struct Fixed(Option<u64>);

    impl BalanceSource for Fixed {
        async fn balance(&self, _user_id: &str) -> Result<u64, WalletError> {
            self.0.ok_or_else(|| WalletError::Provider("down".into()))
        }
    }

    #[tokio::test]
    async fn threshold_boundary() {
        let gate = AccessGate::new(Fixed(Some(999)), 1000);
        assert!(!gate.check("u1").await.unwrap().premium);

        let gate = AccessGate::new(Fixed(Some(1000)), 1000);
        let decision = gate.check("u1").await.unwrap();
        assert!(decision.premium);
        assert_eq!(decision.balance, 1000);

        let gate = AccessGate::new(Fixed(Some(1001)), 1000);
        assert!(gate.check("u1").await.unwrap().premium);
    }

    #[tokio::test]
    async fn zero_threshold_grants_everyone() {
        let gate = AccessGate::new(Fixed(Some(0)), 0);
        assert!(gate.check("u1").await.unwrap().premium);
    }

    #[tokio::test]
    async fn provider_failure_is_an_error_not_a_grant() {
        let gate = AccessGate::new(Fixed(None), 1000);
        assert!(matches!(
            gate.check("u1").await,
            Err(WalletError::Provider(_))
        ));
    }
}

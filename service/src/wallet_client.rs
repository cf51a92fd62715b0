//! Wallet collaborator backends.
//!
//! `Memory` backs dev mode: every identity is staked once with a
//! starting balance and plays against it. `Http` forwards to the real
//! wallet service; a debit the wallet cannot confirm is treated as
//! refused so no hand is ever dealt against unconfirmed funds.

use std::collections::HashSet;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use sabot_engine::{DebitOutcome, MemoryWallet, Wallet};
use sabot_types::PlayerIdentity;

pub enum WalletClient {
    Memory(MemoryBackend),
    Http(HttpBackend),
}

impl WalletClient {
    pub fn memory(starting_balance: u64) -> Self {
        WalletClient::Memory(MemoryBackend {
            wallet: MemoryWallet::new(),
            starting_balance,
            seen: Mutex::new(HashSet::new()),
        })
    }

    pub fn http(base_url: impl Into<String>) -> Self {
        WalletClient::Http(HttpBackend {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        })
    }
}

impl Wallet for WalletClient {
    async fn debit(&self, identity: &PlayerIdentity, amount: u64) -> DebitOutcome {
        match self {
            WalletClient::Memory(backend) => backend.debit(identity, amount).await,
            WalletClient::Http(backend) => backend.debit(identity, amount).await,
        }
    }

    async fn credit(&self, identity: &PlayerIdentity, amount: u64) {
        match self {
            WalletClient::Memory(backend) => backend.wallet.credit(identity, amount).await,
            WalletClient::Http(backend) => backend.credit(identity, amount).await,
        }
    }
}

pub struct MemoryBackend {
    wallet: MemoryWallet,
    starting_balance: u64,
    seen: Mutex<HashSet<u64>>,
}

impl MemoryBackend {
    async fn debit(&self, identity: &PlayerIdentity, amount: u64) -> DebitOutcome {
        {
            let mut seen = self.seen.lock().unwrap();
            if seen.insert(identity.user_id) {
                self.wallet.grant(identity.user_id, self.starting_balance);
            }
        }
        self.wallet.debit(identity, amount).await
    }
}

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MovementRequest<'a> {
    user_id: u64,
    email: &'a str,
    amount: u64,
}

#[derive(Deserialize)]
struct MovementResponse {
    ok: bool,
}

impl HttpBackend {
    async fn debit(&self, identity: &PlayerIdentity, amount: u64) -> DebitOutcome {
        let url = format!("{}/debit", self.base_url);
        let request = MovementRequest {
            user_id: identity.user_id,
            email: &identity.email,
            amount,
        };
        let response = self.client.post(&url).json(&request).send().await;
        match response {
            Ok(response) if response.status().is_success() => {
                match response.json::<MovementResponse>().await {
                    Ok(body) if body.ok => DebitOutcome::Debited,
                    Ok(_) => DebitOutcome::InsufficientFunds,
                    Err(error) => {
                        warn!(user = identity.user_id, %error, "unreadable debit response");
                        DebitOutcome::InsufficientFunds
                    }
                }
            }
            Ok(response) => {
                if response.status().as_u16() != 402 {
                    warn!(
                        user = identity.user_id,
                        status = response.status().as_u16(),
                        "wallet refused debit"
                    );
                }
                DebitOutcome::InsufficientFunds
            }
            Err(error) => {
                // Fail closed: an unreachable wallet rejects the wager.
                warn!(user = identity.user_id, %error, "wallet unreachable for debit");
                DebitOutcome::InsufficientFunds
            }
        }
    }

    async fn credit(&self, identity: &PlayerIdentity, amount: u64) {
        let url = format!("{}/credit", self.base_url);
        let request = MovementRequest {
            user_id: identity.user_id,
            email: &identity.email,
            amount,
        };
        let response = self.client.post(&url).json(&request).send().await;
        match response {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => warn!(
                user = identity.user_id,
                amount,
                status = response.status().as_u16(),
                "wallet rejected credit"
            ),
            Err(error) => warn!(
                user = identity.user_id,
                amount,
                %error,
                "wallet unreachable for credit"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(user_id: u64) -> PlayerIdentity {
        PlayerIdentity {
            user_id,
            email: format!("user{user_id}@example.test"),
        }
    }

    #[tokio::test]
    async fn test_memory_backend_stakes_once() {
        let wallet = WalletClient::memory(500);
        assert_eq!(wallet.debit(&identity(1), 200).await, DebitOutcome::Debited);
        assert_eq!(wallet.debit(&identity(1), 200).await, DebitOutcome::Debited);
        // 100 left, the stake is not granted again.
        assert_eq!(
            wallet.debit(&identity(1), 200).await,
            DebitOutcome::InsufficientFunds
        );
        wallet.credit(&identity(1), 300).await;
        assert_eq!(wallet.debit(&identity(1), 400).await, DebitOutcome::Debited);
    }

    #[tokio::test]
    async fn test_memory_backend_isolates_players() {
        let wallet = WalletClient::memory(100);
        assert_eq!(wallet.debit(&identity(1), 100).await, DebitOutcome::Debited);
        assert_eq!(wallet.debit(&identity(2), 100).await, DebitOutcome::Debited);
        assert_eq!(
            wallet.debit(&identity(1), 1).await,
            DebitOutcome::InsufficientFunds
        );
    }
}

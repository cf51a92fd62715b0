//! Gateway service around the table engine.
//!
//! Terminates WebSocket sessions and the small REST surface, resolves
//! identities from dev tokens, and owns the registry plus the wallet
//! backend. All game semantics live in the engine crate; this crate
//! only routes verified commands to table actors and fans events back.

pub mod api;
pub mod auth;
pub mod config;
pub mod metrics;
pub mod wallet_client;

use std::sync::Arc;

use sabot_engine::Registry;

use crate::auth::Authenticator;
use crate::config::Args;
use crate::metrics::Metrics;
use crate::wallet_client::WalletClient;

pub struct Service {
    pub registry: Arc<Registry<WalletClient>>,
    pub auth: Authenticator,
    pub metrics: Metrics,
    pub origins: Vec<String>,
}

impl Service {
    pub fn from_args(args: &Args) -> Self {
        let wallet = match &args.wallet_url {
            Some(url) => {
                tracing::info!(%url, "using http wallet backend");
                WalletClient::http(url.trim_end_matches('/').to_string())
            }
            None => {
                tracing::info!(
                    starting_balance = args.starting_balance,
                    "using in-memory wallet backend"
                );
                WalletClient::memory(args.starting_balance)
            }
        };
        Self {
            registry: Arc::new(Registry::new(Arc::new(wallet), args.house_rules())),
            auth: Authenticator::new(args.auth_secret.clone()),
            metrics: Metrics::new(),
            origins: args.origins(),
        }
    }
}

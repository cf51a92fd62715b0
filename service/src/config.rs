//! Process configuration, flags first with environment fallbacks.

use std::time::Duration;

use clap::Parser;
use sabot_engine::HouseRules;

#[derive(Clone, Debug, Parser)]
#[command(name = "sabot-service", about = "Multiplayer blackjack table service")]
pub struct Args {
    /// Listen host.
    #[arg(long, env = "SABOT_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listen port.
    #[arg(long, env = "SABOT_PORT", default_value_t = 9200)]
    pub port: u16,

    /// HMAC secret for the dev token scheme.
    #[arg(long, env = "SABOT_AUTH_SECRET", default_value = "dev-secret")]
    pub auth_secret: String,

    /// Base URL of the wallet service. Unset runs the in-memory wallet.
    #[arg(long, env = "SABOT_WALLET_URL")]
    pub wallet_url: Option<String>,

    /// Starting balance granted per player by the in-memory wallet.
    #[arg(long, env = "SABOT_STARTING_BALANCE", default_value_t = 10_000)]
    pub starting_balance: u64,

    /// Comma-separated browser origins allowed by CORS; "*" allows all.
    #[arg(long, env = "SABOT_ALLOWED_ORIGINS", default_value = "*")]
    pub allowed_origins: String,

    /// Betting window in seconds.
    #[arg(long, env = "SABOT_BETTING_WINDOW_SECS", default_value_t = 15)]
    pub betting_window_secs: u64,

    /// Per-turn deadline in seconds.
    #[arg(long, env = "SABOT_TURN_WINDOW_SECS", default_value_t = 20)]
    pub turn_window_secs: u64,

    /// Payout display window in seconds.
    #[arg(long, env = "SABOT_PAYOUT_WINDOW_SECS", default_value_t = 5)]
    pub payout_window_secs: u64,

    /// Empty tables older than this are closed by the sweeper.
    #[arg(long, env = "SABOT_IDLE_TIMEOUT_SECS", default_value_t = 300)]
    pub idle_timeout_secs: u64,

    /// Idle sweep and lobby refresh interval in seconds.
    #[arg(long, env = "SABOT_SWEEP_INTERVAL_SECS", default_value_t = 10)]
    pub sweep_interval_secs: u64,

    /// Shoe size in decks.
    #[arg(long, env = "SABOT_DECKS", default_value_t = 6)]
    pub decks: u8,

    /// Dealer draws to soft 17 when set.
    #[arg(long, env = "SABOT_DEALER_HITS_SOFT_17", default_value_t = false)]
    pub dealer_hits_soft_17: bool,
}

impl Args {
    pub fn house_rules(&self) -> HouseRules {
        HouseRules {
            decks: self.decks,
            dealer_hits_soft_17: self.dealer_hits_soft_17,
            betting_window: Duration::from_secs(self.betting_window_secs),
            turn_window: Duration::from_secs(self.turn_window_secs),
            payout_window: Duration::from_secs(self.payout_window_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            ..HouseRules::default()
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect()
    }
}

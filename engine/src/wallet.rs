//! Wallet collaborator boundary.
//!
//! Debits happen inside the serialized command path and gate the bet or
//! double; credits are fire-and-forget relative to table state. The
//! engine never retries either.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use sabot_types::PlayerIdentity;

/// Result of a debit attempt. Insufficient funds is a normal business
/// outcome, not a fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited,
    InsufficientFunds,
}

pub trait Wallet: Send + Sync + 'static {
    /// Remove `amount` from the identity's balance if covered.
    fn debit(
        &self,
        identity: &PlayerIdentity,
        amount: u64,
    ) -> impl Future<Output = DebitOutcome> + Send;

    /// Best-effort credit. Failures are the implementation's problem to
    /// log; the table does not wait on confirmation.
    fn credit(&self, identity: &PlayerIdentity, amount: u64) -> impl Future<Output = ()> + Send;
}

/// In-memory wallet for tests and dev mode.
#[derive(Default)]
pub struct MemoryWallet {
    balances: Mutex<HashMap<u64, u64>>,
    credits: Mutex<Vec<(u64, u64)>>,
}

impl MemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, user_id: u64, amount: u64) {
        let mut balances = self.balances.lock().unwrap();
        *balances.entry(user_id).or_insert(0) += amount;
    }

    pub fn balance(&self, user_id: u64) -> u64 {
        *self.balances.lock().unwrap().get(&user_id).unwrap_or(&0)
    }

    /// Every credit call made, in order. Lets tests assert that busted
    /// seats never receive one.
    pub fn credit_log(&self) -> Vec<(u64, u64)> {
        self.credits.lock().unwrap().clone()
    }
}

impl Wallet for MemoryWallet {
    async fn debit(&self, identity: &PlayerIdentity, amount: u64) -> DebitOutcome {
        let mut balances = self.balances.lock().unwrap();
        let balance = balances.entry(identity.user_id).or_insert(0);
        if *balance < amount {
            return DebitOutcome::InsufficientFunds;
        }
        *balance -= amount;
        DebitOutcome::Debited
    }

    async fn credit(&self, identity: &PlayerIdentity, amount: u64) {
        let mut balances = self.balances.lock().unwrap();
        *balances.entry(identity.user_id).or_insert(0) += amount;
        drop(balances);
        self.credits.lock().unwrap().push((identity.user_id, amount));
    }
}

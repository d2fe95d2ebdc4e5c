use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::errors::ChatError;

/// External fact supplied by the transaction subsystem: does a confirmed,
/// paid transaction associate the two participants of this thread? The core
/// consumes this read-only; it may flip from false to true during a session.
pub trait TransactionOracle: Send + Sync {
    fn is_confirmed(&self, thread_id: &str) -> Result<bool, ChatError>;
}

/// The conversation's current capability mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    /// Only unsent preset questions may be submitted.
    Restricted,
    /// Free-text messaging, with advisory contact-info classification.
    Unlocked,
}

/// Computes the gate mode for a thread. Pure query over the oracle except
/// for the sticky-unlock set: once a call has observed a confirmed
/// transaction for a thread, the thread stays `Unlocked` even if the oracle
/// later reports false (a cancelled or refunded booking must not
/// retroactively hide messages that were legitimately sent). Threads not yet
/// unlocked re-read the oracle on every call.
pub struct AccessGate {
    oracle: Arc<dyn TransactionOracle>,
    unlocked: RwLock<HashSet<String>>,
}

impl AccessGate {
    pub fn new(oracle: Arc<dyn TransactionOracle>) -> Self {
        Self {
            oracle,
            unlocked: RwLock::new(HashSet::new()),
        }
    }

    pub fn mode(&self, thread_id: &str) -> Result<GateMode, ChatError> {
        if self.unlocked.read().contains(thread_id) {
            return Ok(GateMode::Unlocked);
        }
        if self.oracle.is_confirmed(thread_id)? {
            self.unlocked.write().insert(thread_id.to_string());
            tracing::info!(thread_id, "conversation unlocked");
            Ok(GateMode::Unlocked)
        } else {
            Ok(GateMode::Restricted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct ScriptedOracle {
        confirmed: Mutex<bool>,
    }

    impl ScriptedOracle {
        fn new(confirmed: bool) -> Arc<Self> {
            Arc::new(Self {
                confirmed: Mutex::new(confirmed),
            })
        }

        fn set(&self, confirmed: bool) {
            *self.confirmed.lock() = confirmed;
        }
    }

    impl TransactionOracle for ScriptedOracle {
        fn is_confirmed(&self, _thread_id: &str) -> Result<bool, ChatError> {
            Ok(*self.confirmed.lock())
        }
    }

    #[test]
    fn stable_oracle_keeps_mode() {
        let oracle = ScriptedOracle::new(false);
        let gate = AccessGate::new(oracle.clone());
        assert_eq!(gate.mode("t1").unwrap(), GateMode::Restricted);
        assert_eq!(gate.mode("t1").unwrap(), GateMode::Restricted);

        oracle.set(true);
        assert_eq!(gate.mode("t1").unwrap(), GateMode::Unlocked);
        assert_eq!(gate.mode("t1").unwrap(), GateMode::Unlocked);
    }

    #[test]
    fn unlock_is_sticky_across_oracle_flips() {
        let oracle = ScriptedOracle::new(true);
        let gate = AccessGate::new(oracle.clone());
        assert_eq!(gate.mode("t1").unwrap(), GateMode::Unlocked);

        // Booking cancelled after unlock: mode must not regress.
        oracle.set(false);
        assert_eq!(gate.mode("t1").unwrap(), GateMode::Unlocked);

        // A different thread still reads the oracle fresh.
        assert_eq!(gate.mode("t2").unwrap(), GateMode::Restricted);
    }
}

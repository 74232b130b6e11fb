//! Protocol constants and runtime configuration for **ferrochain** core.
//!
//! The [`Config`] struct centralises the tunables a deployment may reasonably
//! want to override (peer list, listen port, gossip timeouts, data
//! directory); the protocol-level constants that every node on the same
//! network must agree on (reward value, pool bounds, quorum size, maturity
//! time, proof-of-work parameters) are `pub const` items instead, since
//! letting them drift per-node would split the network. It is constructed
//! via the [`ConfigBuilder`] fluent pattern so callers customise only the
//! fields they care about.
//!
//! ```
//! use ferrochain_core::config::Config;
//!
//! let cfg = Config::default();
//! assert_eq!(cfg.listen_port, 5050);
//! ```

use crate::amount::Amount;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Coinbase/sign-up reward, in whole coins.
pub const REWARD_VALUE: u64 = 50;
/// Minimum number of transactions a block needs before it is mine-ready.
pub const TX_MIN: usize = 5;
/// Maximum number of transactions a block may hold.
pub const TX_MAX: usize = 10;
/// Number of distinct validator flags required to reach quorum.
pub const REQUIRED_FLAGS: usize = 3;
/// Minimum wall-clock gap required between two successive blocks' `mined_at`.
pub const MATURITY_TIME: Duration = Duration::from_secs(180);
/// Number of leading raw bytes a good nonce's hash must have equal to ASCII `'0'`.
pub const LEADING_ZEROES: usize = 2;
/// Initial acceptance-window ceiling for the raw byte following the leading zeroes.
pub const INITIAL_DIFFICULTY_BUMP: u8 = 16;
/// Amount `difficulty_bump` widens by every `DIFFICULTY_WIDEN_INTERVAL`.
pub const NEXT_CHAR_LIMIT_STEP: u8 = 16;
/// How often the mining loop widens its acceptance window.
pub const DIFFICULTY_WIDEN_INTERVAL: Duration = Duration::from_secs(2);

pub fn reward_value() -> Amount {
    Amount::from_whole(REWARD_VALUE)
}

/// Deployment-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Directory holding `accounts.dat`, `ledger.dat`, `pool.dat`, `manifest.dat`.
    pub data_dir: String,

    /// TCP port the gossip listener binds.
    pub listen_port: u16,

    /// Configured peer hostnames (resolved to IPv4 at send time).
    pub peers: Vec<String>,

    /// Per-send broadcast timeout, in seconds. Must stay within 30-90s.
    pub send_timeout_secs: u64,

    /// Bounded wait for listeners to come up before startup sync begins.
    pub startup_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "data".into(),
            listen_port: 5050,
            peers: Vec::new(),
            send_timeout_secs: 45,
            startup_grace_secs: 10,
        }
    }
}

impl Config {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.startup_grace_secs)
    }
}

/// Fluent builder for [`Config`].
pub struct ConfigBuilder {
    inner: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Starts a new builder pre-populated with [`Config::default`].
    pub fn new() -> Self {
        Self {
            inner: Config::default(),
        }
    }

    pub fn data_dir<S: Into<String>>(mut self, dir: S) -> Self {
        self.inner.data_dir = dir.into();
        self
    }

    pub fn listen_port(mut self, port: u16) -> Self {
        self.inner.listen_port = port;
        self
    }

    pub fn peers(mut self, peers: Vec<String>) -> Self {
        self.inner.peers = peers;
        self
    }

    pub fn send_timeout_secs(mut self, secs: u64) -> Self {
        self.inner.send_timeout_secs = secs;
        self
    }

    /// Consumes the builder returning an immutable configuration value.
    pub fn finish(self) -> Config {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_fields() {
        let cfg = ConfigBuilder::new()
            .listen_port(6000)
            .peers(vec!["peer-a".into()])
            .send_timeout_secs(60)
            .finish();
        assert_eq!(cfg.listen_port, 6000);
        assert_eq!(cfg.peers, vec!["peer-a".to_string()]);
        assert_eq!(cfg.send_timeout_secs, 60);
    }

    #[test]
    fn reward_value_is_fifty_whole_coins() {
        assert_eq!(reward_value(), Amount::from_whole(50));
    }
}

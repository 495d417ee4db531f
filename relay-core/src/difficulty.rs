// Difficulty policy engine
use crate::{
    mode::DifficultyMode,
    state::{clamp_difficulty, RuntimeState},
    Result,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// `aggressive` raises difficulty once more than this many miners are connected
pub const AGGRESSIVE_MINER_THRESHOLD: u64 = 5;
pub const AGGRESSIVE_STEP_UP: u64 = 10;
pub const AGGRESSIVE_STEP_DOWN: u64 = 1;

/// Network hashrate (H/s) above which `aggressive_pool` doubles the network
/// difficulty instead of halving it
pub const POOL_HASHRATE_THRESHOLD: f64 = 1e12;

/// Network statistics consumed by the `aggressive_pool` policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkStats {
    pub difficulty: f64,
    pub hashrate: f64,
}

/// Provider of network statistics, normally the node RPC client
#[async_trait]
pub trait NetworkStatsSource: Send + Sync {
    async fn fetch_network_stats(&self) -> Result<NetworkStats>;
}

/// Compute the next difficulty for `mode`.
///
/// `stats` is only consulted in `aggressive_pool`; without stats that mode
/// keeps the current difficulty. The result is always at least 1.
pub fn next_difficulty(
    mode: DifficultyMode,
    current: u64,
    miners_connected: u64,
    stats: Option<&NetworkStats>,
) -> u64 {
    let next = match mode {
        DifficultyMode::Low
        | DifficultyMode::Normal
        | DifficultyMode::Medium
        | DifficultyMode::High => mode.fixed_difficulty().unwrap_or(current),
        DifficultyMode::Aggressive => {
            if miners_connected > AGGRESSIVE_MINER_THRESHOLD {
                current.saturating_add(AGGRESSIVE_STEP_UP)
            } else {
                current.saturating_sub(AGGRESSIVE_STEP_DOWN)
            }
        }
        DifficultyMode::AggressivePool => match stats {
            Some(stats) => pool_difficulty(stats),
            None => current,
        },
    };
    clamp_difficulty(next)
}

/// Difficulty derived from network statistics
pub fn pool_difficulty(stats: &NetworkStats) -> u64 {
    let target = if stats.hashrate > POOL_HASHRATE_THRESHOLD {
        stats.difficulty * 2.0
    } else {
        stats.difficulty / 2.0
    };
    // Float to int casts saturate and map NaN to 0; the clamp covers the rest.
    clamp_difficulty(target as u64)
}

/// Applies the active difficulty policy to the shared state
pub struct DifficultyPolicy {
    stats_source: Arc<dyn NetworkStatsSource>,
}

impl DifficultyPolicy {
    pub fn new(stats_source: Arc<dyn NetworkStatsSource>) -> Self {
        Self { stats_source }
    }

    /// Evaluate the current mode and store the result.
    ///
    /// Network stats are fetched before taking the difficulty lock so a slow
    /// node never blocks other handlers. A failed fetch is logged and leaves
    /// the difficulty where it was.
    pub async fn adjust(&self, state: &RuntimeState) -> u64 {
        let stats = if state.difficulty_mode().await == DifficultyMode::AggressivePool {
            match self.stats_source.fetch_network_stats().await {
                Ok(stats) => {
                    debug!(
                        "Network difficulty {} at {} H/s",
                        stats.difficulty, stats.hashrate
                    );
                    Some(stats)
                }
                Err(e) => {
                    warn!("Error adjusting pool difficulty: {}", e);
                    None
                }
            }
        } else {
            None
        };

        state
            .update_difficulty(|mode, current, miners| {
                next_difficulty(mode, current, miners, stats.as_ref())
            })
            .await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stats source returning a fixed answer and counting calls
    pub struct StubStatsSource {
        stats: Option<NetworkStats>,
        pub calls: AtomicUsize,
    }

    impl StubStatsSource {
        pub fn ok(difficulty: f64, hashrate: f64) -> Self {
            Self {
                stats: Some(NetworkStats { difficulty, hashrate }),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing() -> Self {
            Self {
                stats: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl NetworkStatsSource for StubStatsSource {
        async fn fetch_network_stats(&self) -> Result<NetworkStats> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.stats
                .ok_or_else(|| Error::BitcoinRpc("connection refused".to_string()))
        }
    }
}

// Shared runtime state for the relay
use crate::{
    config::RelayConfig,
    mode::DifficultyMode,
    types::{PoolInfo, RelayStatus, ShareOutcome, TcpInfo, WorkSubmission},
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{Mutex, RwLock};

/// Difficulty never drops below this value
pub const MIN_DIFFICULTY: u64 = 1;

pub fn clamp_difficulty(difficulty: u64) -> u64 {
    difficulty.max(MIN_DIFFICULTY)
}

/// Live pool endpoint and listener settings
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointSettings {
    pub host: String,
    pub listen_port: u16,
    pub pool_url: String,
    pub pool_port: u16,
    pub pool_user: String,
    pub pool_password: String,
}

impl EndpointSettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            host: config.network.host.clone(),
            listen_port: config.network.port,
            pool_url: config.pool.url.clone(),
            pool_port: config.pool.port,
            pool_user: config.pool.username.clone(),
            pool_password: config.pool.password.clone(),
        }
    }

    pub fn pool_info(&self) -> PoolInfo {
        PoolInfo {
            url: self.pool_url.clone(),
            port: self.pool_port,
            user: self.pool_user.clone(),
            password: self.pool_password.clone(),
        }
    }

    pub fn tcp_info(&self) -> TcpInfo {
        TcpInfo {
            listen: self.host.clone(),
            port: self.listen_port,
        }
    }
}

#[derive(Debug)]
struct DifficultyState {
    mode: DifficultyMode,
    current: u64,
}

/// Counters and settings shared by connection handlers, the periodic
/// adjuster and the control panel.
///
/// Share counters commute, so they are plain atomics. The difficulty and the
/// mode it derives from sit behind one mutex so a read-modify-write from a
/// handler can't interleave with an adjuster tick.
#[derive(Debug)]
pub struct RuntimeState {
    miners_connected: AtomicU64,
    best_share: AtomicU64,
    total_shares: AtomicU64,
    rejected_shares: AtomicU64,
    difficulty: Mutex<DifficultyState>,
    endpoint: RwLock<EndpointSettings>,
}

impl RuntimeState {
    pub fn new(endpoint: EndpointSettings, mode: DifficultyMode, initial_difficulty: u64) -> Self {
        Self {
            miners_connected: AtomicU64::new(0),
            best_share: AtomicU64::new(0),
            total_shares: AtomicU64::new(0),
            rejected_shares: AtomicU64::new(0),
            difficulty: Mutex::new(DifficultyState {
                mode,
                current: clamp_difficulty(initial_difficulty),
            }),
            endpoint: RwLock::new(endpoint),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            EndpointSettings::from_config(config),
            config.difficulty.initial_mode,
            config.difficulty.initial_difficulty,
        )
    }

    /// Register a connected miner. The count drops again when the guard does.
    pub fn connect_miner(self: &Arc<Self>) -> MinerGuard {
        self.miners_connected.fetch_add(1, Ordering::SeqCst);
        MinerGuard {
            state: Arc::clone(self),
        }
    }

    pub fn miners_connected(&self) -> u64 {
        self.miners_connected.load(Ordering::SeqCst)
    }

    pub fn best_share(&self) -> u64 {
        self.best_share.load(Ordering::SeqCst)
    }

    pub fn total_shares(&self) -> u64 {
        self.total_shares.load(Ordering::SeqCst)
    }

    pub fn rejected_shares(&self) -> u64 {
        self.rejected_shares.load(Ordering::SeqCst)
    }

    /// Count one classified submission.
    ///
    /// The total is bumped before the rejected count so that
    /// `rejected_shares <= total_shares` holds for any concurrent reader.
    pub fn record_share(&self, work: WorkSubmission, outcome: ShareOutcome) {
        self.total_shares.fetch_add(1, Ordering::SeqCst);
        if outcome.is_accepted() {
            self.best_share.fetch_max(work.value, Ordering::SeqCst);
        } else {
            self.rejected_shares.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub async fn current_difficulty(&self) -> u64 {
        self.difficulty.lock().await.current
    }

    pub async fn difficulty_mode(&self) -> DifficultyMode {
        self.difficulty.lock().await.mode
    }

    pub async fn set_difficulty_mode(&self, mode: DifficultyMode) {
        self.difficulty.lock().await.mode = mode;
    }

    pub async fn set_difficulty(&self, difficulty: u64) -> u64 {
        let mut guard = self.difficulty.lock().await;
        guard.current = clamp_difficulty(difficulty);
        guard.current
    }

    /// Recompute the difficulty under the lock.
    ///
    /// `next` receives the mode, the current difficulty and the connected
    /// miner count, all observed while the lock is held. The result is
    /// clamped before it is stored and returned.
    pub async fn update_difficulty<F>(&self, next: F) -> u64
    where
        F: FnOnce(DifficultyMode, u64, u64) -> u64,
    {
        let mut guard = self.difficulty.lock().await;
        let miners = self.miners_connected();
        guard.current = clamp_difficulty(next(guard.mode, guard.current, miners));
        guard.current
    }

    pub async fn increment_difficulty(&self, step: u64) -> u64 {
        self.update_difficulty(|_, current, _| current.saturating_add(step)).await
    }

    pub async fn endpoint(&self) -> EndpointSettings {
        self.endpoint.read().await.clone()
    }

    pub async fn update_pool_endpoint(&self, pool_url: String, pool_port: u16) {
        let mut endpoint = self.endpoint.write().await;
        endpoint.pool_url = pool_url;
        endpoint.pool_port = pool_port;
    }

    pub async fn set_listen_port(&self, port: u16) {
        self.endpoint.write().await.listen_port = port;
    }

    /// Best-effort snapshot for display
    pub async fn snapshot(&self) -> RelayStatus {
        let (difficulty_mode, current_difficulty) = {
            let guard = self.difficulty.lock().await;
            (guard.mode, guard.current)
        };
        let endpoint = self.endpoint().await;

        RelayStatus {
            miners_connected: self.miners_connected(),
            best_share: self.best_share(),
            total_shares: self.total_shares(),
            rejected_shares: self.rejected_shares(),
            current_difficulty,
            difficulty_mode,
            pool_url: endpoint.pool_url,
            pool_port: endpoint.pool_port,
            listen_host: endpoint.host,
            listen_port: endpoint.listen_port,
        }
    }
}

/// Keeps a miner counted as connected for as long as it lives
#[derive(Debug)]
pub struct MinerGuard {
    state: Arc<RuntimeState>,
}

impl Drop for MinerGuard {
    fn drop(&mut self) {
        self.state.miners_connected.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> Arc<RuntimeState> {
        Arc::new(RuntimeState::from_config(&RelayConfig::default()))
    }

    #[tokio::test]
    async fn test_defaults() {
        let state = test_state();
        assert_eq!(state.difficulty_mode().await, DifficultyMode::Normal);
        assert_eq!(state.current_difficulty().await, 16);
        assert_eq!(state.miners_connected(), 0);
        assert_eq!(state.total_shares(), 0);
    }

    #[tokio::test]
    async fn test_miner_guard_releases_on_drop() {
        let state = test_state();
        let first = state.connect_miner();
        let second = state.connect_miner();
        assert_eq!(state.miners_connected(), 2);
        drop(first);
        assert_eq!(state.miners_connected(), 1);
        drop(second);
        assert_eq!(state.miners_connected(), 0);
    }

    #[tokio::test]
    async fn test_best_share_is_monotonic() {
        let state = test_state();
        for value in [17, 3, 9999, 42] {
            state.record_share(WorkSubmission::new(value), ShareOutcome::Accepted);
            assert!(state.best_share() >= value);
        }
        assert_eq!(state.best_share(), 9999);
    }

    #[tokio::test]
    async fn test_rejected_shares_do_not_touch_best_share() {
        let state = test_state();
        state.record_share(WorkSubmission::new(9990), ShareOutcome::Stale);
        state.record_share(WorkSubmission::new(9995), ShareOutcome::Rejected);
        assert_eq!(state.best_share(), 0);
        assert_eq!(state.total_shares(), 2);
        assert_eq!(state.rejected_shares(), 2);
    }

    #[tokio::test]
    async fn test_difficulty_writes_are_clamped() {
        let state = test_state();
        assert_eq!(state.set_difficulty(0).await, 1);
        assert_eq!(state.update_difficulty(|_, _, _| 0).await, 1);
        assert_eq!(state.current_difficulty().await, 1);
    }

    #[tokio::test]
    async fn test_update_difficulty_sees_miner_count() {
        let state = test_state();
        let _a = state.connect_miner();
        let _b = state.connect_miner();
        let seen = state.update_difficulty(|_, current, miners| current + miners).await;
        assert_eq!(seen, 18);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let state = test_state();
        let mut handles = Vec::new();
        for i in 0..64u64 {
            let state = Arc::clone(&state);
            handles.push(tokio::spawn(async move {
                let _guard = state.connect_miner();
                state.record_share(WorkSubmission::new(i + 1), ShareOutcome::Accepted);
                state.increment_difficulty(1).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(state.total_shares(), 64);
        assert_eq!(state.best_share(), 64);
        assert_eq!(state.current_difficulty().await, 16 + 64);
        assert_eq!(state.miners_connected(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_reflects_endpoint_updates() {
        let state = test_state();
        state.update_pool_endpoint("stratum+tcp://other.example".to_string(), 3333).await;
        state.set_listen_port(7000).await;
        state.set_difficulty_mode(DifficultyMode::High).await;

        let status = state.snapshot().await;
        assert_eq!(status.pool_url, "stratum+tcp://other.example");
        assert_eq!(status.pool_port, 3333);
        assert_eq!(status.listen_port, 7000);
        assert_eq!(status.difficulty_mode, DifficultyMode::High);
    }
}

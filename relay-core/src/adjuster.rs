// Background difficulty ratchet
use crate::state::RuntimeState;
use std::sync::Arc;
use tokio::{
    task::JoinHandle,
    time::{interval_at, Duration, Instant, MissedTickBehavior},
};
use tracing::info;

/// Raise the difficulty by one every `period`, forever.
///
/// The first increase happens one full period after the call.
pub async fn run_difficulty_adjuster(state: Arc<RuntimeState>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let difficulty = state.increment_difficulty(1).await;
        info!("Auto-increased difficulty to {}", difficulty);
    }
}

pub fn spawn_difficulty_adjuster(state: Arc<RuntimeState>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(run_difficulty_adjuster(state, period))
}

pub mod config;
pub mod error;
pub mod types;
pub mod mode;
pub mod state;
pub mod share_validator;
pub mod difficulty;
pub mod bitcoin_rpc;
pub mod connection;
pub mod server;
pub mod adjuster;
pub mod control;
pub mod api_server;
pub mod logging;


pub use error::{Error, Result};
pub use config::RelayConfig;
pub use mode::DifficultyMode;
pub use state::RuntimeState;
pub use types::{RelayResponse, RelayStatus, ShareOutcome, WorkSubmission};
pub use control::{PoolSettingsUpdate, RelayController};

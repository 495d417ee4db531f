// Runtime control surface used by the operator panel
use crate::{
    error::{Error, Result},
    mode::DifficultyMode,
    server::ServerHandle,
    state::RuntimeState,
    types::RelayStatus,
};
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};

/// Validated pool endpoint change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettingsUpdate {
    pub pool_url: String,
    pub pool_port: u16,
    pub listen_port: u16,
}

impl PoolSettingsUpdate {
    /// Build an update from raw form fields. All three must be present and
    /// the ports must parse as non-zero port numbers.
    pub fn from_fields(
        pool_url: Option<&str>,
        pool_port: Option<&str>,
        listen_port: Option<&str>,
    ) -> Result<Self> {
        let pool_url = pool_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::Config("pool_url is required".to_string()))?;

        Ok(Self {
            pool_url: pool_url.to_string(),
            pool_port: parse_port("pool_port", pool_port)?,
            listen_port: parse_port("listen_port", listen_port)?,
        })
    }
}

fn parse_port(field: &str, value: Option<&str>) -> Result<u16> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Config(format!("{} is required", field)))?;
    match value.parse::<u16>() {
        Ok(0) => Err(Error::Config(format!("{} must be greater than 0", field))),
        Ok(port) => Ok(port),
        Err(e) => Err(Error::Config(format!("Invalid {} '{}': {}", field, value, e))),
    }
}

/// Mutation and status API over the running relay
#[derive(Clone)]
pub struct RelayController {
    state: Arc<RuntimeState>,
    server: ServerHandle,
}

impl RelayController {
    pub fn new(state: Arc<RuntimeState>, server: ServerHandle) -> Self {
        Self { state, server }
    }

    /// Switch the difficulty policy. Unknown names are ignored and reported
    /// as `false`.
    pub async fn set_difficulty_mode(&self, mode: &str) -> bool {
        match mode.parse::<DifficultyMode>() {
            Ok(mode) => {
                self.state.set_difficulty_mode(mode).await;
                info!("Difficulty mode set to {}", mode);
                true
            }
            Err(e) => {
                warn!("Ignoring difficulty mode change: {}", e);
                false
            }
        }
    }

    /// Point miners at a new pool and move the relay listener.
    ///
    /// Returns the address the listener ended up on, which is later than
    /// `listen_port` when that port was taken.
    pub async fn update_pool_settings(&self, update: PoolSettingsUpdate) -> Result<SocketAddr> {
        info!(
            "Updating pool settings: {}:{} (listen port {})",
            update.pool_url, update.pool_port, update.listen_port
        );
        self.state
            .update_pool_endpoint(update.pool_url, update.pool_port)
            .await;
        self.server.rebind(update.listen_port).await
    }

    pub async fn status(&self) -> RelayStatus {
        self.state.snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_requires_every_field() {
        assert!(PoolSettingsUpdate::from_fields(None, Some("3333"), Some("6662")).is_err());
        assert!(PoolSettingsUpdate::from_fields(Some("stratum+tcp://p"), None, Some("6662")).is_err());
        assert!(PoolSettingsUpdate::from_fields(Some("stratum+tcp://p"), Some("3333"), None).is_err());
        assert!(PoolSettingsUpdate::from_fields(Some(""), Some("3333"), Some("6662")).is_err());
    }

    #[test]
    fn test_update_rejects_bad_ports() {
        assert!(PoolSettingsUpdate::from_fields(Some("p"), Some("abc"), Some("6662")).is_err());
        assert!(PoolSettingsUpdate::from_fields(Some("p"), Some("3333"), Some("70000")).is_err());
        assert!(PoolSettingsUpdate::from_fields(Some("p"), Some("0"), Some("6662")).is_err());
    }

    #[test]
    fn test_update_parses_valid_fields() {
        let update =
            PoolSettingsUpdate::from_fields(Some(" stratum+tcp://p.example "), Some("3333"), Some("6662"))
                .unwrap();
        assert_eq!(
            update,
            PoolSettingsUpdate {
                pool_url: "stratum+tcp://p.example".to_string(),
                pool_port: 3333,
                listen_port: 6662,
            }
        );
    }
}

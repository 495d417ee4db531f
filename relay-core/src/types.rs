use crate::mode::DifficultyMode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type alias for connection IDs
pub type ConnectionId = Uuid;

/// One unit of submitted work, valid for a single connection exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkSubmission {
    pub value: u64,
}

impl WorkSubmission {
    pub fn new(value: u64) -> Self {
        Self { value }
    }
}

/// Classification of a work submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShareOutcome {
    Accepted,
    Stale,
    Rejected,
}

impl ShareOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ShareOutcome::Accepted)
    }

    /// Message carried in the error response, `None` for accepted shares
    pub fn error_message(&self) -> Option<&'static str> {
        match self {
            ShareOutcome::Accepted => None,
            ShareOutcome::Stale => Some("Stale share"),
            ShareOutcome::Rejected => Some("Rejected share"),
        }
    }
}

/// Upstream pool section of a success response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolInfo {
    pub url: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

/// Listener section of a success response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcpInfo {
    pub listen: String,
    pub port: u16,
}

/// Target section of a success response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetInfo {
    pub difficulty: u64,
    pub versionmask: String,
}

/// Response sent for an accepted share
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub autononce: bool,
    pub autoversionmask: bool,
    pub autodifficulty: bool,
    pub pool: PoolInfo,
    pub tcp: TcpInfo,
    pub target: TargetInfo,
}

/// Response sent for a stale or rejected share
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub result: Option<serde_json::Value>,
    pub error: String,
    pub id: Option<serde_json::Value>,
}

/// The single JSON object written back on a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayResponse {
    Success(SuccessResponse),
    Error(ErrorResponse),
}

impl RelayResponse {
    pub fn success(pool: PoolInfo, tcp: TcpInfo) -> Self {
        RelayResponse::Success(SuccessResponse {
            autononce: true,
            autoversionmask: true,
            autodifficulty: true,
            pool,
            tcp,
            target: TargetInfo {
                difficulty: 0,
                versionmask: "auto".to_string(),
            },
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        RelayResponse::Error(ErrorResponse {
            result: None,
            error: message.into(),
            id: None,
        })
    }

    /// Stamp the target difficulty. Error responses carry no target.
    pub fn set_difficulty(&mut self, difficulty: u64) {
        if let RelayResponse::Success(success) = self {
            success.target.difficulty = difficulty;
        }
    }

    pub fn to_line(&self) -> crate::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Point-in-time view of the relay, served to the control panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayStatus {
    pub miners_connected: u64,
    pub best_share: u64,
    pub total_shares: u64,
    pub rejected_shares: u64,
    pub current_difficulty: u64,
    pub difficulty_mode: DifficultyMode,
    pub pool_url: String,
    pub pool_port: u16,
    pub listen_host: String,
    pub listen_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_success() -> RelayResponse {
        RelayResponse::success(
            PoolInfo {
                url: "stratum+tcp://examplepool.com".to_string(),
                port: 6661,
                user: "user".to_string(),
                password: "password".to_string(),
            },
            TcpInfo {
                listen: "0.0.0.0".to_string(),
                port: 6661,
            },
        )
    }

    #[test]
    fn test_success_response_shape() {
        let mut response = sample_success();
        response.set_difficulty(256);

        let json: serde_json::Value = serde_json::to_value(&response).unwrap();
        assert_eq!(json["autononce"], true);
        assert_eq!(json["autoversionmask"], true);
        assert_eq!(json["autodifficulty"], true);
        assert_eq!(json["pool"]["url"], "stratum+tcp://examplepool.com");
        assert_eq!(json["pool"]["port"], 6661);
        assert_eq!(json["tcp"]["listen"], "0.0.0.0");
        assert_eq!(json["target"]["difficulty"], 256);
        assert_eq!(json["target"]["versionmask"], "auto");
    }

    #[test]
    fn test_error_response_shape() {
        let mut response = RelayResponse::error("Stale share");
        response.set_difficulty(99);

        let json: serde_json::Value = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({"result": null, "error": "Stale share", "id": null}));
    }

    #[test]
    fn test_response_line_is_newline_terminated() {
        let line = RelayResponse::error("Rejected share").to_line().unwrap();
        assert!(line.ends_with('\n'));
        let parsed: RelayResponse = serde_json::from_str(line.trim_end()).unwrap();
        assert!(matches!(parsed, RelayResponse::Error(_)));
    }

    #[test]
    fn test_outcome_messages() {
        assert_eq!(ShareOutcome::Accepted.error_message(), None);
        assert_eq!(ShareOutcome::Stale.error_message(), Some("Stale share"));
        assert_eq!(ShareOutcome::Rejected.error_message(), Some("Rejected share"));
    }
}

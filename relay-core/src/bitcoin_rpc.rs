use crate::config::RpcConfig;
use crate::difficulty::{NetworkStats, NetworkStatsSource};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use uuid::Uuid;

/// Bitcoin RPC client for interacting with Bitcoin Core
#[derive(Debug, Clone)]
pub struct BitcoinRpcClient {
    config: RpcConfig,
    client: reqwest::Client,
}

/// Bitcoin RPC request structure
#[derive(Debug, Serialize)]
struct RpcRequest {
    jsonrpc: String,
    id: String,
    method: String,
    params: serde_json::Value,
}

/// Bitcoin RPC response structure
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// Bitcoin RPC error structure
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i32,
    message: String,
}

/// Mining info response from getmininginfo
#[derive(Debug, Clone, Deserialize)]
pub struct MiningInfoResponse {
    pub difficulty: f64,
    pub networkhashps: f64,
}

impl BitcoinRpcClient {
    /// Create a new Bitcoin RPC client
    pub fn new(config: RpcConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::BitcoinRpc(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Get mining information (difficulty and network hashrate)
    pub async fn get_mining_info(&self) -> Result<MiningInfoResponse> {
        self.call_rpc("getmininginfo", serde_json::Value::Array(vec![])).await
    }

    async fn call_rpc<T>(&self, method: &str, params: serde_json::Value) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let request = RpcRequest {
            jsonrpc: "1.0".to_string(),
            id: Uuid::new_v4().to_string(),
            method: method.to_string(),
            params,
        };

        let response = timeout(
            self.config.timeout(),
            self.client
                .post(self.config.url())
                .basic_auth(&self.config.user, Some(&self.config.password))
                .json(&request)
                .send(),
        )
        .await
        .map_err(|_| Error::BitcoinRpc("RPC request timeout".to_string()))?
        .map_err(|e| Error::BitcoinRpc(format!("HTTP request failed: {}", e)))?;

        // bitcoind answers RPC-level errors with HTTP 500 and a JSON body, so
        // only bail on the status when the body is not a JSON-RPC envelope.
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::BitcoinRpc(format!("Failed to read response body: {}", e)))?;

        let rpc_response: RpcResponse<T> = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(Error::BitcoinRpc(format!("HTTP error {}: {}", status, body)));
            }
            Err(e) => {
                return Err(Error::BitcoinRpc(format!("Failed to parse JSON response: {}", e)));
            }
        };

        if let Some(error) = rpc_response.error {
            return Err(Error::BitcoinRpc(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }

        rpc_response
            .result
            .ok_or_else(|| Error::BitcoinRpc("RPC response missing result".to_string()))
    }
}

#[async_trait]
impl NetworkStatsSource for BitcoinRpcClient {
    async fn fetch_network_stats(&self) -> Result<NetworkStats> {
        let info = self.get_mining_info().await?;
        Ok(NetworkStats {
            difficulty: info.difficulty,
            hashrate: info.networkhashps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use std::net::SocketAddr;

    async fn spawn_fake_node(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn config_for(addr: SocketAddr) -> RpcConfig {
        RpcConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            user: "rpcuser".to_string(),
            password: "rpcpassword".to_string(),
            timeout_secs: 2,
        }
    }

    #[tokio::test]
    async fn test_fetch_network_stats() {
        let router = Router::new().route(
            "/",
            post(|headers: HeaderMap, Json(request): Json<serde_json::Value>| async move {
                assert!(headers.contains_key("authorization"));
                assert_eq!(request["method"], "getmininginfo");
                Json(serde_json::json!({
                    "result": {
                        "blocks": 840000,
                        "difficulty": 86388558925171.02,
                        "networkhashps": 6.1e20,
                        "chain": "main"
                    },
                    "error": null,
                    "id": request["id"]
                }))
            }),
        );
        let addr = spawn_fake_node(router).await;

        let client = BitcoinRpcClient::new(config_for(addr)).unwrap();
        let stats = client.fetch_network_stats().await.unwrap();
        assert_eq!(stats.difficulty, 86388558925171.02);
        assert_eq!(stats.hashrate, 6.1e20);
    }

    #[tokio::test]
    async fn test_rpc_error_is_reported() {
        let router = Router::new().route(
            "/",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({
                        "result": null,
                        "error": {"code": -28, "message": "Loading block index..."},
                        "id": "1"
                    })),
                )
            }),
        );
        let addr = spawn_fake_node(router).await;

        let client = BitcoinRpcClient::new(config_for(addr)).unwrap();
        let err = client.fetch_network_stats().await.unwrap_err();
        assert!(err.to_string().contains("Loading block index"));
        assert_eq!(err.category(), "bitcoin_rpc");
    }

    #[tokio::test]
    async fn test_unreachable_node_fails() {
        // Grab a free port and release it so nothing is listening there.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = BitcoinRpcClient::new(config_for(addr)).unwrap();
        assert!(client.fetch_network_stats().await.is_err());
    }
}

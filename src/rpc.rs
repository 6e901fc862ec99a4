//! bitcoind JSON-RPC gateway

use crate::error::{Result, PegError};
use crate::config::RpcConfig;
use crate::gateway::{BlockInfo, ChainGateway, RawTransactionInfo};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

// JSON-RPC request/response types
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

/// Blocking JSON-RPC client against a bitcoind node
pub struct RpcGateway {
    client: reqwest::blocking::Client,
    url: String,
    user: Option<String>,
    password: Option<String>,
    next_id: u64,
}

impl RpcGateway {
    pub fn new(config: &RpcConfig) -> Result<Self> {
        info!("Initializing bitcoind gateway with RPC: {}", config.url);

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PegError::Gateway(format!("Failed to create HTTP client: {}", e)))?;

        Ok(RpcGateway {
            client,
            url: config.url.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            next_id: 1,
        })
    }

    fn call<T: DeserializeOwned>(&mut self, method: &str, params: Value) -> Result<T> {
        let request = JsonRpcRequest {
            jsonrpc: "1.0",
            id: self.next_id,
            method,
            params,
        };
        self.next_id += 1;
        debug!(method, id = request.id, "rpc call");

        let mut request_builder = self.client.post(&self.url);
        if let Some(user) = &self.user {
            request_builder = request_builder.basic_auth(user, self.password.as_ref());
        }

        // bitcoind reports RPC errors with a non-2xx status and a JSON body
        let response = request_builder
            .json(&request)
            .send()
            .map_err(|e| PegError::Gateway(format!("RPC request failed: {}", e)))?;
        let status = response.status();

        let rpc_response: JsonRpcResponse<T> = response
            .json()
            .map_err(|e| PegError::Gateway(format!("Failed to parse RPC response ({}): {}", status, e)))?;

        decode_response(rpc_response)
    }
}

fn decode_response<T>(response: JsonRpcResponse<T>) -> Result<T> {
    if let Some(error) = response.error {
        return Err(PegError::Gateway(format!(
            "RPC error {}: {}",
            error.code, error.message
        )));
    }
    response
        .result
        .ok_or_else(|| PegError::Gateway("Empty RPC response".to_string()))
}

impl ChainGateway for RpcGateway {
    fn submit_raw(&mut self, tx_hex: &str) -> Result<String> {
        self.call("sendrawtransaction", json!([tx_hex]))
    }

    fn fetch_tx(&mut self, txid: &str) -> Result<RawTransactionInfo> {
        self.call("getrawtransaction", json!([txid, true]))
    }

    fn fetch_block(&mut self, hash: &str) -> Result<BlockInfo> {
        self.call("getblock", json!([hash]))
    }

    fn mine_to(&mut self, address: &str, count: u32) -> Result<Vec<String>> {
        self.call("generatetoaddress", json!([count, address]))
    }
}

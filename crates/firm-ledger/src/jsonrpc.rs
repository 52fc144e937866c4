//! Ethereum JSON-RPC ledger client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::debug;

use firm_types::{decode_hex, encode_hex, Address, Bytes32, Log, TransactionReceipt};

use crate::error::{LedgerError, LedgerResult};
use crate::traits::{LedgerClient, LogFilter, TransactionRequest};

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    topics: Vec<Bytes32>,
    data: String,
    block_number: Option<String>,
    log_index: Option<String>,
    transaction_hash: Option<Bytes32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: Bytes32,
    status: Option<String>,
    block_number: Option<String>,
    from: Option<Address>,
    to: Option<Address>,
    contract_address: Option<Address>,
    gas_used: Option<String>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

/// Parse a `0x`-prefixed hex quantity.
fn quantity(s: &str) -> LedgerResult<u64> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| LedgerError::InvalidResponse(format!("quantity without 0x: {s}")))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| LedgerError::InvalidResponse(format!("bad quantity {s}: {e}")))
}

fn opt_quantity(s: Option<&str>) -> LedgerResult<Option<u64>> {
    s.map(quantity).transpose()
}

impl TryFrom<RpcLog> for Log {
    type Error = LedgerError;

    fn try_from(log: RpcLog) -> LedgerResult<Self> {
        Ok(Log {
            address: log.address,
            topics: log.topics,
            data: decode_hex(&log.data)?,
            block_number: opt_quantity(log.block_number.as_deref())?,
            log_index: opt_quantity(log.log_index.as_deref())?,
            transaction_hash: log.transaction_hash,
        })
    }
}

impl TryFrom<RpcReceipt> for TransactionReceipt {
    type Error = LedgerError;

    fn try_from(r: RpcReceipt) -> LedgerResult<Self> {
        Ok(TransactionReceipt {
            transaction_hash: r.transaction_hash,
            status: opt_quantity(r.status.as_deref())?.unwrap_or(0),
            block_number: opt_quantity(r.block_number.as_deref())?,
            from: r.from,
            to: r.to,
            contract_address: r.contract_address,
            gas_used: opt_quantity(r.gas_used.as_deref())?.unwrap_or(0),
            logs: r
                .logs
                .into_iter()
                .map(Log::try_from)
                .collect::<LedgerResult<_>>()?,
        })
    }
}

/// Ledger client speaking Ethereum JSON-RPC over HTTP.
///
/// Transactions are signed by the node (`eth_sendTransaction`). Without a
/// configured sender the node's first account is used.
pub struct JsonRpcLedger {
    http: reqwest::Client,
    rpc_url: String,
    request_id: AtomicU64,
    from: OnceCell<Address>,
}

impl JsonRpcLedger {
    pub fn new(rpc_url: impl Into<String>, from: Option<Address>) -> LedgerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            rpc_url: rpc_url.into(),
            request_id: AtomicU64::new(1),
            from: OnceCell::new_with(from),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> LedgerResult<R> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        debug!(method, id, "json-rpc call");
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };
        let response: JsonRpcResponse = self
            .http
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?
            .json()
            .await?;
        if let Some(error) = response.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        serde_json::from_value(response.result.unwrap_or(Value::Null))
            .map_err(|e| LedgerError::InvalidResponse(format!("{method}: {e}")))
    }

    async fn sender(&self) -> LedgerResult<Address> {
        self.from
            .get_or_try_init(|| async {
                let accounts: Vec<Address> = self.call("eth_accounts", json!([])).await?;
                accounts.first().copied().ok_or(LedgerError::NoSender)
            })
            .await
            .copied()
    }
}

fn filter_params(filter: &LogFilter) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("fromBlock".into(), json!(format!("{:#x}", filter.from_block)));
    obj.insert(
        "toBlock".into(),
        match filter.to_block {
            Some(b) => json!(format!("{b:#x}")),
            None => json!("latest"),
        },
    );
    if let Some(address) = filter.address {
        obj.insert("address".into(), json!(address));
    }
    if let Some(topic) = filter.topic0 {
        obj.insert("topics".into(), json!([topic]));
    }
    json!([Value::Object(obj)])
}

#[async_trait]
impl LedgerClient for JsonRpcLedger {
    async fn send_transaction(&self, tx: &TransactionRequest) -> LedgerResult<Bytes32> {
        let from = match tx.from {
            Some(from) => from,
            None => self.sender().await?,
        };
        let mut obj = serde_json::Map::new();
        obj.insert("from".into(), json!(from));
        if let Some(to) = tx.to {
            obj.insert("to".into(), json!(to));
        }
        obj.insert("data".into(), json!(encode_hex(&tx.data)));
        if let Some(gas) = tx.gas {
            obj.insert("gas".into(), json!(format!("{gas:#x}")));
        }
        self.call("eth_sendTransaction", json!([Value::Object(obj)]))
            .await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> LedgerResult<Bytes32> {
        self.call("eth_sendRawTransaction", json!([encode_hex(raw)]))
            .await
    }

    async fn transaction_receipt(
        &self,
        hash: &Bytes32,
    ) -> LedgerResult<Option<TransactionReceipt>> {
        let receipt: Option<RpcReceipt> = self
            .call("eth_getTransactionReceipt", json!([hash]))
            .await?;
        receipt.map(TransactionReceipt::try_from).transpose()
    }

    async fn get_code(&self, address: &Address) -> LedgerResult<Vec<u8>> {
        let code: String = self.call("eth_getCode", json!([address, "latest"])).await?;
        Ok(decode_hex(&code)?)
    }

    async fn block_number(&self) -> LedgerResult<u64> {
        let n: String = self.call("eth_blockNumber", json!([])).await?;
        quantity(&n)
    }

    async fn get_logs(&self, filter: &LogFilter) -> LedgerResult<Vec<Log>> {
        let logs: Vec<RpcLog> = self.call("eth_getLogs", filter_params(filter)).await?;
        logs.into_iter().map(Log::try_from).collect()
    }
}

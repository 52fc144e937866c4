//! The message wire format and its structural validator.
//!
//! A message is a JSON object discriminated by its `type` field. The codec
//! checks the raw JSON against the schema before any typed decoding so that a
//! rejected message can report every offending path at once, not just the
//! first serde error.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::address::Address;
use crate::bytes::{decode_hex, serde_hex};
use crate::cid::ContentId;
use crate::error::TypeError;

pub const TYPE_DECODED: &str = "ContractInputDec";
pub const TYPE_ENCODED: &str = "ContractInputEnc";
pub const TYPE_TX: &str = "ContractInputTx";
pub const TYPE_FACTORY_DECODED: &str = "FactoryInputDec";

/// Raw (not yet ABI-encoded) contract input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecodedInput {
    pub to: Address,
    pub method: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

/// ABI-encoded call data addressed to a contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedInput {
    pub to: Address,
    #[serde(with = "serde_hex")]
    pub data: Vec<u8>,
    #[serde(rename = "gasLimit", default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
}

/// A reference to an already signed (pending) transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub to: Address,
    #[serde(with = "serde_hex")]
    pub transaction: Vec<u8>,
}

/// Raw request to a factory to create a contract described by an archived
/// ABI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FactoryDecodedInput {
    pub to: Address,
    #[serde(rename = "abiCIDStr")]
    pub abi_cid: ContentId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

/// A message destined for a contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    ContractInputDec(DecodedInput),
    ContractInputEnc(EncodedInput),
    ContractInputTx(TxInput),
    FactoryInputDec(FactoryDecodedInput),
}

/// Coarse classification used by the submission pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    RawInput,
    EncodedInput,
    PendingTx,
    FactoryRawInput,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RawInput => write!(f, "raw-input"),
            Self::EncodedInput => write!(f, "encoded-input"),
            Self::PendingTx => write!(f, "pending-tx"),
            Self::FactoryRawInput => write!(f, "factory-raw-input"),
        }
    }
}

impl Message {
    /// Build the deployment record for a contract created by a raw transaction.
    pub fn pending_tx(to: Address, transaction: Vec<u8>) -> Self {
        Self::ContractInputTx(TxInput { to, transaction })
    }

    pub fn encoded(to: Address, data: Vec<u8>) -> Self {
        Self::ContractInputEnc(EncodedInput {
            to,
            data,
            gas_limit: None,
        })
    }

    /// Destination contract.
    pub fn to(&self) -> Address {
        match self {
            Self::ContractInputDec(m) => m.to,
            Self::ContractInputEnc(m) => m.to,
            Self::ContractInputTx(m) => m.to,
            Self::FactoryInputDec(m) => m.to,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::ContractInputDec(_) => MessageKind::RawInput,
            Self::ContractInputEnc(_) => MessageKind::EncodedInput,
            Self::ContractInputTx(_) => MessageKind::PendingTx,
            Self::FactoryInputDec(_) => MessageKind::FactoryRawInput,
        }
    }

    /// JSON value with keys in sorted order.
    pub fn to_value(&self) -> Result<Value, TypeError> {
        serde_json::to_value(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Compact JSON with sorted keys. Equal messages produce equal bytes.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, TypeError> {
        serde_json::to_vec(&self.to_value()?).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Two-space indented JSON with sorted keys.
    pub fn to_pretty_json(&self) -> Result<Vec<u8>, TypeError> {
        serde_json::to_vec_pretty(&self.to_value()?)
            .map_err(|e| TypeError::Serialization(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single schema violation at a JSON path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub path: String,
    pub reason: String,
}

impl Violation {
    fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

/// All violations found while validating one message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    fn push(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        self.violations.push(Violation::new(path, reason));
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.violations.iter().map(ToString::to_string).collect();
        f.write_str(&lines.join("\n"))
    }
}

/// Structural validator and decoder for [`Message`].
pub struct MessageCodec;

impl MessageCodec {
    /// Validate a JSON value and decode it into a [`Message`].
    pub fn decode(value: &Value) -> Result<Message, ValidationReport> {
        let mut report = ValidationReport::default();

        let Some(obj) = value.as_object() else {
            report.push("$", "expected an object");
            return Err(report);
        };

        check_address(obj, "to", &mut report);

        match obj.get("type") {
            None => report.push("$.type", "missing field"),
            Some(Value::String(t)) => match t.as_str() {
                TYPE_DECODED => {
                    match obj.get("method") {
                        Some(Value::String(m)) if !m.trim().is_empty() => {}
                        Some(Value::String(_)) => report.push("$.method", "must not be empty"),
                        Some(_) => report.push("$.method", "expected a string"),
                        None => report.push("$.method", "missing field"),
                    }
                    if let Some(args) = obj.get("args") {
                        if !args.is_array() {
                            report.push("$.args", "expected an array");
                        }
                    }
                }
                TYPE_ENCODED => {
                    check_hex(obj, "data", &mut report);
                    if let Some(limit) = obj.get("gasLimit") {
                        if !limit.is_u64() {
                            report.push("$.gasLimit", "expected a non-negative integer");
                        }
                    }
                }
                TYPE_TX => check_hex(obj, "transaction", &mut report),
                TYPE_FACTORY_DECODED => {
                    check_cid(obj, "abiCIDStr", &mut report);
                    if let Some(args) = obj.get("args") {
                        if !args.is_array() {
                            report.push("$.args", "expected an array");
                        }
                    }
                }
                other => report.push(
                    "$.type",
                    format!(
                        "unknown message type {other:?}, expected one of \
                         {TYPE_DECODED}, {TYPE_ENCODED}, {TYPE_TX}, {TYPE_FACTORY_DECODED}"
                    ),
                ),
            },
            Some(_) => report.push("$.type", "expected a string"),
        }

        if !report.is_valid() {
            return Err(report);
        }

        serde_json::from_value(value.clone()).map_err(|e| {
            let mut report = ValidationReport::default();
            report.push("$", e.to_string());
            report
        })
    }

    /// Parse JSON bytes and decode.
    pub fn decode_slice(bytes: &[u8]) -> Result<Message, ValidationReport> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| {
            let mut report = ValidationReport::default();
            report.push("$", format!("invalid JSON: {e}"));
            report
        })?;
        Self::decode(&value)
    }

    /// Best-effort extraction of the destination before full validation.
    pub fn peek_destination(value: &Value) -> Option<Address> {
        value.get("to")?.as_str()?.parse().ok()
    }
}

fn check_address(obj: &Map<String, Value>, field: &str, report: &mut ValidationReport) {
    let path = format!("$.{field}");
    match obj.get(field) {
        None => report.push(path, "missing field"),
        Some(Value::String(s)) => {
            if let Err(e) = s.parse::<Address>() {
                report.push(path, format!("expected an address: {e}"));
            }
        }
        Some(_) => report.push(path, "expected an address string"),
    }
}

fn check_cid(obj: &Map<String, Value>, field: &str, report: &mut ValidationReport) {
    let path = format!("$.{field}");
    match obj.get(field) {
        None => report.push(path, "missing field"),
        Some(Value::String(s)) => {
            if let Err(e) = s.parse::<ContentId>() {
                report.push(path, e.to_string());
            }
        }
        Some(_) => report.push(path, "expected a CID string"),
    }
}

fn check_hex(obj: &Map<String, Value>, field: &str, report: &mut ValidationReport) {
    let path = format!("$.{field}");
    match obj.get(field) {
        None => report.push(path, "missing field"),
        Some(Value::String(s)) => {
            if !s.starts_with("0x") {
                report.push(path, "expected a 0x-prefixed hex string");
            } else if let Err(e) = decode_hex(s) {
                report.push(path, e.to_string());
            }
        }
        Some(_) => report.push(path, "expected a hex string"),
    }
}

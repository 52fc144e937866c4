use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::receipt::TransactionReceipt;

/// A contract created as a side effect of a sent message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedContract {
    pub address: Address,
    /// Root of the new contract's `below/` branch once initialized.
    #[serde(rename = "belowCIDStr")]
    pub below_cid: Option<String>,
}

/// Outcome of sending one message.
///
/// Errors are accumulated: a receipt or archive CID that was produced is
/// kept even when a later step fails.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    #[serde(rename = "cidStr")]
    pub cid: Option<String>,
    #[serde(rename = "belowCIDStr")]
    pub below_cid: Option<String>,
    pub tx_receipt: Option<TransactionReceipt>,
    pub contracts_created: Vec<CreatedContract>,
    pub error: Option<String>,
}

impl SendResult {
    /// Record an error, keeping any earlier one.
    pub fn push_error(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.error = Some(match self.error.take() {
            Some(prev) => format!("{prev}; {error}"),
            None => error,
        });
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_accumulate() {
        let mut r = SendResult::default();
        r.push_error("first");
        r.push_error("second");
        assert_eq!(r.error.as_deref(), Some("first; second"));
        assert!(!r.is_ok());
    }

    #[test]
    fn wire_names() {
        let r = SendResult {
            cid: Some("Qm1".into()),
            contracts_created: vec![CreatedContract {
                address: Address::new([0xab; 20]),
                below_cid: Some("Qm2".into()),
            }],
            ..SendResult::default()
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["cidStr"], "Qm1");
        assert!(json["belowCIDStr"].is_null());
        assert_eq!(json["contractsCreated"][0]["belowCIDStr"], "Qm2");
        assert_eq!(json["contractsCreated"][0]["address"], format!("0x{}", "ab".repeat(20)));
    }
}

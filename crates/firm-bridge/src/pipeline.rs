//! The message pipeline: validate, archive, submit, audit, detect creation.
//!
//! Precondition and validation failures reject the call with no side
//! effect; a failed archive is returned as an error too. Once the message
//! is archived, every failure is recorded in the returned [`SendResult`]
//! alongside whatever was already produced.

use serde_json::Value;
use tracing::{debug, info, warn};

use firm_ledger::events::{abi_signal_topic, decode_abi_signal};
use firm_ledger::TransactionRequest;
use firm_store::file_bundle;
use firm_types::message::EncodedInput;
use firm_types::{
    Address, ContentId, ContractSeed, CreatedContract, Message, MessageCodec, SendResult,
    TransactionReceipt,
};

use crate::bridge::Bridge;
use crate::error::{BridgeError, BridgeResult};
use crate::layout::ContractPaths;

pub const NOT_IMPLEMENTED: &str = "Not implemented";
pub const TX_NOT_APPLIED: &str = "Transaction not applied";
pub const CONTRACT_NOT_CREATED: &str = "Transaction to factory succeeded but contract not created";
pub const ABI_SIGNAL_MISSING: &str = "Abi signal event not found in the logs";

impl Bridge {
    /// Run one message through the pipeline.
    pub async fn send(&self, message: &Value) -> BridgeResult<SendResult> {
        let fs_contract = self.fs_contract()?;

        let Some(to) = MessageCodec::peek_destination(message) else {
            return Err(BridgeError::Validation(
                MessageCodec::decode(message).err().unwrap_or_default(),
            ));
        };
        let _guard = self.locks.lock(to).await;
        self.require_directory(&to).await?;
        let message = MessageCodec::decode(message).map_err(BridgeError::Validation)?;
        let paths = ContractPaths::new(&to);

        let archived = self.archive(&paths, &message).await?;
        let mut result = SendResult {
            cid: Some(archived.to_string()),
            ..SendResult::default()
        };
        self.refresh_below(&paths, &mut result).await;

        let input = match &message {
            Message::ContractInputEnc(input) => input,
            Message::ContractInputDec(_)
            | Message::ContractInputTx(_)
            | Message::FactoryInputDec(_) => {
                debug!(kind = %message.kind(), "message kind not submitted");
                result.push_error(NOT_IMPLEMENTED);
                return Ok(result);
            }
        };

        let receipt = match self.submit(input).await {
            Ok(receipt) => receipt,
            Err(e) => {
                result.push_error(e);
                return Ok(result);
            }
        };
        let applied = receipt.is_applied();
        result.tx_receipt = Some(receipt.clone());
        if !applied {
            warn!(%to, tx = %receipt.transaction_hash, "transaction not applied");
            result.push_error(TX_NOT_APPLIED);
            return Ok(result);
        }

        if let Err(e) = self.audit(&paths, &archived).await {
            result.push_error(format!("Recording applied message failed: {e}"));
        }
        self.refresh_below(&paths, &mut result).await;

        if to == self.deployer.factory_address() {
            self.detect_creation(input, &receipt, &archived, fs_contract, &mut result)
                .await;
        }
        info!(%to, cid = %archived, ok = result.is_ok(), "message processed");
        Ok(result)
    }

    /// [`send`](Self::send) for an already typed message.
    pub async fn send_message(&self, message: &Message) -> BridgeResult<SendResult> {
        self.send(&message.to_value()?).await
    }

    async fn archive(&self, paths: &ContractPaths, message: &Message) -> BridgeResult<ContentId> {
        let (_, car) = file_bundle(&message.to_canonical_json()?)?;
        Ok(self.import_locked(paths, &car, Some("json")).await?.cid)
    }

    async fn refresh_below(&self, paths: &ContractPaths, result: &mut SendResult) {
        match self.store.files_stat(&paths.below()).await {
            Ok(stat) => result.below_cid = Some(stat.cid.to_string()),
            Err(e) => result.push_error(format!("Reading below directory failed: {e}")),
        }
    }

    /// Send the transaction and wait for its receipt. Errors come back as
    /// the text recorded in the result.
    async fn submit(&self, input: &EncodedInput) -> Result<TransactionReceipt, String> {
        let tx = TransactionRequest::call(input.to, input.data.clone()).with_gas(input.gas_limit);
        let hash = self
            .ledger
            .send_transaction(&tx)
            .await
            .map_err(|e| format!("Sending transaction failed: {e}"))?;
        debug!(to = %input.to, %hash, "transaction sent");

        let waiting = self.ledger.wait_for_receipt(&hash, self.config.poll_interval);
        let receipt = match self.config.receipt_timeout {
            Some(limit) => tokio::time::timeout(limit, waiting)
                .await
                .map_err(|_| format!("Timed out waiting for receipt of {hash}"))?,
            None => waiting.await,
        };
        receipt.map_err(|e| format!("Waiting for receipt failed: {e}"))
    }

    async fn audit(&self, paths: &ContractPaths, archived: &ContentId) -> BridgeResult<()> {
        let src = paths.above_entry(archived, Some("json"));
        self.place_copy(&src, archived, &paths.below_in_entry(archived))
            .await?;
        Ok(())
    }

    async fn detect_creation(
        &self,
        input: &EncodedInput,
        receipt: &TransactionReceipt,
        archived: &ContentId,
        fs_contract: Address,
        result: &mut SendResult,
    ) {
        let child = match self.deployer.det_address(&input.data) {
            Ok(child) => child,
            Err(e) => {
                result.push_error(format!("Could not derive created address: {e}"));
                return;
            }
        };
        match self.deployer.contract_exists(&child).await {
            Ok(true) => {}
            Ok(false) => {
                result.push_error(CONTRACT_NOT_CREATED);
                return;
            }
            Err(e) => {
                result.push_error(format!("Checking created contract failed: {e}"));
                return;
            }
        }
        result.contracts_created.push(CreatedContract {
            address: child,
            below_cid: None,
        });

        let _child_guard = self.locks.lock(child).await;
        let child_paths = ContractPaths::new(&child);
        let signal = abi_signal_topic();
        let mut initialized = false;
        for log in receipt
            .logs_from(fs_contract)
            .filter(|log| log.topic0() == Some(&signal))
        {
            let abi = match decode_abi_signal(log) {
                Ok(abi) => abi,
                Err(e) => {
                    result.push_error(format!("Unexpected argument for AbiSignal event: {e}"));
                    continue;
                }
            };
            let seed = ContractSeed::from_archived(Some(abi), *archived);
            if let Err(e) = self.init_contract_dir_locked(&child_paths, &seed).await {
                result.push_error(format!("Failed creating directory for contract: {e}"));
                continue;
            }
            match self.store.files_stat(&child_paths.below()).await {
                Ok(stat) => {
                    if let Some(created) = result.contracts_created.last_mut() {
                        created.below_cid = Some(stat.cid.to_string());
                    }
                    initialized = true;
                }
                Err(e) => result.push_error(format!("Reading below directory failed: {e}")),
            }
        }
        if initialized {
            info!(%child, "contract directory created");
        } else if result.is_ok() {
            result.push_error(ABI_SIGNAL_MISSING);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use firm_ledger::create2::{create2_address, factory_calldata};
    use firm_ledger::events::{abi_signal_log, set_root_log};
    use firm_ledger::TxOutcome;
    use firm_store::ObjectStore;
    use firm_types::{encode_hex, Bytes32, DeploymentRecord, Log};

    use super::*;
    use crate::bridge::testing::*;
    use crate::config::BridgeConfig;
    use crate::entry::EntryUpdate;

    fn encoded(to: Address, data: &[u8]) -> Value {
        json!({"type": "ContractInputEnc", "to": to, "data": encode_hex(data)})
    }

    /// A directory for a plain contract at `address`.
    async fn plain_contract(h: &Harness, address: Address) {
        let seed = ContractSeed::inline(None, Message::encoded(address, vec![1]));
        h.bridge.init_contract_dir(address, seed).await.unwrap();
    }

    #[tokio::test]
    async fn factory_call_creates_child_directory() {
        let h = harness().await;
        let fs = h.bridge.fs_contract().unwrap();
        let salt = Bytes32::new([1; 32]);
        let data = factory_calldata(&salt, b"child init code");
        let child = create2_address(&h.factory, &salt, b"child init code");
        let abi = h.store.add_file(b"[{\"type\":\"function\"}]").await;
        h.ledger
            .script(TxOutcome::applied(vec![abi_signal_log(fs, &abi).unwrap()]))
            .await;

        let result = h.bridge.send(&encoded(h.factory, &data)).await.unwrap();
        assert!(result.is_ok(), "{:?}", result.error);
        let cid: ContentId = result.cid.as_deref().unwrap().parse().unwrap();

        let factory = ContractPaths::new(&h.factory);
        assert_eq!(
            h.store.list(&factory.below_in()).await.unwrap(),
            vec![format!("{cid}.json")]
        );
        assert_eq!(
            result.below_cid,
            Some(h.store.files_stat(&factory.below()).await.unwrap().cid.to_string())
        );

        let paths = ContractPaths::new(&child);
        assert_eq!(result.contracts_created.len(), 1);
        assert_eq!(result.contracts_created[0].address, child);
        assert_eq!(
            result.contracts_created[0].below_cid,
            Some(h.store.files_stat(&paths.below()).await.unwrap().cid.to_string())
        );
        assert_eq!(h.store.files_stat(&paths.abi()).await.unwrap().cid, abi);
        assert_eq!(h.store.files_stat(&paths.deployment()).await.unwrap().cid, cid);
        let record = h.store.read_file(&paths.deployment()).await.unwrap();
        assert_eq!(
            MessageCodec::decode_slice(&record).unwrap(),
            Message::encoded(h.factory, data)
        );
    }

    #[tokio::test]
    async fn invalid_message_has_no_side_effects() {
        let h = harness().await;
        let root = h.store.root().await;
        let sent = h.ledger.transaction_count().await;

        let bad = json!({"type": "ContractInputEnc", "to": h.factory, "data": "zz"});
        match h.bridge.send(&bad).await {
            Err(BridgeError::Validation(report)) => {
                assert!(report.violations.iter().any(|v| v.path == "$.data"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        let no_to = json!({"type": "ContractInputEnc", "data": "0x00"});
        assert!(matches!(
            h.bridge.send(&no_to).await,
            Err(BridgeError::Validation(_))
        ));
        assert_eq!(h.store.root().await, root);
        assert_eq!(h.ledger.transaction_count().await, sent);
    }

    #[tokio::test]
    async fn unknown_destination_is_rejected() {
        let h = harness().await;
        let root = h.store.root().await;
        let err = h
            .bridge
            .send(&encoded(Address::new([7; 20]), &[1, 2]))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(ref m) if m == "No directory for this address"));
        assert_eq!(h.store.root().await, root);
    }

    #[tokio::test]
    async fn send_requires_init() {
        let h = uninitialized(config());
        assert!(matches!(
            h.bridge.send(&encoded(h.factory, &[1])).await,
            Err(BridgeError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn reverted_transaction_is_archived_but_not_audited() {
        let h = harness().await;
        let target = Address::new([0x11; 20]);
        plain_contract(&h, target).await;
        h.ledger.script(TxOutcome::reverted()).await;

        let result = h.bridge.send(&encoded(target, &[1, 2, 3])).await.unwrap();
        assert_eq!(result.error.as_deref(), Some(TX_NOT_APPLIED));
        assert!(result.tx_receipt.is_some());
        let cid = result.cid.unwrap();

        let paths = ContractPaths::new(&target);
        assert_eq!(h.store.list(&paths.above()).await.unwrap(), vec![format!("{cid}.json")]);
        assert!(h.store.list(&paths.below_in()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn raw_and_pending_kinds_are_not_submitted() {
        let h = harness().await;
        let sent = h.ledger.transaction_count().await;
        let raw = json!({"type": "ContractInputDec", "to": h.factory, "method": "set", "args": [1]});
        let tx = Message::pending_tx(h.factory, vec![0xaa]);
        let factory_raw = json!({
            "type": "FactoryInputDec",
            "to": h.factory,
            "abiCIDStr": ContentId::for_dag_pb(b"abi").to_string(),
        });

        for result in [
            h.bridge.send(&raw).await.unwrap(),
            h.bridge.send_message(&tx).await.unwrap(),
            h.bridge.send(&factory_raw).await.unwrap(),
        ] {
            assert_eq!(result.error.as_deref(), Some(NOT_IMPLEMENTED));
            assert!(result.cid.is_some());
            assert!(result.tx_receipt.is_none());
        }
        assert_eq!(h.ledger.transaction_count().await, sent);
    }

    #[tokio::test]
    async fn audit_log_grows_with_each_applied_message() {
        let h = harness().await;
        let target = Address::new([0x22; 20]);
        plain_contract(&h, target).await;

        let mut belows = Vec::new();
        for i in 0u8..3 {
            let result = h.bridge.send(&encoded(target, &[i])).await.unwrap();
            assert!(result.is_ok(), "{:?}", result.error);
            belows.push(result.below_cid.unwrap());
        }
        let paths = ContractPaths::new(&target);
        assert_eq!(h.store.list(&paths.below_in()).await.unwrap().len(), 3);
        belows.dedup();
        assert_eq!(belows.len(), 3);
    }

    #[tokio::test]
    async fn resending_same_message_keeps_one_record() {
        let h = harness().await;
        let target = Address::new([0x23; 20]);
        plain_contract(&h, target).await;

        let first = h.bridge.send(&encoded(target, &[5])).await.unwrap();
        let second = h.bridge.send(&encoded(target, &[5])).await.unwrap();
        assert_eq!(first.cid, second.cid);
        assert_eq!(first.below_cid, second.below_cid);
        let paths = ContractPaths::new(&target);
        assert_eq!(h.store.list(&paths.below_in()).await.unwrap().len(), 1);
        assert_eq!(h.ledger.sent_transactions().await.len(), 3);
    }

    #[tokio::test]
    async fn gas_limit_is_forwarded() {
        let h = harness().await;
        let target = Address::new([0x24; 20]);
        plain_contract(&h, target).await;
        let msg = json!({
            "type": "ContractInputEnc",
            "to": target,
            "data": "0x01",
            "gasLimit": 90000,
        });
        h.bridge.send(&msg).await.unwrap();
        let sent = h.ledger.sent_transactions().await;
        assert_eq!(sent.last().unwrap().gas, Some(90000));
    }

    #[tokio::test]
    async fn factory_call_without_abi_signal() {
        let h = harness().await;
        let salt = Bytes32::new([2; 32]);
        let data = factory_calldata(&salt, b"quiet child");
        let child = create2_address(&h.factory, &salt, b"quiet child");
        // Events from other emitters or of other kinds do not count.
        let stray = abi_signal_log(Address::new([9; 20]), &ContentId::for_dag_pb(b"x")).unwrap();
        let fs = h.bridge.fs_contract().unwrap();
        let root = set_root_log(fs, child, &ContentId::for_dag_pb(b"y")).unwrap();
        h.ledger.script(TxOutcome::applied(vec![stray, root])).await;

        let result = h.bridge.send(&encoded(h.factory, &data)).await.unwrap();
        assert_eq!(result.error.as_deref(), Some(ABI_SIGNAL_MISSING));
        assert_eq!(result.contracts_created.len(), 1);
        assert_eq!(result.contracts_created[0].below_cid, None);
        assert!(h.bridge.stat(&child).await.is_none());
    }

    #[tokio::test]
    async fn malformed_abi_signal_is_reported() {
        let h = harness().await;
        let fs = h.bridge.fs_contract().unwrap();
        let data = factory_calldata(&Bytes32::new([3; 32]), b"child");
        let broken = Log::new(fs, vec![abi_signal_topic()], vec![0; 4]);
        h.ledger.script(TxOutcome::applied(vec![broken])).await;

        let result = h.bridge.send(&encoded(h.factory, &data)).await.unwrap();
        let error = result.error.unwrap();
        assert!(error.starts_with("Unexpected argument for AbiSignal event"), "{error}");
        assert!(result.cid.is_some());
    }

    #[tokio::test]
    async fn short_factory_calldata_is_reported_after_audit() {
        let h = harness().await;
        let result = h.bridge.send(&encoded(h.factory, &[1, 2, 3])).await.unwrap();
        assert!(result.error.unwrap().starts_with("Could not derive created address"));
        let factory = ContractPaths::new(&h.factory);
        assert_eq!(h.store.list(&factory.below_in()).await.unwrap().len(), 1);
        assert!(result.contracts_created.is_empty());
    }

    #[tokio::test]
    async fn receipt_timeout_keeps_archive() {
        let h = harness_with(BridgeConfig {
            receipt_timeout: Some(Duration::from_millis(20)),
            ..config()
        })
        .await;
        let target = Address::new([0x33; 20]);
        plain_contract(&h, target).await;
        h.ledger.script(TxOutcome::pending()).await;

        let result = h.bridge.send(&encoded(target, &[1])).await.unwrap();
        assert!(result.error.unwrap().starts_with("Timed out waiting for receipt"));
        assert!(result.cid.is_some());
        assert!(result.tx_receipt.is_none());
    }

    #[tokio::test]
    async fn entry_update_waits_for_inflight_send() {
        let h = harness_with(BridgeConfig {
            receipt_timeout: Some(Duration::from_millis(100)),
            ..config()
        })
        .await;
        let target = Address::new([0x34; 20]);
        plain_contract(&h, target).await;
        let replacement = h.store.add_file(b"replacement root").await;
        h.ledger.script(TxOutcome::pending()).await;

        let sending = {
            let bridge = h.bridge.clone();
            tokio::spawn(async move { bridge.send(&encoded(target, &[1])).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let updating = {
            let bridge = h.bridge.clone();
            tokio::spawn(async move { bridge.update_entry(target, replacement).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The send is parked on its receipt and still owns the directory.
        assert!(!sending.is_finished());
        assert!(!updating.is_finished());
        let above = ContractPaths::new(&target).above();
        assert_eq!(h.store.list(&above).await.unwrap().len(), 1);

        let result = sending.await.unwrap().unwrap();
        assert!(result.cid.is_some());
        assert!(matches!(
            updating.await.unwrap().unwrap(),
            EntryUpdate::Replaced { .. }
        ));
        assert_eq!(h.bridge.stat(&target).await.unwrap().cid, replacement);
    }

    #[tokio::test]
    async fn seeds_reference_archived_message() {
        let h = harness().await;
        let fs = h.bridge.fs_contract().unwrap();
        let data = factory_calldata(&Bytes32::new([4; 32]), b"seeded");
        let abi = h.store.add_file(b"[]").await;
        // Two signals for the same child initialize it once.
        let log = abi_signal_log(fs, &abi).unwrap();
        h.ledger.script(TxOutcome::applied(vec![log.clone(), log])).await;

        let result = h.bridge.send(&encoded(h.factory, &data)).await.unwrap();
        assert!(result.is_ok(), "{:?}", result.error);
        assert_eq!(result.contracts_created.len(), 1);
        let child = result.contracts_created[0].address;
        let cid: ContentId = result.cid.unwrap().parse().unwrap();
        let expected = ContractSeed::from_archived(Some(abi), cid);
        assert_eq!(expected.deployment, DeploymentRecord::Cid(cid));
        let paths = ContractPaths::new(&child);
        assert_eq!(h.store.files_stat(&paths.deployment()).await.unwrap().cid, cid);
    }
}

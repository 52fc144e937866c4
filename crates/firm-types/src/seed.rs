use serde::{Deserialize, Serialize};

use crate::cid::ContentId;
use crate::message::Message;

/// Where a contract's `sc/deployment.json` comes from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentRecord {
    /// An object already present in the store, copied in by CID.
    Cid(ContentId),
    /// A message serialized with sorted keys and written as a new file.
    Inline(Message),
}

/// Everything needed to initialize a new contract's directory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractSeed {
    pub abi_cid: Option<ContentId>,
    pub deployment: DeploymentRecord,
}

impl ContractSeed {
    /// Seed for a contract whose deployment record is an archived message.
    pub fn from_archived(abi_cid: Option<ContentId>, deployment_msg: ContentId) -> Self {
        Self {
            abi_cid,
            deployment: DeploymentRecord::Cid(deployment_msg),
        }
    }

    pub fn inline(abi_cid: Option<ContentId>, message: Message) -> Self {
        Self {
            abi_cid,
            deployment: DeploymentRecord::Inline(message),
        }
    }
}

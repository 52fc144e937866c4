//! Client for a Kubo (go-ipfs) node's HTTP RPC API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use firm_types::ContentId;

use crate::car::CarBundle;
use crate::error::{StoreError, StoreResult};
use crate::traits::{BlockStat, EntryKind, FileStat, ObjectStore};

/// Kubo RPC client. Every call is a `POST` to `<api_url>/<command>`.
pub struct KuboClient {
    http: reqwest::Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KuboStat {
    hash: String,
    size: u64,
    cumulative_size: u64,
    blocks: u64,
    #[serde(rename = "Type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KuboBlockStat {
    key: String,
    size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KuboError {
    message: String,
}

impl KuboClient {
    /// `api_url` is the RPC base, e.g. `http://127.0.0.1:5001/api/v0`.
    pub fn new(api_url: impl Into<String>) -> StoreResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn call(
        &self,
        command: &str,
        query: &[(&str, &str)],
        form: Option<Form>,
    ) -> StoreResult<bytes::Bytes> {
        debug!(command, "kubo rpc");
        let mut req = self
            .http
            .post(format!("{}/{command}", self.api_url))
            .query(query);
        if let Some(form) = form {
            req = req.multipart(form);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(map_error(status.as_u16(), &body))
        }
    }

    async fn call_json<T: for<'de> Deserialize<'de>>(
        &self,
        command: &str,
        query: &[(&str, &str)],
    ) -> StoreResult<T> {
        let body = self.call(command, query, None).await?;
        serde_json::from_slice(&body).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// Map a Kubo error response to a store error.
fn map_error(status: u16, body: &[u8]) -> StoreError {
    let message = serde_json::from_slice::<KuboError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());
    let lower = message.to_lowercase();
    if status == 404 || lower.contains("does not exist") || lower.contains("not found") {
        StoreError::NotFound(message)
    } else if lower.contains("already has entry") || lower.contains("already exists") {
        StoreError::AlreadyExists(message)
    } else {
        StoreError::Remote { status, message }
    }
}

fn file_part(content: &[u8]) -> Form {
    Form::new().part("file", Part::bytes(content.to_vec()).file_name("file"))
}

fn bool_str(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

impl TryFrom<KuboStat> for FileStat {
    type Error = StoreError;

    fn try_from(s: KuboStat) -> StoreResult<Self> {
        let kind = match s.kind.as_str() {
            "directory" => EntryKind::Directory,
            _ => EntryKind::File,
        };
        Ok(FileStat {
            cid: s.hash.parse()?,
            size: s.size,
            cumulative_size: s.cumulative_size,
            blocks: s.blocks,
            kind,
        })
    }
}

#[async_trait]
impl ObjectStore for KuboClient {
    async fn files_stat(&self, path: &str) -> StoreResult<FileStat> {
        let stat: KuboStat = self.call_json("files/stat", &[("arg", path)]).await?;
        stat.try_into()
    }

    async fn files_mkdir(&self, path: &str, parents: bool) -> StoreResult<()> {
        self.call(
            "files/mkdir",
            &[("arg", path), ("parents", bool_str(parents)), ("cid-version", "0")],
            None,
        )
        .await?;
        Ok(())
    }

    async fn files_cp(&self, src: &str, dst: &str, parents: bool) -> StoreResult<()> {
        self.call(
            "files/cp",
            &[("arg", src), ("arg", dst), ("parents", bool_str(parents))],
            None,
        )
        .await?;
        Ok(())
    }

    async fn files_rm(&self, path: &str, recursive: bool) -> StoreResult<()> {
        self.call(
            "files/rm",
            &[("arg", path), ("recursive", bool_str(recursive))],
            None,
        )
        .await?;
        Ok(())
    }

    async fn files_write(&self, path: &str, content: &[u8]) -> StoreResult<()> {
        self.call(
            "files/write",
            &[
                ("arg", path),
                ("create", "true"),
                ("truncate", "true"),
                ("parents", "true"),
                ("cid-version", "0"),
                ("raw-leaves", "false"),
            ],
            Some(file_part(content)),
        )
        .await?;
        Ok(())
    }

    async fn dag_import(&self, car: &[u8]) -> StoreResult<Vec<ContentId>> {
        // Kubo reports no roots when pinning is off, so read them locally.
        let roots = CarBundle::read_roots(car)?;
        self.call(
            "dag/import",
            &[("pin-roots", "false")],
            Some(file_part(car)),
        )
        .await?;
        Ok(roots)
    }

    async fn block_get(&self, cid: &ContentId) -> StoreResult<Vec<u8>> {
        let arg = cid.to_string();
        Ok(self.call("block/get", &[("arg", arg.as_str())], None).await?.to_vec())
    }

    async fn block_stat(&self, cid: &ContentId) -> StoreResult<BlockStat> {
        let arg = cid.to_string();
        let stat: KuboBlockStat = self.call_json("block/stat", &[("arg", arg.as_str())]).await?;
        Ok(BlockStat {
            cid: stat.key.parse()?,
            size: stat.size,
        })
    }
}

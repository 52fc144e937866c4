//! Object store access for firmnode.
//!
//! The bridge talks to a content-addressed store through the [`ObjectStore`]
//! trait: path operations over a private mutable namespace plus block-level
//! operations by CID. Two backends are provided, [`KuboClient`] for a Kubo
//! node's RPC API and [`InMemoryObjectStore`] for tests and embedding.
//!
//! The crate also carries the codecs those operations need locally: dag-pb
//! and UnixFS ([`dagpb`]), CARv1 bundles ([`car`]), HAMT shard addressing
//! ([`hamt`]) and a UnixFS exporter over an abstract [`Blockstore`].

pub mod car;
pub mod dagpb;
pub mod error;
pub mod exporter;
pub mod hamt;
pub mod kubo;
pub mod memory;
pub mod traits;
mod varint;

pub use car::{file_bundle, CarBundle, CarWriter};
pub use error::{StoreError, StoreResult};
pub use exporter::{export, Blockstore, DirEntry, UnixFsEntry};
pub use kubo::KuboClient;
pub use memory::InMemoryObjectStore;
pub use traits::{BlockStat, EntryKind, FileStat, ObjectStore};

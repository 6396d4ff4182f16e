//! The indexer collaborator boundary.
//!
//! The engine never talks to the network itself; discovery queries go
//! through this trait, implemented by whatever indexed-chain client the
//! application uses. Queries are the engine's only suspension points and
//! carry no ordering requirements, so callers may issue them concurrently.

use async_trait::async_trait;

use crate::discovery::GroupKey;
use crate::error::Result;
use crate::script::Script;
use crate::token::{TokenId, TokenProtocol};
use crate::tx::{OutPoint, TxId};

/// Indexed token balance attached to a UTXO or output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEntry {
    pub token_id: TokenId,
    pub protocol: TokenProtocol,
    pub token_type: u8,
    pub amount: u64,
}

/// A UTXO as reported by the indexer, with opaque plugin metadata attached
/// by the offer-indexing plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedUtxo {
    pub outpoint: OutPoint,
    pub sats: u64,
    pub script: Script,
    pub token: Option<TokenEntry>,
    /// Plugin metadata fields; the first is the covenant variant tag.
    pub plugin_data: Vec<Vec<u8>>,
}

/// A decoded input of a historical transaction, including what it spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryInput {
    pub prev_out: OutPoint,
    pub script_sig: Script,
    /// Value of the spent output.
    pub sats: u64,
    /// Locking script of the spent output.
    pub prev_script: Script,
    pub token: Option<TokenEntry>,
    /// Plugin metadata of the spent output.
    pub plugin_data: Vec<Vec<u8>>,
}

/// A decoded output of a historical transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryOutput {
    pub sats: u64,
    pub script: Script,
    pub token: Option<TokenEntry>,
    pub plugin_data: Vec<Vec<u8>>,
    pub spent_by: Option<OutPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTx {
    pub txid: TxId,
    pub inputs: Vec<HistoryInput>,
    pub outputs: Vec<HistoryOutput>,
    pub is_confirmed: bool,
    pub timestamp: i64,
}

/// Which slice of history to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    Confirmed,
    Unconfirmed,
    All,
}

#[derive(Debug, Clone, Default)]
pub struct UtxoPage {
    pub utxos: Vec<IndexedUtxo>,
    pub num_pages: u32,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    pub txs: Vec<HistoryTx>,
    pub num_pages: u32,
}

/// Backend supplying indexed chain data.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Unspent outputs locked by `script`.
    async fn script_utxos(&self, script: &Script) -> Result<Vec<IndexedUtxo>>;

    /// UTXOs grouped under a plugin group key, paginated.
    async fn group_utxos(&self, key: &GroupKey, page: u32, page_size: u32) -> Result<UtxoPage>;

    /// Transaction history grouped under a plugin group key, paginated.
    async fn group_history(
        &self,
        key: &GroupKey,
        kind: HistoryKind,
        page: u32,
        page_size: u32,
    ) -> Result<HistoryPage>;

    /// Start streaming update notifications for a group key.
    async fn subscribe_group(&self, key: &GroupKey) -> Result<()>;

    /// Stop streaming update notifications for a group key.
    async fn unsubscribe_group(&self, key: &GroupKey) -> Result<()>;
}

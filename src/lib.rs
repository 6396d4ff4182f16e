//! Offer covenant engine for a UTXO ledger ("Agora").
//!
//! Lets a maker list fungible or non-fungible tokens for sale directly on
//! chain, enforced purely by spending-script logic: takers accept all or
//! part of an offer, makers cancel, nobody custodies anything. The crate
//! covers parameter approximation under script-integer width limits,
//! deterministic covenant script derivation, accept/cancel transaction
//! building with exact fee measurement, fee-covering input selection, and
//! offer discovery against an indexed chain backend.

pub mod discovery;
pub mod error;
pub mod hash;
pub mod indexer;
pub mod offer;
pub mod oneshot;
pub mod partial;
pub mod script;
pub mod select;
pub mod ser;
pub mod sighash;
pub mod sign;
pub mod token;
pub mod tx;

// Core types
pub use error::{Error, Result};
pub use offer::{
    AcceptParams, AgoraOffer, AgoraVariant, CancelParams, DEFAULT_FEE_PER_KB, FuelInput,
    MAKER_PAYMENT_IDX, OFFER_OUTPUT_IDX, OfferStatus, TakenInfo, fee_for_size,
};
pub use oneshot::AgoraOneshot;
pub use partial::{AgoraPartial, DEFAULT_DUST_SATS, NANO_SATS_PER_SAT, OfferTerms};
pub use select::{select_accept_fuel, select_cancel_fuel, select_fuel_inputs};

// Primitive boundary
pub use script::Script;
pub use sign::PubKey;
pub use token::{TokenId, TokenProtocol, send_envelope};
pub use tx::{OutPoint, Tx, TxId, TxInput, TxOutput};

// Discovery & indexer boundary
pub use discovery::{
    GroupKey, VARIANT_TAG_ONESHOT, VARIANT_TAG_PARTIAL, choose_enforced_locktime, historic_offers,
    open_offers, subscribe_offers, unsubscribe_offers,
};
pub use indexer::{
    HistoryInput, HistoryKind, HistoryOutput, HistoryPage, HistoryTx, IndexedUtxo, Indexer,
    TokenEntry, UtxoPage,
};

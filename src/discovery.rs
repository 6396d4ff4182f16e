//! Offer discovery: open offers from the indexer's plugin-group index,
//! historic offers reconstructed from transaction history, update
//! subscriptions, and the collision-free lock-time picker.
//!
//! Everything decoded here is untrusted chain data: records that fail to
//! decode, or whose re-derived locking script does not match the UTXO, are
//! skipped with a warning; a bulk scan must never abort on one bad record.

use rand::Rng;

use crate::error::{Error, Result};
use crate::indexer::{HistoryInput, HistoryKind, HistoryTx, IndexedUtxo, Indexer};
use crate::offer::{
    AgoraOffer, AgoraVariant, MAKER_PAYMENT_IDX, OFFER_OUTPUT_IDX, OfferStatus, TakenInfo,
};
use crate::oneshot::AgoraOneshot;
use crate::partial::AgoraPartial;
use crate::sign::PubKey;
use crate::token::TokenId;

/// Plugin metadata tag for Oneshot offers.
pub const VARIANT_TAG_ONESHOT: &[u8] = b"ONESHOT";
/// Plugin metadata tag for Partial offers.
pub const VARIANT_TAG_PARTIAL: &[u8] = b"PARTIAL";

/// Page size used when draining the plugin-group UTXO index.
const GROUP_UTXO_PAGE_SIZE: u32 = 200;

/// Lock-times at or above this value are interpreted as timestamps.
pub const LOCKTIME_TIME_THRESHOLD: u32 = 500_000_000;
/// Enforced lock-times are randomized over past timestamps, so acceptance is
/// never actually delayed; the randomness only gives near-identical listings
/// distinct script hashes.
pub const MIN_ENFORCED_LOCKTIME: u32 = LOCKTIME_TIME_THRESHOLD;
pub const MAX_ENFORCED_LOCKTIME: u32 = 1_600_000_000;

/// The three group-key address spaces, kept disjoint by a one-byte prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    /// All offers trading a token.
    Token(TokenId),
    /// All offers trading children of a non-fungible group token.
    GroupToken(TokenId),
    /// All offers cancellable by a maker key.
    Maker(PubKey),
}

impl GroupKey {
    /// The serialized key used against the indexer's plugin-group index.
    pub fn to_bytes(&self) -> Vec<u8> {
        let (prefix, payload): (u8, &[u8; 32]) = match self {
            GroupKey::Token(token_id) => (b'T', &token_id.0),
            GroupKey::GroupToken(token_id) => (b'G', &token_id.0),
            GroupKey::Maker(pk) => (b'P', pk.as_bytes()),
        };
        let mut bytes = Vec::with_capacity(33);
        bytes.push(prefix);
        bytes.extend_from_slice(payload);
        bytes
    }
}

/// All currently open offers under a group key.
pub async fn open_offers(indexer: &dyn Indexer, key: &GroupKey) -> Result<Vec<AgoraOffer>> {
    let mut offers = Vec::new();
    let mut page = 0u32;
    loop {
        let utxo_page = indexer.group_utxos(key, page, GROUP_UTXO_PAGE_SIZE).await?;
        for utxo in &utxo_page.utxos {
            if let Some(offer) = decode_offer_utxo(utxo) {
                offers.push(offer);
            }
        }
        page += 1;
        if page >= utxo_page.num_pages {
            break;
        }
    }
    Ok(offers)
}

/// One page of historic (taken or canceled) offers under a group key.
///
/// Creation-only transactions yield no event here: an offer's fate is
/// reported by the transaction that spends it. A partial accept both spends
/// an offer and recreates one at the canonical output index; it is reported
/// exactly once, as the accept of the spent offer, never additionally as
/// the creation of the remainder.
pub async fn historic_offers(
    indexer: &dyn Indexer,
    key: &GroupKey,
    kind: HistoryKind,
    page: u32,
    page_size: u32,
) -> Result<Vec<AgoraOffer>> {
    let history = indexer.group_history(key, kind, page, page_size).await?;
    Ok(history.txs.iter().filter_map(classify_history_tx).collect())
}

/// Subscribe to offer-update notifications for a group key.
pub async fn subscribe_offers(indexer: &dyn Indexer, key: &GroupKey) -> Result<()> {
    indexer.subscribe_group(key).await
}

/// Unsubscribe from offer-update notifications for a group key.
pub async fn unsubscribe_offers(indexer: &dyn Indexer, key: &GroupKey) -> Result<()> {
    indexer.unsubscribe_group(key).await
}

/// Pick an enforced lock-time whose resulting covenant script is not yet on
/// chain, retrying with fresh randomness on every collision. Terminates
/// probabilistically; at realistic listing counts a collision is a
/// birthday-bound curiosity, not a loop.
pub async fn choose_enforced_locktime(
    indexer: &dyn Indexer,
    partial: &AgoraPartial,
) -> Result<u32> {
    loop {
        let locktime = rand::thread_rng().gen_range(MIN_ENFORCED_LOCKTIME..MAX_ENFORCED_LOCKTIME);
        let mut candidate = partial.clone();
        candidate.enforced_locktime = locktime;
        candidate.update_script_len();
        if indexer
            .script_utxos(&candidate.script_pubkey())
            .await?
            .is_empty()
        {
            return Ok(locktime);
        }
        log::debug!("lock-time {locktime} already listed on chain, retrying");
    }
}

/// Whether plugin metadata claims to describe an offer covenant.
pub fn is_offer_plugin_data(plugin_data: &[Vec<u8>]) -> bool {
    matches!(
        plugin_data.first().map(Vec::as_slice),
        Some(VARIANT_TAG_ONESHOT) | Some(VARIANT_TAG_PARTIAL)
    )
}

/// Decode one indexed UTXO into an open offer, or `None` if it is not (or
/// only pretends to be) one.
pub fn decode_offer_utxo(utxo: &IndexedUtxo) -> Option<AgoraOffer> {
    match try_decode_offer_utxo(utxo) {
        Ok(offer) => Some(offer),
        Err(err) => {
            log::warn!("skipping utxo {:?}: {err}", utxo.outpoint);
            None
        }
    }
}

fn try_decode_offer_utxo(utxo: &IndexedUtxo) -> Result<AgoraOffer> {
    let (variant, token_amount) = decode_variant(
        &utxo.plugin_data,
        utxo.token.as_ref().map(|t| t.amount),
        &utxo.script,
    )?;
    Ok(AgoraOffer {
        variant,
        outpoint: utxo.outpoint,
        utxo_sats: utxo.sats,
        token_amount,
        status: OfferStatus::Open,
    })
}

/// Decode plugin metadata into covenant parameters and check the re-derived
/// locking script against the one actually guarding the UTXO.
fn decode_variant(
    plugin_data: &[Vec<u8>],
    token_amount: Option<u64>,
    locking_script: &crate::script::Script,
) -> Result<(AgoraVariant, u64)> {
    let tag = plugin_data
        .first()
        .ok_or_else(|| Error::MalformedConsts("no plugin metadata".into()))?;
    // An offer UTXO with no token balance offers nothing; treat it as not an
    // offer rather than surfacing a zero-quantity listing.
    let token_amount =
        token_amount.ok_or_else(|| Error::MalformedConsts("no token balance".into()))?;
    let variant = match tag.as_slice() {
        VARIANT_TAG_PARTIAL => {
            let consts = plugin_data
                .get(1)
                .ok_or_else(|| Error::MalformedConsts("missing covenant constants".into()))?;
            let mut partial = AgoraPartial::from_consts(consts, 0)?;
            let bits = 8 * partial.num_token_trunc_bytes as u32;
            partial.trunc_tokens = token_amount >> bits;
            if partial.trunc_tokens << bits != token_amount || partial.trunc_tokens == 0 {
                return Err(Error::MalformedConsts(format!(
                    "token balance {token_amount} is not a whole number of truncation units"
                )));
            }
            AgoraVariant::Partial(partial)
        }
        VARIANT_TAG_ONESHOT => {
            let cancel_pk = plugin_data
                .get(1)
                .ok_or_else(|| Error::MalformedConsts("missing cancel key".into()))?;
            let token_meta = plugin_data
                .get(2)
                .ok_or_else(|| Error::MalformedConsts("missing token metadata".into()))?;
            let outputs_ser = plugin_data
                .get(3)
                .ok_or_else(|| Error::MalformedConsts("missing enforced outputs".into()))?;
            AgoraVariant::Oneshot(AgoraOneshot::from_plugin_fields(
                cancel_pk, token_meta, outputs_ser,
            )?)
        }
        other => {
            return Err(Error::MalformedConsts(format!(
                "unknown covenant variant tag {:?}",
                String::from_utf8_lossy(other)
            )));
        }
    };
    if variant.script_pubkey() != *locking_script {
        return Err(Error::MalformedConsts(
            "re-derived script does not match the locking script".into(),
        ));
    }
    Ok((variant, token_amount))
}

/// Classify one history transaction into a discrete offer event, or `None`
/// for transactions that are not one (creation-only, unrelated, malformed).
pub fn classify_history_tx(tx: &HistoryTx) -> Option<AgoraOffer> {
    let input = tx
        .inputs
        .iter()
        .find(|input| is_offer_plugin_data(&input.plugin_data))?;
    match classify_offer_spend(tx, input) {
        Ok(offer) => Some(offer),
        Err(err) => {
            log::warn!("skipping history tx {}: {err}", tx.txid);
            None
        }
    }
}

fn classify_offer_spend(tx: &HistoryTx, input: &HistoryInput) -> Result<AgoraOffer> {
    let (variant, token_amount) = decode_variant(
        &input.plugin_data,
        input.token.as_ref().map(|t| t.amount),
        &input.prev_script,
    )?;

    // The unlocking script's final push is the redeem script; the push
    // before it is the is-accept witness flag.
    let pushes = input
        .script_sig
        .pushes()
        .ok_or_else(|| Error::MalformedConsts("unlocking script is not push-only".into()))?;
    if pushes.len() < 2 {
        return Err(Error::MalformedConsts("unlocking script too short".into()));
    }
    let redeem = &pushes[pushes.len() - 1];
    if *redeem != variant.redeem_script().bytecode() {
        return Err(Error::MalformedConsts(
            "unlocking script spends a different covenant".into(),
        ));
    }
    let is_accept = !pushes[pushes.len() - 2].is_empty();

    let status = if is_accept {
        // A same-terms remainder covenant at the canonical index shifts the
        // taker output one position down.
        let has_remainder = tx
            .outputs
            .get(OFFER_OUTPUT_IDX)
            .is_some_and(|output| is_offer_plugin_data(&output.plugin_data));
        let taker_idx = if has_remainder {
            OFFER_OUTPUT_IDX + 1
        } else {
            OFFER_OUTPUT_IDX
        };
        let maker_output = tx
            .outputs
            .get(MAKER_PAYMENT_IDX)
            .ok_or_else(|| Error::MalformedConsts("accept without maker payment".into()))?;
        let taker_output = tx
            .outputs
            .get(taker_idx)
            .ok_or_else(|| Error::MalformedConsts("accept without taker output".into()))?;
        let tokens_purchased = taker_output
            .token
            .as_ref()
            .ok_or_else(|| Error::MalformedConsts("taker output carries no tokens".into()))?
            .amount;
        OfferStatus::Taken(TakenInfo {
            sats_paid: maker_output.sats,
            tokens_purchased,
            taker_script: taker_output.script.clone(),
        })
    } else {
        OfferStatus::Canceled
    };

    Ok(AgoraOffer {
        variant,
        outpoint: input.prev_out,
        utxo_sats: input.sats,
        token_amount,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::TokenEntry;
    use crate::partial::OfferTerms;
    use crate::token::TokenProtocol;
    use crate::tx::{OutPoint, TxId};

    fn sample_partial() -> AgoraPartial {
        AgoraPartial::approximate(&OfferTerms {
            offered_tokens: 1000,
            price_nano_sats_per_token: 1_000_000_000,
            maker_pk: PubKey([0xaa; 32]),
            min_accepted_tokens: 10,
            token_id: TokenId([0xcd; 32]),
            token_type: 1,
            token_protocol: TokenProtocol::Slp,
            enforced_locktime: 1_234_567_890,
            dust_sats: None,
            min_scale_factor: None,
            min_price_integer: None,
            price_precision_ratio: None,
        })
        .unwrap()
    }

    fn partial_utxo(partial: &AgoraPartial) -> IndexedUtxo {
        IndexedUtxo {
            outpoint: OutPoint::new(TxId([0x55; 32]), 1),
            sats: partial.dust_sats,
            script: partial.script_pubkey(),
            token: Some(TokenEntry {
                token_id: partial.token_id,
                protocol: partial.token_protocol,
                token_type: partial.token_type,
                amount: partial.offered_tokens(),
            }),
            plugin_data: vec![VARIANT_TAG_PARTIAL.to_vec(), partial.covenant_consts()],
        }
    }

    #[test]
    fn group_key_prefixes_are_disjoint() {
        let id = TokenId([0x11; 32]);
        let token = GroupKey::Token(id).to_bytes();
        let group = GroupKey::GroupToken(id).to_bytes();
        let maker = GroupKey::Maker(PubKey([0x11; 32])).to_bytes();
        assert_eq!(token[0], b'T');
        assert_eq!(group[0], b'G');
        assert_eq!(maker[0], b'P');
        // identical 32-byte payloads still give distinct keys
        assert_ne!(token, group);
        assert_ne!(token, maker);
    }

    #[test]
    fn partial_utxo_roundtrip() {
        let partial = sample_partial();
        let offer = decode_offer_utxo(&partial_utxo(&partial)).unwrap();
        assert_eq!(offer.token_amount, 1000);
        assert_eq!(offer.status, OfferStatus::Open);
        let AgoraVariant::Partial(decoded) = &offer.variant else {
            panic!("expected partial");
        };
        assert_eq!(*decoded, partial);
    }

    #[test]
    fn script_hash_mismatch_is_skipped() {
        let partial = sample_partial();
        let mut utxo = partial_utxo(&partial);
        // metadata claims different terms than the script enforces
        let mut forged = partial.clone();
        forged.scaled_trunc_tokens_per_trunc_sat /= 2;
        utxo.plugin_data[1] = forged.covenant_consts();
        assert!(decode_offer_utxo(&utxo).is_none());
    }

    #[test]
    fn missing_token_balance_is_skipped() {
        let partial = sample_partial();
        let mut utxo = partial_utxo(&partial);
        utxo.token = None;
        assert!(decode_offer_utxo(&utxo).is_none());
    }

    #[test]
    fn unknown_variant_tag_is_skipped() {
        let partial = sample_partial();
        let mut utxo = partial_utxo(&partial);
        utxo.plugin_data[0] = b"TWOSHOT".to_vec();
        assert!(decode_offer_utxo(&utxo).is_none());
    }

    #[test]
    fn truncated_consts_are_skipped() {
        let partial = sample_partial();
        let mut utxo = partial_utxo(&partial);
        utxo.plugin_data[1].truncate(20);
        assert!(decode_offer_utxo(&utxo).is_none());
    }
}

//! The Partial offer covenant: incrementally fillable listings.
//!
//! A Partial offer locks the offered tokens behind a P2SH script whose accept
//! path re-derives the maker's required payment from a taker-supplied
//! quantity witness and, when the offer is under-filled, requires the
//! spending transaction to recreate the same covenant holding the remainder.

pub mod approx;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::script::{Script, opcode};
use crate::ser::ByteReader;
use crate::sign::PubKey;
use crate::token::{TokenId, TokenProtocol};

pub use approx::{
    DEFAULT_DUST_SATS, DEFAULT_MIN_PRICE_INTEGER, DEFAULT_MIN_SCALE_FACTOR,
    DEFAULT_PRICE_PRECISION_RATIO, DEFAULT_SCRIPT_INTEGER_BITS, NANO_SATS_PER_SAT, OfferTerms,
};

/// Version byte at the head of the covenant constants blob.
const CONSTS_VERSION: u8 = 1;
/// Serialized length of the constants blob. Fixed-width fields keep the
/// script length stable across rebuilds.
const CONSTS_LEN: usize = 107;

/// Covenant parameters for a partially fillable offer.
///
/// All integers that participate in script arithmetic
/// (`trunc_tokens × token_scale_factor`, `scaled_trunc_tokens_per_trunc_sat`,
/// `min_accepted_scaled_trunc_tokens`) fit the ledger's signed script
/// integer width; [`approx`] is responsible for producing values that do.
///
/// A partial acceptance never mutates this value: the accept path constructs
/// a fresh `AgoraPartial` for the remainder, mirroring the replacement of
/// the covenant UTXO on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgoraPartial {
    /// Offered quantity with `num_token_trunc_bytes` low bytes discarded.
    pub trunc_tokens: u64,
    /// Low-order bytes truncated from token quantities.
    pub num_token_trunc_bytes: u8,
    /// Precision multiplier applied to truncated token quantities.
    pub token_scale_factor: u64,
    /// The covenant's price integer: scaled truncated tokens bought per
    /// truncated satoshi paid.
    pub scaled_trunc_tokens_per_trunc_sat: u64,
    /// Low-order bytes truncated from satoshi amounts.
    pub num_sats_trunc_bytes: u8,
    /// Minimum acceptance threshold, scaled and truncated.
    pub min_accepted_scaled_trunc_tokens: u64,
    /// Maker key: payment destination and cancel authority.
    pub maker_pk: PubKey,
    pub token_id: TokenId,
    pub token_type: u8,
    pub token_protocol: TokenProtocol,
    /// Lock-time floor enforced on every accepting transaction; randomized
    /// per listing so near-identical offers get distinct script hashes.
    pub enforced_locktime: u32,
    pub dust_sats: u64,
    /// Serialized length of [`Self::script`], tracked externally because the
    /// accept path splices the redeem script out of the signature preimage
    /// and needs its own length as a constant.
    pub script_len: u16,
}

impl AgoraPartial {
    /// One truncation unit of token quantity (`256^num_token_trunc_bytes`).
    pub fn token_trunc_unit(&self) -> u64 {
        1u64 << (8 * self.num_token_trunc_bytes as u32)
    }

    /// One truncation unit of satoshi amount.
    pub fn sats_trunc_unit(&self) -> u64 {
        1u64 << (8 * self.num_sats_trunc_bytes as u32)
    }

    /// The quantity actually offered for sale, in base token units.
    pub fn offered_tokens(&self) -> u64 {
        self.trunc_tokens << (8 * self.num_token_trunc_bytes as u32)
    }

    /// Minimum quantity a taker may accept, in base token units.
    pub fn min_accepted_tokens(&self) -> u64 {
        let scaled = self.min_accepted_scaled_trunc_tokens as u128;
        let unit = self.token_trunc_unit() as u128;
        let scale = self.token_scale_factor as u128;
        ((scaled * unit).div_ceil(scale)) as u64
    }

    /// Round `tokens` down to a whole number of truncation units. Idempotent.
    pub fn prepare_accepted_tokens(&self, tokens: u64) -> u64 {
        let bits = 8 * self.num_token_trunc_bytes as u32;
        (tokens >> bits) << bits
    }

    /// The scaled truncated witness value for an accepted quantity.
    pub fn accepted_scaled(&self, accepted_tokens: u64) -> Result<u64> {
        let bits = 8 * self.num_token_trunc_bytes as u32;
        let trunc = accepted_tokens >> bits;
        if trunc << bits != accepted_tokens {
            return Err(Error::NotTruncationMultiple(
                accepted_tokens,
                self.token_trunc_unit(),
            ));
        }
        trunc
            .checked_mul(self.token_scale_factor)
            .ok_or(Error::ScriptIntegerOverflow(accepted_tokens as i128))
    }

    /// Satoshis the maker must be paid for `accepted_tokens`.
    ///
    /// Mirrors the covenant's own arithmetic exactly: ceiling division by
    /// the price integer, then satoshi un-truncation.
    pub fn asked_sats(&self, accepted_tokens: u64) -> Result<u64> {
        let scaled = self.accepted_scaled(accepted_tokens)? as u128;
        let price = self.scaled_trunc_tokens_per_trunc_sat as u128;
        let asked_trunc_sats = scaled.div_ceil(price);
        let asked = asked_trunc_sats << (8 * self.num_sats_trunc_bytes as u32);
        u64::try_from(asked).map_err(|_| Error::ScriptIntegerOverflow(asked as i128))
    }

    /// Effective price in nano-satoshis per base token unit at a given
    /// acceptance level (defaults to the full offer).
    pub fn price_nano_sats_per_token(&self, accepted_tokens: Option<u64>) -> Result<u128> {
        let accepted = accepted_tokens.unwrap_or_else(|| self.offered_tokens());
        if accepted == 0 {
            return Err(Error::ZeroMinAccepted);
        }
        let asked = self.asked_sats(accepted)? as u128;
        Ok(asked * NANO_SATS_PER_SAT / accepted as u128)
    }

    /// Covenant parameters for the remainder left after accepting
    /// `accepted_tokens`, or `None` for a full fill. The price integer is
    /// carried over unchanged: a partial fill shrinks quantity, never moves
    /// the price.
    pub fn remainder_after(&self, accepted_tokens: u64) -> Result<Option<AgoraPartial>> {
        let bits = 8 * self.num_token_trunc_bytes as u32;
        let accepted_trunc = accepted_tokens >> bits;
        if accepted_trunc << bits != accepted_tokens {
            return Err(Error::NotTruncationMultiple(
                accepted_tokens,
                self.token_trunc_unit(),
            ));
        }
        if accepted_trunc > self.trunc_tokens {
            return Err(Error::AcceptedQuantityOutOfRange {
                accepted: accepted_tokens,
                min: self.min_accepted_tokens(),
                max: self.offered_tokens(),
            });
        }
        if accepted_trunc == self.trunc_tokens {
            return Ok(None);
        }
        let mut remainder = self.clone();
        remainder.trunc_tokens = self.trunc_tokens - accepted_trunc;
        Ok(Some(remainder))
    }

    /// The fixed-width parameter block embedded in the redeem script and
    /// mirrored by the indexer's plugin metadata. [`Self::from_consts`]
    /// decodes the same bytes.
    pub fn covenant_consts(&self) -> Vec<u8> {
        let mut consts = Vec::with_capacity(CONSTS_LEN);
        consts.push(CONSTS_VERSION);
        consts.push(self.token_protocol.to_tag());
        consts.push(self.token_type);
        consts.extend_from_slice(&self.token_id.0);
        consts.extend_from_slice(self.maker_pk.as_bytes());
        consts.push(self.num_token_trunc_bytes);
        consts.push(self.num_sats_trunc_bytes);
        consts.extend_from_slice(&self.token_scale_factor.to_le_bytes());
        consts.extend_from_slice(&self.scaled_trunc_tokens_per_trunc_sat.to_le_bytes());
        consts.extend_from_slice(&self.min_accepted_scaled_trunc_tokens.to_le_bytes());
        consts.extend_from_slice(&self.enforced_locktime.to_le_bytes());
        consts.extend_from_slice(&self.dust_sats.to_le_bytes());
        consts.extend_from_slice(&self.script_len.to_le_bytes());
        debug_assert_eq!(consts.len(), CONSTS_LEN);
        consts
    }

    /// Rebuild covenant parameters from a constants blob plus the truncated
    /// quantity (recovered from the UTXO's indexed token balance).
    pub fn from_consts(consts: &[u8], trunc_tokens: u64) -> Result<Self> {
        let mut reader = ByteReader::new(consts);
        let version = reader.read_u8()?;
        if version != CONSTS_VERSION {
            return Err(Error::MalformedConsts(format!(
                "unknown constants version {version}"
            )));
        }
        let token_protocol = TokenProtocol::from_tag(reader.read_u8()?)?;
        let token_type = reader.read_u8()?;
        let token_id = TokenId(reader.read_array::<32>()?);
        let maker_pk = PubKey(reader.read_array::<32>()?);
        let num_token_trunc_bytes = reader.read_u8()?;
        let num_sats_trunc_bytes = reader.read_u8()?;
        let token_scale_factor = reader.read_u64_le()?;
        let scaled_trunc_tokens_per_trunc_sat = reader.read_u64_le()?;
        let min_accepted_scaled_trunc_tokens = reader.read_u64_le()?;
        let enforced_locktime = reader.read_u32_le()?;
        let dust_sats = reader.read_u64_le()?;
        let script_len = reader.read_u16_le()?;
        if !reader.is_empty() {
            return Err(Error::MalformedConsts("trailing constants bytes".into()));
        }
        if token_scale_factor == 0 || scaled_trunc_tokens_per_trunc_sat == 0 {
            return Err(Error::MalformedConsts("zero covenant factor".into()));
        }
        // Untrusted byte counts feed shift amounts downstream.
        if num_token_trunc_bytes > 7 || num_sats_trunc_bytes > 7 {
            return Err(Error::MalformedConsts(format!(
                "absurd truncation byte counts {num_token_trunc_bytes}/{num_sats_trunc_bytes}"
            )));
        }
        Ok(AgoraPartial {
            trunc_tokens,
            num_token_trunc_bytes,
            token_scale_factor,
            scaled_trunc_tokens_per_trunc_sat,
            num_sats_trunc_bytes,
            min_accepted_scaled_trunc_tokens,
            maker_pk,
            token_id,
            token_type,
            token_protocol,
            enforced_locktime,
            dust_sats,
            script_len,
        })
    }

    /// Derive the redeem script. Deterministic for identical parameters, so
    /// any party can reproduce the locking-script hash from on-chain
    /// metadata.
    pub fn script(&self) -> Script {
        let mut s = Script::new();
        // State push: the quantity still for sale, fixed-width so the accept
        // path can splice a reduced value in at a constant offset when it
        // recreates the covenant for the remainder.
        s.push_slice(&self.trunc_tokens.to_le_bytes());
        s.push_slice(&self.covenant_consts());

        s.push_op(opcode::OP_IF);
        // ── accept ──────────────────────────────────────────────────────
        // Unlocking pushes: [sig, pk, preimage, accepted_scaled, 1].
        // Park the quantity witness; it must arrive pre-truncated and
        // pre-scaled.
        s.push_op(opcode::OP_DUP).push_op(opcode::OP_TOALTSTACK);
        // min_accepted <= accepted_scaled <= trunc_tokens * scale; the upper
        // bound reads the state push so the remainder script differs only in
        // that push
        s.push_int(self.min_accepted_scaled_trunc_tokens as i64);
        s.push_op(opcode::OP_ROT);
        s.push_op(opcode::OP_BIN2NUM);
        s.push_int(self.token_scale_factor as i64);
        s.push_op(opcode::OP_MUL);
        s.push_op(opcode::OP_1ADD);
        s.push_op(opcode::OP_WITHIN);
        s.push_op(opcode::OP_VERIFY);
        // asked_trunc_sats = ceil(accepted_scaled / price_integer)
        s.push_op(opcode::OP_FROMALTSTACK).push_op(opcode::OP_DUP);
        s.push_op(opcode::OP_TOALTSTACK);
        s.push_int(self.scaled_trunc_tokens_per_trunc_sat as i64);
        s.push_op(opcode::OP_1SUB).push_op(opcode::OP_ADD);
        s.push_int(self.scaled_trunc_tokens_per_trunc_sat as i64);
        s.push_op(opcode::OP_DIV);
        // un-truncate into the 8-byte little-endian output amount: zero low
        // bytes first, then the truncated value
        s.push_int(8 - self.num_sats_trunc_bytes as i64);
        s.push_op(opcode::OP_NUM2BIN);
        if self.num_sats_trunc_bytes > 0 {
            s.push_slice(&vec![0u8; self.num_sats_trunc_bytes as usize]);
            s.push_op(opcode::OP_SWAP).push_op(opcode::OP_CAT);
        }
        // expected maker payment output: value || p2pkh(maker_pk)
        let maker_script = self.maker_pk.p2pkh_script();
        let mut maker_tail = vec![maker_script.len() as u8];
        maker_tail.extend_from_slice(maker_script.bytecode());
        s.push_slice(&maker_tail);
        s.push_op(opcode::OP_CAT);
        s.push_op(opcode::OP_TOALTSTACK);
        // dissect the preimage: outputs commitment sits 40 bytes from the
        // end (hash_outputs || locktime || sighash flags)
        s.push_op(opcode::OP_DUP).push_op(opcode::OP_SIZE);
        s.push_int(40).push_op(opcode::OP_SUB);
        s.push_op(opcode::OP_SPLIT).push_op(opcode::OP_NIP);
        s.push_int(32).push_op(opcode::OP_SPLIT).push_op(opcode::OP_DROP);
        // the remainder covenant, when present, is this same script with the
        // state push replaced; slice our own tail out of the script code
        s.push_int(9).push_op(opcode::OP_SPLIT).push_op(opcode::OP_NIP);
        s.push_int(self.script_len as i64 - 9);
        s.push_op(opcode::OP_SPLIT).push_op(opcode::OP_DROP);
        s.push_op(opcode::OP_FROMALTSTACK).push_op(opcode::OP_SWAP);
        s.push_op(opcode::OP_CAT).push_op(opcode::OP_HASH256);
        s.push_op(opcode::OP_EQUALVERIFY);
        // replay fence: every accept commits to this listing's lock-time
        s.push_int(self.enforced_locktime as i64);
        s.push_op(opcode::OP_CHECKLOCKTIMEVERIFY).push_op(opcode::OP_DROP);
        s.push_op(opcode::OP_FROMALTSTACK).push_op(opcode::OP_DROP);
        // the signature binds the pushed preimage to the transaction
        s.push_op(opcode::OP_CHECKSIG);
        s.push_op(opcode::OP_ELSE);
        // ── cancel ──────────────────────────────────────────────────────
        s.push_slice(self.maker_pk.as_bytes());
        s.push_op(opcode::OP_CHECKSIG);
        s.push_op(opcode::OP_ENDIF);
        s
    }

    /// Measure the script and store its length, rebuilding until stable.
    /// The length appears inside the script as a pushed integer whose
    /// encoding can widen once, so a couple of rebuilds may be needed.
    pub fn update_script_len(&mut self) {
        for _ in 0..4 {
            let measured = self.script().len() as u16;
            if measured == self.script_len {
                return;
            }
            self.script_len = measured;
        }
    }

    /// The P2SH locking script guarding the offer UTXO.
    pub fn script_pubkey(&self) -> Script {
        Script::p2sh_of(&self.script())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AgoraPartial {
        let mut partial = AgoraPartial {
            trunc_tokens: 1000,
            num_token_trunc_bytes: 0,
            token_scale_factor: 1_073_741,
            scaled_trunc_tokens_per_trunc_sat: 1_073_741,
            num_sats_trunc_bytes: 0,
            min_accepted_scaled_trunc_tokens: 1_073_741,
            maker_pk: PubKey([0xaa; 32]),
            token_id: TokenId([0xcd; 32]),
            token_type: 1,
            token_protocol: TokenProtocol::Slp,
            enforced_locktime: 1_234_567_890,
            dust_sats: 546,
            script_len: 0,
        };
        partial.update_script_len();
        partial
    }

    #[test]
    fn params_serde_roundtrip() {
        let partial = sample();
        let json = serde_json::to_string(&partial).unwrap();
        let parsed: AgoraPartial = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, partial);
    }

    #[test]
    fn consts_roundtrip() {
        let partial = sample();
        let decoded =
            AgoraPartial::from_consts(&partial.covenant_consts(), partial.trunc_tokens).unwrap();
        assert_eq!(decoded, partial);
    }

    #[test]
    fn script_len_is_stable() {
        let partial = sample();
        assert_eq!(partial.script().len(), partial.script_len as usize);
        let mut again = partial.clone();
        again.update_script_len();
        assert_eq!(again.script_len, partial.script_len);
    }

    #[test]
    fn script_is_deterministic() {
        let partial = sample();
        assert_eq!(partial.script(), partial.script());
        assert_eq!(partial.script_pubkey(), partial.script_pubkey());
    }

    #[test]
    fn state_push_prefix_is_fixed_width() {
        let partial = sample();
        let mut reduced = partial.clone();
        reduced.trunc_tokens = 1;
        let a = partial.script();
        let b = reduced.script();
        assert_eq!(a.len(), b.len());
        // everything after the 9-byte state push is identical
        assert_eq!(a.bytecode()[9..], b.bytecode()[9..]);
    }

    #[test]
    fn prepare_accepted_tokens_idempotent() {
        let mut partial = sample();
        partial.num_token_trunc_bytes = 2;
        let once = partial.prepare_accepted_tokens(0x12345678);
        assert_eq!(partial.prepare_accepted_tokens(once), once);
        assert_eq!(once, 0x12340000);
    }

    #[test]
    fn asked_sats_requires_truncation_multiple() {
        let mut partial = sample();
        partial.num_token_trunc_bytes = 1;
        assert!(matches!(
            partial.asked_sats(257),
            Err(Error::NotTruncationMultiple(257, 256))
        ));
        assert!(partial.asked_sats(512).is_ok());
    }

    #[test]
    fn remainder_preserves_price_integer() {
        let partial = sample();
        let remainder = partial.remainder_after(500).unwrap().unwrap();
        assert_eq!(remainder.trunc_tokens, 500);
        assert_eq!(
            remainder.scaled_trunc_tokens_per_trunc_sat,
            partial.scaled_trunc_tokens_per_trunc_sat
        );
        assert_eq!(remainder.token_scale_factor, partial.token_scale_factor);
        assert!(partial.remainder_after(1000).unwrap().is_none());
    }
}

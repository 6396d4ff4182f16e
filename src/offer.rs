//! The offer value object and its accept/cancel transaction builders.
//!
//! An [`AgoraOffer`] is a read-only snapshot of one on-chain offer UTXO.
//! Acceptance and cancellation build fully signed transactions mirroring the
//! covenant's enforced invariants exactly; a mismatch between builder and
//! script would make offers unspendable or exploitable, so the output
//! layout here is the single source of truth for both.
//!
//! Accept output order (Partial):
//! ```text
//! [0] token send envelope
//! [1] maker payment (asked sats to the maker's key hash)
//! [2] remainder covenant (only when under-filled)
//! [2]/[3] taker token output
//! ```

use crate::error::{Error, Result};
use crate::hash::sha256d;
use crate::oneshot::AgoraOneshot;
use crate::partial::{AgoraPartial, DEFAULT_DUST_SATS};
use crate::script::Script;
use crate::sighash::{
    SIGHASH_ALL, SIGHASH_ANYONECANPAY, SIGHASH_FORKID, sighash, sighash_preimage,
};
use crate::sign::{
    PubKey, check_key_matches, placeholder_pubkey, placeholder_sig_flagged, pubkey,
    sign_digest_flagged,
};
use crate::token::{TokenId, TokenProtocol, send_envelope};
use crate::tx::{
    OutPoint, SEQUENCE_FINAL, SEQUENCE_WITH_LOCKTIME, Tx, TxInput, TxOutput, serialize_outputs,
};

/// Default relay fee rate, satoshis per 1000 bytes.
pub const DEFAULT_FEE_PER_KB: u64 = 1000;

/// Output index where a remainder covenant is recreated on partial accepts.
pub const OFFER_OUTPUT_IDX: usize = 2;
/// Output index of the maker payment on accepts.
pub const MAKER_PAYMENT_IDX: usize = 1;

/// The two covenant variants. Closed set: every consumption site matches
/// exhaustively, so adding a variant is a compile-visible change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgoraVariant {
    Oneshot(AgoraOneshot),
    Partial(AgoraPartial),
}

impl AgoraVariant {
    pub fn redeem_script(&self) -> Script {
        match self {
            AgoraVariant::Oneshot(oneshot) => oneshot.script(),
            AgoraVariant::Partial(partial) => partial.script(),
        }
    }

    pub fn script_pubkey(&self) -> Script {
        match self {
            AgoraVariant::Oneshot(oneshot) => oneshot.script_pubkey(),
            AgoraVariant::Partial(partial) => partial.script_pubkey(),
        }
    }

    /// The key authorized to cancel the offer.
    pub fn cancel_pk(&self) -> &PubKey {
        match self {
            AgoraVariant::Oneshot(oneshot) => &oneshot.cancel_pk,
            AgoraVariant::Partial(partial) => &partial.maker_pk,
        }
    }

    pub fn token_id(&self) -> &TokenId {
        match self {
            AgoraVariant::Oneshot(oneshot) => &oneshot.token_id,
            AgoraVariant::Partial(partial) => &partial.token_id,
        }
    }

    pub fn token_protocol(&self) -> TokenProtocol {
        match self {
            AgoraVariant::Oneshot(oneshot) => oneshot.token_protocol,
            AgoraVariant::Partial(partial) => partial.token_protocol,
        }
    }

    pub fn token_type(&self) -> u8 {
        match self {
            AgoraVariant::Oneshot(oneshot) => oneshot.token_type,
            AgoraVariant::Partial(partial) => partial.token_type,
        }
    }

    pub fn dust_sats(&self) -> u64 {
        match self {
            AgoraVariant::Oneshot(_) => DEFAULT_DUST_SATS,
            AgoraVariant::Partial(partial) => partial.dust_sats,
        }
    }
}

/// Details of a taken offer, reconstructed from history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakenInfo {
    pub sats_paid: u64,
    pub tokens_purchased: u64,
    pub taker_script: Script,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferStatus {
    Open,
    Taken(TakenInfo),
    Canceled,
}

/// One on-chain offer: variant parameters, the UTXO backing it, the token
/// balance that UTXO holds, and its lifecycle status.
///
/// Offers are immutable snapshots. Accepting or cancelling never mutates
/// this value; the resulting chain state is a different UTXO and, for
/// partial fills, a different offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgoraOffer {
    pub variant: AgoraVariant,
    pub outpoint: OutPoint,
    /// Satoshi value of the offer UTXO (signing needs it).
    pub utxo_sats: u64,
    /// Token balance held by the offer UTXO, in base units.
    pub token_amount: u64,
    pub status: OfferStatus,
}

/// A fee-only UTXO plus the key that can spend it. Fuel inputs cover the
/// asking price and the transaction fee; they never carry tokens.
#[derive(Clone)]
pub struct FuelInput {
    pub outpoint: OutPoint,
    pub sats: u64,
    /// The UTXO's locking script (P2PKH).
    pub script: Script,
    pub sec_key: [u8; 32],
}

impl std::fmt::Debug for FuelInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuelInput")
            .field("outpoint", &self.outpoint)
            .field("sats", &self.sats)
            .finish_non_exhaustive()
    }
}

pub struct AcceptParams<'a> {
    /// Key pair authorizing the covenant input's signature.
    pub covenant_sk: [u8; 32],
    pub fuel_inputs: &'a [FuelInput],
    /// Where the taker receives the purchased tokens.
    pub recipient_script: Script,
    /// Quantity to accept; defaults to the full offer. Must be a whole
    /// multiple of the truncation unit; round with
    /// [`AgoraOffer::prepare_accepted_tokens`] first.
    pub accepted_tokens: Option<u64>,
    /// Permit an accept that leaves a remainder below the offer's
    /// minimum-acceptance floor (which nobody will ever be able to take).
    pub allow_unspendable_remainder: bool,
}

pub struct CancelParams<'a> {
    /// The maker's cancel key.
    pub maker_sk: [u8; 32],
    pub fuel_inputs: &'a [FuelInput],
    /// Where the returned tokens go.
    pub recipient_script: Script,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SignMode {
    /// Produce real signatures.
    Sign,
    /// Produce zero-filled signatures of identical size; the result is
    /// unbroadcastable but measures exactly like the signed transaction.
    Measure,
}

impl AgoraOffer {
    /// Satoshis a taker must pay for `accepted_tokens` (default: the whole
    /// offer).
    pub fn asked_sats(&self, accepted_tokens: Option<u64>) -> Result<u64> {
        match &self.variant {
            AgoraVariant::Oneshot(oneshot) => Ok(oneshot.asked_sats()),
            AgoraVariant::Partial(partial) => {
                partial.asked_sats(accepted_tokens.unwrap_or(self.token_amount))
            }
        }
    }

    /// Round an acceptance quantity down to something [`Self::asked_sats`]
    /// and [`Self::accept_tx`] will take. Idempotent.
    pub fn prepare_accepted_tokens(&self, tokens: u64) -> u64 {
        match &self.variant {
            AgoraVariant::Oneshot(_) => tokens,
            AgoraVariant::Partial(partial) => partial.prepare_accepted_tokens(tokens),
        }
    }

    /// Build the fully signed accepting transaction.
    pub fn accept_tx(&self, params: &AcceptParams) -> Result<Tx> {
        self.build_accept(params, SignMode::Sign)
    }

    /// Exact fee for an accept of this shape at `fee_per_kb`, measured on a
    /// placeholder-signed build. The fee depends on the input set, which is
    /// what callers are choosing based on this fee; see
    /// [`crate::select::select_fuel_inputs`] for the resolution.
    pub fn accept_fee_sats(
        &self,
        recipient_script: &Script,
        extra_inputs: &[FuelInput],
        fee_per_kb: Option<u64>,
        accepted_tokens: Option<u64>,
    ) -> Result<u64> {
        let params = AcceptParams {
            covenant_sk: [0; 32],
            fuel_inputs: extra_inputs,
            recipient_script: recipient_script.clone(),
            accepted_tokens,
            allow_unspendable_remainder: true,
        };
        let tx = self.build_accept(&params, SignMode::Measure)?;
        Ok(fee_for_size(tx.serialized_size(), fee_per_kb))
    }

    /// Total satoshis the fuel inputs must provide for an accept: outputs
    /// plus fee, minus what the offer UTXO itself contributes.
    pub fn accept_required_fuel_sats(
        &self,
        recipient_script: &Script,
        fuel_inputs: &[FuelInput],
        fee_per_kb: Option<u64>,
        accepted_tokens: Option<u64>,
    ) -> Result<u64> {
        let params = AcceptParams {
            covenant_sk: [0; 32],
            fuel_inputs,
            recipient_script: recipient_script.clone(),
            accepted_tokens,
            allow_unspendable_remainder: true,
        };
        let tx = self.build_accept(&params, SignMode::Measure)?;
        let fee = fee_for_size(tx.serialized_size(), fee_per_kb);
        let outputs_total: u64 = tx.outputs.iter().map(|o| o.sats).sum();
        Ok((outputs_total + fee).saturating_sub(self.utxo_sats))
    }

    /// Build the fully signed cancelling transaction, returning the whole
    /// token balance to `recipient_script`.
    pub fn cancel_tx(&self, params: &CancelParams) -> Result<Tx> {
        self.build_cancel(params, SignMode::Sign)
    }

    /// Exact fee for a cancel of this shape; placeholder-signed like
    /// [`Self::accept_fee_sats`].
    pub fn cancel_fee_sats(
        &self,
        recipient_script: &Script,
        extra_inputs: &[FuelInput],
        fee_per_kb: Option<u64>,
    ) -> Result<u64> {
        let params = CancelParams {
            maker_sk: [0; 32],
            fuel_inputs: extra_inputs,
            recipient_script: recipient_script.clone(),
        };
        let tx = self.build_cancel(&params, SignMode::Measure)?;
        Ok(fee_for_size(tx.serialized_size(), fee_per_kb))
    }

    /// Fuel requirement for a cancel: the dust output plus fee, minus the
    /// offer UTXO's own value.
    pub fn cancel_required_fuel_sats(
        &self,
        recipient_script: &Script,
        fuel_inputs: &[FuelInput],
        fee_per_kb: Option<u64>,
    ) -> Result<u64> {
        let params = CancelParams {
            maker_sk: [0; 32],
            fuel_inputs,
            recipient_script: recipient_script.clone(),
        };
        let tx = self.build_cancel(&params, SignMode::Measure)?;
        let fee = fee_for_size(tx.serialized_size(), fee_per_kb);
        let outputs_total: u64 = tx.outputs.iter().map(|o| o.sats).sum();
        Ok((outputs_total + fee).saturating_sub(self.utxo_sats))
    }

    fn build_accept(&self, params: &AcceptParams, mode: SignMode) -> Result<Tx> {
        match &self.variant {
            AgoraVariant::Partial(partial) => self.build_accept_partial(partial, params, mode),
            AgoraVariant::Oneshot(oneshot) => self.build_accept_oneshot(oneshot, params, mode),
        }
    }

    fn build_accept_partial(
        &self,
        partial: &AgoraPartial,
        params: &AcceptParams,
        mode: SignMode,
    ) -> Result<Tx> {
        let accepted = params.accepted_tokens.unwrap_or(self.token_amount);
        let accepted_scaled = partial.accepted_scaled(accepted)?;
        let min_accepted = partial.min_accepted_tokens();
        let offered = partial.offered_tokens();
        if accepted < min_accepted || accepted > offered {
            return Err(Error::AcceptedQuantityOutOfRange {
                accepted,
                min: min_accepted,
                max: offered,
            });
        }
        let remainder = partial.remainder_after(accepted)?;
        if let Some(rem) = &remainder
            && rem.offered_tokens() < min_accepted
            && !params.allow_unspendable_remainder
        {
            return Err(Error::UnspendableRemainder {
                remaining: rem.offered_tokens(),
                min_accepted,
            });
        }

        let mut send_amounts = vec![0u64];
        if let Some(rem) = &remainder {
            send_amounts.push(rem.offered_tokens());
        }
        send_amounts.push(accepted);
        let envelope = send_envelope(
            partial.token_protocol,
            partial.token_type,
            &partial.token_id,
            &send_amounts,
        )?;

        let mut outputs = vec![
            TxOutput {
                sats: 0,
                script: envelope,
            },
            TxOutput {
                sats: partial.asked_sats(accepted)?,
                script: partial.maker_pk.p2pkh_script(),
            },
        ];
        if let Some(rem) = &remainder {
            outputs.push(TxOutput {
                sats: partial.dust_sats,
                script: rem.script_pubkey(),
            });
        }
        outputs.push(TxOutput {
            sats: partial.dust_sats,
            script: params.recipient_script.clone(),
        });

        // The covenant checks the lock-time floor, so every input must keep
        // lock-time enforcement enabled.
        let mut tx = self.tx_skeleton(
            params.fuel_inputs,
            outputs,
            partial.enforced_locktime,
            SEQUENCE_WITH_LOCKTIME,
        );

        let redeem = partial.script();
        let flags = SIGHASH_ALL | SIGHASH_FORKID | SIGHASH_ANYONECANPAY;
        let preimage = sighash_preimage(&tx, 0, &redeem, self.utxo_sats, flags);
        let (sig, pk) = covenant_sig(&params.covenant_sk, &preimage, flags, mode)?;
        let mut script_sig = Script::new();
        script_sig
            .push_slice(&sig)
            .push_slice(pk.as_bytes())
            .push_slice(&preimage)
            .push_int(accepted_scaled as i64)
            .push_slice(&[0x01])
            .push_slice(redeem.bytecode());
        tx.inputs[0].script_sig = script_sig;

        sign_fuel_inputs(&mut tx, params.fuel_inputs, mode)?;
        Ok(tx)
    }

    fn build_accept_oneshot(
        &self,
        oneshot: &AgoraOneshot,
        params: &AcceptParams,
        mode: SignMode,
    ) -> Result<Tx> {
        if let Some(accepted) = params.accepted_tokens
            && accepted != self.token_amount
        {
            return Err(Error::AcceptedQuantityOutOfRange {
                accepted,
                min: self.token_amount,
                max: self.token_amount,
            });
        }

        let taker_outputs = vec![TxOutput {
            sats: self.variant.dust_sats(),
            script: params.recipient_script.clone(),
        }];
        let mut outputs = oneshot.enforced_outputs.clone();
        outputs.extend(taker_outputs.iter().cloned());

        let mut tx = self.tx_skeleton(params.fuel_inputs, outputs, 0, SEQUENCE_FINAL);

        let redeem = oneshot.script();
        let flags = SIGHASH_ALL | SIGHASH_FORKID | SIGHASH_ANYONECANPAY;
        let preimage = sighash_preimage(&tx, 0, &redeem, self.utxo_sats, flags);
        let (sig, pk) = covenant_sig(&params.covenant_sk, &preimage, flags, mode)?;
        let mut script_sig = Script::new();
        script_sig
            .push_slice(&sig)
            .push_slice(pk.as_bytes())
            .push_slice(&serialize_outputs(&taker_outputs))
            .push_slice(&[0x01])
            .push_slice(redeem.bytecode());
        tx.inputs[0].script_sig = script_sig;

        sign_fuel_inputs(&mut tx, params.fuel_inputs, mode)?;
        Ok(tx)
    }

    fn build_cancel(&self, params: &CancelParams, mode: SignMode) -> Result<Tx> {
        let cancel_pk = self.variant.cancel_pk();
        if mode == SignMode::Sign {
            check_key_matches(&params.maker_sk, cancel_pk)?;
        }

        let envelope = send_envelope(
            self.variant.token_protocol(),
            self.variant.token_type(),
            self.variant.token_id(),
            &[self.token_amount],
        )?;
        let outputs = vec![
            TxOutput {
                sats: 0,
                script: envelope,
            },
            TxOutput {
                sats: self.variant.dust_sats(),
                script: params.recipient_script.clone(),
            },
        ];

        let mut tx = self.tx_skeleton(params.fuel_inputs, outputs, 0, SEQUENCE_FINAL);

        // Cancel is a plain key spend: whole-transaction sighash, no output
        // constraints.
        let redeem = self.variant.redeem_script();
        let flags = SIGHASH_ALL | SIGHASH_FORKID;
        let digest = sighash(&tx, 0, &redeem, self.utxo_sats, flags);
        let sig = match mode {
            SignMode::Sign => sign_digest_flagged(&params.maker_sk, digest, flags)?,
            SignMode::Measure => placeholder_sig_flagged(),
        };
        let mut script_sig = Script::new();
        script_sig
            .push_slice(&sig)
            .push_slice(&[])
            .push_slice(redeem.bytecode());
        tx.inputs[0].script_sig = script_sig;

        sign_fuel_inputs(&mut tx, params.fuel_inputs, mode)?;
        Ok(tx)
    }

    fn tx_skeleton(
        &self,
        fuel_inputs: &[FuelInput],
        outputs: Vec<TxOutput>,
        locktime: u32,
        sequence: u32,
    ) -> Tx {
        let mut inputs = Vec::with_capacity(1 + fuel_inputs.len());
        inputs.push(TxInput {
            prev_out: self.outpoint,
            script_sig: Script::new(),
            sequence,
        });
        for fuel in fuel_inputs {
            inputs.push(TxInput {
                prev_out: fuel.outpoint,
                script_sig: Script::new(),
                sequence,
            });
        }
        Tx {
            version: 2,
            inputs,
            outputs,
            locktime,
        }
    }
}

fn covenant_sig(
    covenant_sk: &[u8; 32],
    preimage: &[u8],
    flags: u32,
    mode: SignMode,
) -> Result<(Vec<u8>, PubKey)> {
    match mode {
        SignMode::Sign => Ok((
            sign_digest_flagged(covenant_sk, sha256d(preimage), flags)?,
            pubkey(covenant_sk)?,
        )),
        SignMode::Measure => Ok((placeholder_sig_flagged(), placeholder_pubkey())),
    }
}

/// Sign every fuel input (offset 1 onward) with its own key.
fn sign_fuel_inputs(tx: &mut Tx, fuel_inputs: &[FuelInput], mode: SignMode) -> Result<()> {
    let flags = SIGHASH_ALL | SIGHASH_FORKID;
    for (i, fuel) in fuel_inputs.iter().enumerate() {
        let input_idx = i + 1;
        let (sig, pk) = match mode {
            SignMode::Sign => {
                let digest = sighash(tx, input_idx, &fuel.script, fuel.sats, flags);
                (
                    sign_digest_flagged(&fuel.sec_key, digest, flags)?,
                    pubkey(&fuel.sec_key)?,
                )
            }
            SignMode::Measure => (placeholder_sig_flagged(), placeholder_pubkey()),
        };
        let mut script_sig = Script::new();
        script_sig.push_slice(&sig).push_slice(pk.as_bytes());
        tx.inputs[input_idx].script_sig = script_sig;
    }
    Ok(())
}

/// `ceil(size × rate / 1000)`.
pub fn fee_for_size(size: usize, fee_per_kb: Option<u64>) -> u64 {
    let rate = fee_per_kb.unwrap_or(DEFAULT_FEE_PER_KB);
    (size as u64 * rate).div_ceil(1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partial::OfferTerms;
    use crate::tx::TxId;

    const MAKER_SK: [u8; 32] = [0x42; 32];
    const COVENANT_SK: [u8; 32] = [0x43; 32];
    const FUEL_SK: [u8; 32] = [0x44; 32];

    fn partial_offer() -> AgoraOffer {
        let terms = OfferTerms {
            offered_tokens: 1000,
            price_nano_sats_per_token: 1_000_000_000,
            maker_pk: pubkey(&MAKER_SK).unwrap(),
            min_accepted_tokens: 10,
            token_id: TokenId([0xcd; 32]),
            token_type: 1,
            token_protocol: TokenProtocol::Slp,
            enforced_locktime: 1_234_567_890,
            dust_sats: None,
            min_scale_factor: None,
            min_price_integer: None,
            price_precision_ratio: None,
        };
        let partial = AgoraPartial::approximate(&terms).unwrap();
        AgoraOffer {
            outpoint: OutPoint::new(TxId([0x55; 32]), 1),
            utxo_sats: partial.dust_sats,
            token_amount: partial.offered_tokens(),
            variant: AgoraVariant::Partial(partial),
            status: OfferStatus::Open,
        }
    }

    fn fuel(sats: u64) -> FuelInput {
        FuelInput {
            outpoint: OutPoint::new(TxId([0x66; 32]), 0),
            sats,
            script: pubkey(&FUEL_SK).unwrap().p2pkh_script(),
            sec_key: FUEL_SK,
        }
    }

    fn taker_script() -> Script {
        pubkey(&[0x47; 32]).unwrap().p2pkh_script()
    }

    #[test]
    fn full_accept_output_order() {
        let offer = partial_offer();
        let fuels = [fuel(10_000)];
        let tx = offer
            .accept_tx(&AcceptParams {
                covenant_sk: COVENANT_SK,
                fuel_inputs: &fuels,
                recipient_script: taker_script(),
                accepted_tokens: None,
                allow_unspendable_remainder: false,
            })
            .unwrap();
        // full fill: envelope, maker payment, taker output, no remainder
        assert_eq!(tx.outputs.len(), 3);
        assert_eq!(tx.outputs[0].sats, 0);
        assert_eq!(tx.outputs[MAKER_PAYMENT_IDX].sats, 1000);
        assert_eq!(tx.outputs[2].script, taker_script());
        let AgoraVariant::Partial(partial) = &offer.variant else {
            unreachable!()
        };
        assert_eq!(tx.locktime, partial.enforced_locktime);
        assert_eq!(tx.inputs[0].sequence, SEQUENCE_WITH_LOCKTIME);
    }

    #[test]
    fn partial_accept_recreates_remainder() {
        let offer = partial_offer();
        let fuels = [fuel(10_000)];
        let tx = offer
            .accept_tx(&AcceptParams {
                covenant_sk: COVENANT_SK,
                fuel_inputs: &fuels,
                recipient_script: taker_script(),
                accepted_tokens: Some(500),
                allow_unspendable_remainder: false,
            })
            .unwrap();
        assert_eq!(tx.outputs.len(), 4);
        let AgoraVariant::Partial(partial) = &offer.variant else {
            unreachable!()
        };
        let remainder = partial.remainder_after(500).unwrap().unwrap();
        assert_eq!(
            tx.outputs[OFFER_OUTPUT_IDX].script,
            remainder.script_pubkey()
        );
        assert_eq!(tx.outputs[OFFER_OUTPUT_IDX].sats, partial.dust_sats);
        assert_eq!(tx.outputs[3].script, taker_script());
        assert_eq!(tx.outputs[MAKER_PAYMENT_IDX].sats, 500);
    }

    #[test]
    fn unspendable_remainder_guard() {
        let offer = partial_offer();
        let fuels = [fuel(10_000)];
        // accepting 995 leaves 5 < min_accepted 10
        let err = offer
            .accept_tx(&AcceptParams {
                covenant_sk: COVENANT_SK,
                fuel_inputs: &fuels,
                recipient_script: taker_script(),
                accepted_tokens: Some(995),
                allow_unspendable_remainder: false,
            })
            .unwrap_err();
        assert!(matches!(err, Error::UnspendableRemainder { remaining: 5, .. }));
        // explicit override builds anyway
        assert!(
            offer
                .accept_tx(&AcceptParams {
                    covenant_sk: COVENANT_SK,
                    fuel_inputs: &fuels,
                    recipient_script: taker_script(),
                    accepted_tokens: Some(995),
                    allow_unspendable_remainder: true,
                })
                .is_ok()
        );
    }

    #[test]
    fn accept_below_minimum_rejected() {
        let offer = partial_offer();
        let err = offer
            .accept_tx(&AcceptParams {
                covenant_sk: COVENANT_SK,
                fuel_inputs: &[],
                recipient_script: taker_script(),
                accepted_tokens: Some(5),
                allow_unspendable_remainder: false,
            })
            .unwrap_err();
        assert!(matches!(err, Error::AcceptedQuantityOutOfRange { .. }));
    }

    #[test]
    fn measured_size_matches_signed_size() {
        let offer = partial_offer();
        let fuels = [fuel(10_000), fuel(3_000)];
        let signed = offer
            .accept_tx(&AcceptParams {
                covenant_sk: COVENANT_SK,
                fuel_inputs: &fuels,
                recipient_script: taker_script(),
                accepted_tokens: Some(500),
                allow_unspendable_remainder: false,
            })
            .unwrap();
        let fee = offer
            .accept_fee_sats(&taker_script(), &fuels, None, Some(500))
            .unwrap();
        assert_eq!(fee, fee_for_size(signed.serialized_size(), None));

        let canceled = offer
            .cancel_tx(&CancelParams {
                maker_sk: MAKER_SK,
                fuel_inputs: &fuels,
                recipient_script: taker_script(),
            })
            .unwrap();
        let cancel_fee = offer.cancel_fee_sats(&taker_script(), &fuels, None).unwrap();
        assert_eq!(cancel_fee, fee_for_size(canceled.serialized_size(), None));
    }

    #[test]
    fn cancel_requires_maker_key() {
        let offer = partial_offer();
        let err = offer
            .cancel_tx(&CancelParams {
                maker_sk: COVENANT_SK,
                fuel_inputs: &[],
                recipient_script: taker_script(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::Signer(_)));
    }

    #[test]
    fn cancel_returns_full_balance() {
        let offer = partial_offer();
        let fuels = [fuel(5_000)];
        let tx = offer
            .cancel_tx(&CancelParams {
                maker_sk: MAKER_SK,
                fuel_inputs: &fuels,
                recipient_script: taker_script(),
            })
            .unwrap();
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].sats, 0);
        assert_eq!(tx.outputs[1].script, taker_script());
        assert_eq!(tx.locktime, 0);
        // cancel carries the is-accept flag as an empty push
        let pushes = tx.inputs[0].script_sig.pushes().unwrap();
        assert_eq!(pushes.len(), 3);
        assert!(pushes[1].is_empty());
    }

    #[test]
    fn accept_script_sig_layout() {
        let offer = partial_offer();
        let tx = offer
            .accept_tx(&AcceptParams {
                covenant_sk: COVENANT_SK,
                fuel_inputs: &[],
                recipient_script: taker_script(),
                accepted_tokens: Some(500),
                allow_unspendable_remainder: false,
            })
            .unwrap();
        let pushes = tx.inputs[0].script_sig.pushes().unwrap();
        assert_eq!(pushes.len(), 6);
        assert_eq!(pushes[0].len(), crate::sign::FLAGGED_SIG_LEN);
        assert_eq!(pushes[1].len(), 32);
        // flag, then the redeem script as the final push
        assert_eq!(pushes[4], vec![0x01]);
        let AgoraVariant::Partial(partial) = &offer.variant else {
            unreachable!()
        };
        assert_eq!(pushes[5], partial.script().bytecode());
    }
}

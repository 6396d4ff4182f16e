//! The Oneshot offer covenant: all-or-nothing listings, typically for
//! unique (non-fungible) items.
//!
//! The covenant pins an ordered list of enforced outputs. On accept, the
//! transaction's outputs must be exactly that list followed by whatever the
//! taker appends; the script rebuilds the expected output commitment from
//! the enforced bytes plus the taker-supplied tail and checks it against
//! the hash the signature preimage commits to, so the outputs are enforced
//! without being spelled out in the unlocking script.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::script::{Script, opcode};
use crate::sign::PubKey;
use crate::token::{TokenId, TokenProtocol};
use crate::tx::{TxOutput, parse_outputs, serialize_outputs};

/// Covenant parameters for an all-or-nothing offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgoraOneshot {
    /// Outputs every accepting transaction must start with, in order.
    /// Includes the token envelope and the maker's payment.
    pub enforced_outputs: Vec<TxOutput>,
    /// Cancel authority (the maker's key).
    pub cancel_pk: PubKey,
    pub token_id: TokenId,
    pub token_type: u8,
    pub token_protocol: TokenProtocol,
}

impl AgoraOneshot {
    /// The fixed asking price: the satoshi total of the enforced outputs.
    pub fn asked_sats(&self) -> u64 {
        self.enforced_outputs.iter().map(|o| o.sats).sum()
    }

    /// The enforced outputs in commitment form (count-less serialization).
    pub fn serialized_enforced_outputs(&self) -> Vec<u8> {
        serialize_outputs(&self.enforced_outputs)
    }

    /// Token metadata block carried in the indexer's plugin data.
    pub fn token_meta(&self) -> Vec<u8> {
        let mut meta = Vec::with_capacity(34);
        meta.push(self.token_protocol.to_tag());
        meta.push(self.token_type);
        meta.extend_from_slice(&self.token_id.0);
        meta
    }

    /// Rebuild from plugin metadata fields.
    pub fn from_plugin_fields(
        cancel_pk: &[u8],
        token_meta: &[u8],
        enforced_outputs_ser: &[u8],
    ) -> Result<Self> {
        let cancel_pk = PubKey(
            cancel_pk
                .try_into()
                .map_err(|_| Error::MalformedConsts("cancel key must be 32 bytes".into()))?,
        );
        if token_meta.len() != 34 {
            return Err(Error::MalformedConsts(format!(
                "token metadata must be 34 bytes, got {}",
                token_meta.len()
            )));
        }
        let token_protocol = TokenProtocol::from_tag(token_meta[0])?;
        let token_type = token_meta[1];
        let mut token_id = [0u8; 32];
        token_id.copy_from_slice(&token_meta[2..]);
        let enforced_outputs = parse_outputs(enforced_outputs_ser)?;
        if enforced_outputs.is_empty() {
            return Err(Error::MalformedConsts("no enforced outputs".into()));
        }
        Ok(AgoraOneshot {
            enforced_outputs,
            cancel_pk,
            token_id: TokenId(token_id),
            token_type,
            token_protocol,
        })
    }

    /// Derive the redeem script. Deterministic for identical parameters.
    pub fn script(&self) -> Script {
        let mut s = Script::new();
        s.push_slice(&self.token_meta());
        s.push_op(opcode::OP_DROP);
        s.push_op(opcode::OP_IF);
        // ── accept ──────────────────────────────────────────────────────
        // Unlocking pushes: [sig, pk, taker_outputs_ser, 1]. The expected
        // output commitment is the enforced outputs concatenated with the
        // taker's appended outputs; the signature (committing to the real
        // hash_outputs) fails closed on any mismatch.
        s.push_slice(&self.serialized_enforced_outputs());
        s.push_op(opcode::OP_SWAP);
        s.push_op(opcode::OP_CAT);
        s.push_op(opcode::OP_HASH256);
        s.push_op(opcode::OP_TOALTSTACK);
        s.push_op(opcode::OP_2DUP);
        s.push_op(opcode::OP_CHECKSIGVERIFY);
        s.push_op(opcode::OP_FROMALTSTACK);
        s.push_op(opcode::OP_EQUALVERIFY);
        s.push_op(opcode::OP_CHECKSIG);
        s.push_op(opcode::OP_ELSE);
        // ── cancel ──────────────────────────────────────────────────────
        s.push_slice(self.cancel_pk.as_bytes());
        s.push_op(opcode::OP_CHECKSIG);
        s.push_op(opcode::OP_ENDIF);
        s
    }

    /// The P2SH locking script guarding the offer UTXO.
    pub fn script_pubkey(&self) -> Script {
        Script::p2sh_of(&self.script())
    }
}

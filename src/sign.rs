//! Signing boundary: x-only Schnorr keys over secp256k1.
//!
//! Signatures are a fixed 64 bytes plus a one-byte sighash flag, which keeps
//! placeholder-signed transactions byte-identical in size to fully signed
//! ones; the fee estimator depends on this.

use secp256k1::{Keypair, Message, Secp256k1};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::hash160;
use crate::script::Script;

pub const SCHNORR_SIG_LEN: usize = 64;
/// Signature plus the trailing sighash-flag byte, as it appears on the wire.
pub const FLAGGED_SIG_LEN: usize = SCHNORR_SIG_LEN + 1;
pub const PUBKEY_LEN: usize = 32;

/// An x-only public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PubKey(pub [u8; PUBKEY_LEN]);

impl PubKey {
    pub fn as_bytes(&self) -> &[u8; PUBKEY_LEN] {
        &self.0
    }

    /// The pay-to-pubkey-hash locking script for this key.
    pub fn p2pkh_script(&self) -> Script {
        Script::p2pkh(&hash160(&self.0))
    }
}

impl std::fmt::Display for PubKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Derive the x-only public key for a secret key.
pub fn pubkey(sec_key: &[u8; 32]) -> Result<PubKey> {
    let secp = Secp256k1::new();
    let keypair = Keypair::from_seckey_slice(&secp, sec_key)?;
    let (xonly, _parity) = keypair.x_only_public_key();
    Ok(PubKey(xonly.serialize()))
}

/// Sign a 32-byte digest; deterministic (no auxiliary randomness).
pub fn sign_digest(sec_key: &[u8; 32], digest: [u8; 32]) -> Result<[u8; SCHNORR_SIG_LEN]> {
    let secp = Secp256k1::new();
    let keypair = Keypair::from_seckey_slice(&secp, sec_key)?;
    let msg = Message::from_digest(digest);
    let sig = secp.sign_schnorr_no_aux_rand(&msg, &keypair);
    Ok(sig.serialize())
}

/// Sign a digest and append the sighash flag byte.
pub fn sign_digest_flagged(
    sec_key: &[u8; 32],
    digest: [u8; 32],
    sighash_flags: u32,
) -> Result<Vec<u8>> {
    let mut flagged = sign_digest(sec_key, digest)?.to_vec();
    flagged.push(sighash_flags as u8);
    Ok(flagged)
}

/// All-zero signature of the correct wire length; used by the fee estimator's
/// non-verifying build.
pub fn placeholder_sig_flagged() -> Vec<u8> {
    vec![0u8; FLAGGED_SIG_LEN]
}

/// All-zero public key placeholder of the correct wire length.
pub fn placeholder_pubkey() -> PubKey {
    PubKey([0u8; PUBKEY_LEN])
}

/// Check that `sec_key` is the secret key for `expected`; the cancel builders
/// fail fast here instead of producing a transaction the network rejects.
pub fn check_key_matches(sec_key: &[u8; 32], expected: &PubKey) -> Result<()> {
    let derived = pubkey(sec_key)?;
    if derived != *expected {
        return Err(Error::Signer(format!(
            "secret key derives {derived}, expected {expected}"
        )));
    }
    Ok(())
}

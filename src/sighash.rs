//! Signature-hash preimage construction.
//!
//! The ledger uses the replay-protected preimage layout throughout (the
//! BIP143 descendant with a fork-id bit): per-input value commitment plus
//! aggregate prevout/sequence/output hashes. The covenant relies on this
//! layout: the Partial accept path pushes the whole preimage into the
//! unlocking script so the program can introspect the outputs it constrains.

use crate::hash::sha256d;
use crate::script::Script;
use crate::tx::Tx;

pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_NONE: u32 = 0x02;
pub const SIGHASH_SINGLE: u32 = 0x03;
pub const SIGHASH_FORKID: u32 = 0x40;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

const BASE_MASK: u32 = 0x1f;

/// Double-SHA-256 over every input's serialized prevout.
pub fn hash_prevouts(tx: &Tx) -> [u8; 32] {
    let mut data = Vec::with_capacity(36 * tx.inputs.len());
    for input in &tx.inputs {
        input.prev_out.write_to(&mut data);
    }
    sha256d(&data)
}

/// Double-SHA-256 over every input's sequence number.
pub fn hash_sequence(tx: &Tx) -> [u8; 32] {
    let mut data = Vec::with_capacity(4 * tx.inputs.len());
    for input in &tx.inputs {
        data.extend_from_slice(&input.sequence.to_le_bytes());
    }
    sha256d(&data)
}

/// Double-SHA-256 over every serialized output.
pub fn hash_outputs(tx: &Tx) -> [u8; 32] {
    let mut data = Vec::new();
    for output in &tx.outputs {
        output.write_to(&mut data);
    }
    sha256d(&data)
}

/// Build the signature-hash preimage for `input_idx`.
///
/// `script_code` is the locking script being satisfied (the redeem script
/// for P2SH inputs), `input_sats` the value of the spent output.
pub fn sighash_preimage(
    tx: &Tx,
    input_idx: usize,
    script_code: &Script,
    input_sats: u64,
    flags: u32,
) -> Vec<u8> {
    let input = &tx.inputs[input_idx];
    let anyone_can_pay = flags & SIGHASH_ANYONECANPAY != 0;
    let base = flags & BASE_MASK;

    let mut preimage = Vec::new();
    preimage.extend_from_slice(&tx.version.to_le_bytes());
    preimage.extend_from_slice(&if anyone_can_pay {
        [0u8; 32]
    } else {
        hash_prevouts(tx)
    });
    preimage.extend_from_slice(&if anyone_can_pay || base != SIGHASH_ALL {
        [0u8; 32]
    } else {
        hash_sequence(tx)
    });
    input.prev_out.write_to(&mut preimage);
    crate::ser::write_compact_size(&mut preimage, script_code.len() as u64);
    preimage.extend_from_slice(script_code.bytecode());
    preimage.extend_from_slice(&input_sats.to_le_bytes());
    preimage.extend_from_slice(&input.sequence.to_le_bytes());
    preimage.extend_from_slice(&match base {
        SIGHASH_NONE => [0u8; 32],
        SIGHASH_SINGLE => {
            if input_idx < tx.outputs.len() {
                let mut data = Vec::new();
                tx.outputs[input_idx].write_to(&mut data);
                sha256d(&data)
            } else {
                [0u8; 32]
            }
        }
        _ => hash_outputs(tx),
    });
    preimage.extend_from_slice(&tx.locktime.to_le_bytes());
    preimage.extend_from_slice(&flags.to_le_bytes());
    preimage
}

/// The digest actually signed: double-SHA-256 of the preimage.
pub fn sighash(
    tx: &Tx,
    input_idx: usize,
    script_code: &Script,
    input_sats: u64,
    flags: u32,
) -> [u8; 32] {
    sha256d(&sighash_preimage(tx, input_idx, script_code, input_sats, flags))
}

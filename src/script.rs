//! Script primitives for the ledger's BCH-lineage opcode set.
//!
//! Only what the covenant engine needs: minimal push-data encoding,
//! minimally-encoded script numbers, the P2SH/P2PKH templates, and a
//! push iterator for decoding unlocking scripts during history parsing.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::hash160;

pub mod opcode {
    pub const OP_0: u8 = 0x00;
    pub const OP_PUSHDATA1: u8 = 0x4c;
    pub const OP_PUSHDATA2: u8 = 0x4d;
    pub const OP_PUSHDATA4: u8 = 0x4e;
    pub const OP_1NEGATE: u8 = 0x4f;
    pub const OP_RESERVED: u8 = 0x50;
    pub const OP_1: u8 = 0x51;
    pub const OP_2: u8 = 0x52;
    pub const OP_3: u8 = 0x53;
    pub const OP_16: u8 = 0x60;

    pub const OP_NOP: u8 = 0x61;
    pub const OP_IF: u8 = 0x63;
    pub const OP_NOTIF: u8 = 0x64;
    pub const OP_ELSE: u8 = 0x67;
    pub const OP_ENDIF: u8 = 0x68;
    pub const OP_VERIFY: u8 = 0x69;
    pub const OP_RETURN: u8 = 0x6a;

    pub const OP_TOALTSTACK: u8 = 0x6b;
    pub const OP_FROMALTSTACK: u8 = 0x6c;
    pub const OP_2DUP: u8 = 0x6e;
    pub const OP_3DUP: u8 = 0x6f;
    pub const OP_DROP: u8 = 0x75;
    pub const OP_DUP: u8 = 0x76;
    pub const OP_NIP: u8 = 0x77;
    pub const OP_OVER: u8 = 0x78;
    pub const OP_PICK: u8 = 0x79;
    pub const OP_ROLL: u8 = 0x7a;
    pub const OP_ROT: u8 = 0x7b;
    pub const OP_SWAP: u8 = 0x7c;
    pub const OP_TUCK: u8 = 0x7d;

    pub const OP_CAT: u8 = 0x7e;
    pub const OP_SPLIT: u8 = 0x7f;
    pub const OP_NUM2BIN: u8 = 0x80;
    pub const OP_BIN2NUM: u8 = 0x81;
    pub const OP_SIZE: u8 = 0x82;

    pub const OP_EQUAL: u8 = 0x87;
    pub const OP_EQUALVERIFY: u8 = 0x88;

    pub const OP_1ADD: u8 = 0x8b;
    pub const OP_1SUB: u8 = 0x8c;
    pub const OP_NOT: u8 = 0x91;
    pub const OP_ADD: u8 = 0x93;
    pub const OP_SUB: u8 = 0x94;
    pub const OP_MUL: u8 = 0x95;
    pub const OP_DIV: u8 = 0x96;
    pub const OP_MOD: u8 = 0x97;
    pub const OP_BOOLAND: u8 = 0x9a;
    pub const OP_NUMEQUAL: u8 = 0x9c;
    pub const OP_NUMEQUALVERIFY: u8 = 0x9d;
    pub const OP_LESSTHAN: u8 = 0x9f;
    pub const OP_GREATERTHAN: u8 = 0xa0;
    pub const OP_LESSTHANOREQUAL: u8 = 0xa1;
    pub const OP_GREATERTHANOREQUAL: u8 = 0xa2;
    pub const OP_MIN: u8 = 0xa3;
    pub const OP_MAX: u8 = 0xa4;
    pub const OP_WITHIN: u8 = 0xa5;

    pub const OP_RIPEMD160: u8 = 0xa6;
    pub const OP_SHA256: u8 = 0xa8;
    pub const OP_HASH160: u8 = 0xa9;
    pub const OP_HASH256: u8 = 0xaa;
    pub const OP_CODESEPARATOR: u8 = 0xab;
    pub const OP_CHECKSIG: u8 = 0xac;
    pub const OP_CHECKSIGVERIFY: u8 = 0xad;

    pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
    pub const OP_REVERSEBYTES: u8 = 0xbc;
}

use opcode::*;

/// A serialized script program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Script(Vec<u8>);

impl Script {
    pub fn new() -> Self {
        Script(Vec::new())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Script(bytes)
    }

    pub fn bytecode(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push_op(&mut self, op: u8) -> &mut Self {
        self.0.push(op);
        self
    }

    /// Push `data` with the minimal push-data encoding.
    pub fn push_slice(&mut self, data: &[u8]) -> &mut Self {
        match data.len() {
            0 => self.0.push(OP_0),
            1 if data[0] >= 1 && data[0] <= 16 => self.0.push(OP_1 + data[0] - 1),
            1 if data[0] == 0x81 => self.0.push(OP_1NEGATE),
            len @ 1..=75 => {
                self.0.push(len as u8);
                self.0.extend_from_slice(data);
            }
            len @ 76..=255 => {
                self.0.push(OP_PUSHDATA1);
                self.0.push(len as u8);
                self.0.extend_from_slice(data);
            }
            len @ 256..=65535 => {
                self.0.push(OP_PUSHDATA2);
                self.0.extend_from_slice(&(len as u16).to_le_bytes());
                self.0.extend_from_slice(data);
            }
            len => {
                self.0.push(OP_PUSHDATA4);
                self.0.extend_from_slice(&(len as u32).to_le_bytes());
                self.0.extend_from_slice(data);
            }
        }
        self
    }

    /// Push an integer as a minimally-encoded script number.
    pub fn push_int(&mut self, value: i64) -> &mut Self {
        match value {
            0 => {
                self.0.push(OP_0);
            }
            1..=16 => {
                self.0.push(OP_1 + (value as u8) - 1);
            }
            -1 => {
                self.0.push(OP_1NEGATE);
            }
            _ => {
                let encoded = encode_script_num(value);
                self.0.push(encoded.len() as u8);
                self.0.extend_from_slice(&encoded);
            }
        }
        self
    }

    /// Standard pay-to-script-hash locking script.
    pub fn p2sh(script_hash: &[u8; 20]) -> Self {
        let mut bytecode = Vec::with_capacity(23);
        bytecode.push(OP_HASH160);
        bytecode.push(20);
        bytecode.extend_from_slice(script_hash);
        bytecode.push(OP_EQUAL);
        Script(bytecode)
    }

    /// Standard pay-to-pubkey-hash locking script.
    pub fn p2pkh(pk_hash: &[u8; 20]) -> Self {
        let mut bytecode = Vec::with_capacity(25);
        bytecode.push(OP_DUP);
        bytecode.push(OP_HASH160);
        bytecode.push(20);
        bytecode.extend_from_slice(pk_hash);
        bytecode.push(OP_EQUALVERIFY);
        bytecode.push(OP_CHECKSIG);
        Script(bytecode)
    }

    /// P2SH locking script for a redeem script.
    pub fn p2sh_of(redeem_script: &Script) -> Self {
        Script::p2sh(&hash160(redeem_script.bytecode()))
    }

    /// The 20-byte hash committed by a P2SH locking script, if this is one.
    pub fn p2sh_hash(&self) -> Option<[u8; 20]> {
        let b = &self.0;
        if b.len() == 23 && b[0] == OP_HASH160 && b[1] == 20 && b[22] == OP_EQUAL {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&b[2..22]);
            Some(hash)
        } else {
            None
        }
    }

    /// Decode the script as a sequence of data pushes. Returns `None` if any
    /// element is not a push (unlocking scripts for the covenant are
    /// push-only).
    pub fn pushes(&self) -> Option<Vec<Vec<u8>>> {
        let b = &self.0;
        let mut pushes = Vec::new();
        let mut pos = 0usize;
        while pos < b.len() {
            let op = b[pos];
            pos += 1;
            let len = match op {
                OP_0 => 0,
                1..=75 => op as usize,
                OP_PUSHDATA1 => {
                    let n = *b.get(pos)? as usize;
                    pos += 1;
                    n
                }
                OP_PUSHDATA2 => {
                    let lo = *b.get(pos)? as usize;
                    let hi = *b.get(pos + 1)? as usize;
                    pos += 2;
                    lo | (hi << 8)
                }
                OP_1NEGATE => {
                    pushes.push(vec![0x81]);
                    continue;
                }
                OP_1..=OP_16 => {
                    pushes.push(vec![op - OP_1 + 1]);
                    continue;
                }
                _ => return None,
            };
            if pos + len > b.len() {
                return None;
            }
            pushes.push(b[pos..pos + len].to_vec());
            pos += len;
        }
        Some(pushes)
    }
}

impl std::fmt::Display for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// Encode an integer in the script VM's sign-magnitude little-endian form.
pub fn encode_script_num(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let negative = value < 0;
    let mut abs = value.unsigned_abs();
    let mut bytes = Vec::new();
    while abs > 0 {
        bytes.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    // The high bit of the top byte is the sign bit; add a padding byte when
    // the magnitude already uses it.
    if bytes.last().copied().unwrap_or(0) & 0x80 != 0 {
        bytes.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        let last = bytes.len() - 1;
        bytes[last] |= 0x80;
    }
    bytes
}

/// Decode a minimally-encoded script number.
pub fn decode_script_num(bytes: &[u8]) -> Result<i64> {
    if bytes.is_empty() {
        return Ok(0);
    }
    if bytes.len() > 8 {
        return Err(Error::MalformedConsts(format!(
            "script number too wide: {} bytes",
            bytes.len()
        )));
    }
    let mut magnitude: u64 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        let b = if i == bytes.len() - 1 { b & 0x7f } else { b };
        magnitude |= (b as u64) << (8 * i);
    }
    let negative = bytes[bytes.len() - 1] & 0x80 != 0;
    let value = magnitude as i64;
    Ok(if negative { -value } else { value })
}

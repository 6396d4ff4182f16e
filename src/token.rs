//! Token protocol boundary: the two supported protocols and their
//! send-envelope encodings.
//!
//! A send envelope is the OP_RETURN declaration output at index 0 of a
//! token-moving transaction; it lists the token quantity assigned to each
//! subsequent output, in output order starting at index 1.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::script::{Script, opcode};

/// Closed set of supported token protocols. Each has its own envelope
/// format and maximum representable supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenProtocol {
    Slp,
    Alp,
}

/// ALP amounts are 6-byte integers on the wire.
pub const ALP_MAX_AMOUNT: u64 = (1 << 48) - 1;
/// SLP allows at most 19 quantity entries in one send (OP_RETURN size cap).
pub const SLP_MAX_SEND_OUTPUTS: usize = 19;
/// ALP payloads cap out slightly later.
pub const ALP_MAX_SEND_OUTPUTS: usize = 29;

impl TokenProtocol {
    pub fn max_supply(&self) -> u128 {
        match self {
            TokenProtocol::Slp => u64::MAX as u128,
            TokenProtocol::Alp => ALP_MAX_AMOUNT as u128,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TokenProtocol::Slp => "SLP",
            TokenProtocol::Alp => "ALP",
        }
    }

    pub fn to_tag(&self) -> u8 {
        match self {
            TokenProtocol::Slp => 1,
            TokenProtocol::Alp => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(TokenProtocol::Slp),
            2 => Ok(TokenProtocol::Alp),
            _ => Err(Error::MalformedConsts(format!(
                "unknown token protocol tag {tag}"
            ))),
        }
    }
}

/// 32-byte token identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TokenId(pub [u8; 32]);

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Build the send-envelope locking script declaring `amounts\[i\]` for
/// output `i + 1`.
pub fn send_envelope(
    protocol: TokenProtocol,
    token_type: u8,
    token_id: &TokenId,
    amounts: &[u64],
) -> Result<Script> {
    match protocol {
        TokenProtocol::Slp => slp_send(token_type, token_id, amounts),
        TokenProtocol::Alp => alp_send(token_type, token_id, amounts),
    }
}

fn slp_send(token_type: u8, token_id: &TokenId, amounts: &[u64]) -> Result<Script> {
    if amounts.len() > SLP_MAX_SEND_OUTPUTS {
        return Err(Error::TooManyTokenOutputs(amounts.len(), "SLP"));
    }
    let mut script = Script::new();
    script.push_op(opcode::OP_RETURN);
    script.push_slice(b"SLP\0");
    script.push_slice(&[token_type]);
    script.push_slice(b"SEND");
    script.push_slice(&token_id.0);
    for &amount in amounts {
        script.push_slice(&amount.to_be_bytes());
    }
    Ok(script)
}

fn alp_send(token_type: u8, token_id: &TokenId, amounts: &[u64]) -> Result<Script> {
    if amounts.len() > ALP_MAX_SEND_OUTPUTS {
        return Err(Error::TooManyTokenOutputs(amounts.len(), "ALP"));
    }
    let mut payload = Vec::new();
    payload.extend_from_slice(b"SLP2");
    payload.push(token_type);
    payload.push(4);
    payload.extend_from_slice(b"SEND");
    // ALP serializes token ids little-endian.
    let mut id = token_id.0;
    id.reverse();
    payload.extend_from_slice(&id);
    payload.push(amounts.len() as u8);
    for &amount in amounts {
        if amount > ALP_MAX_AMOUNT {
            return Err(Error::TokenAmountOutOfRange(amount, "ALP"));
        }
        payload.extend_from_slice(&amount.to_le_bytes()[..6]);
    }
    let mut script = Script::new();
    script.push_op(opcode::OP_RETURN);
    script.push_op(opcode::OP_RESERVED);
    script.push_slice(&payload);
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_id() -> TokenId {
        TokenId([0xcd; 32])
    }

    #[test]
    fn slp_send_layout() {
        let script = send_envelope(TokenProtocol::Slp, 1, &token_id(), &[0, 500, 500]).unwrap();
        let bytecode = script.bytecode();
        assert_eq!(bytecode[0], opcode::OP_RETURN);
        // lokad id push
        assert_eq!(&bytecode[1..6], &[4, b'S', b'L', b'P', 0]);
        // three 8-byte big-endian amounts at the tail
        assert_eq!(&bytecode[bytecode.len() - 9..], &{
            let mut tail = vec![8u8];
            tail.extend_from_slice(&500u64.to_be_bytes());
            tail
        }[..]);
    }

    #[test]
    fn alp_send_layout() {
        let script = send_envelope(TokenProtocol::Alp, 0, &token_id(), &[1, 2]).unwrap();
        let bytecode = script.bytecode();
        assert_eq!(bytecode[0], opcode::OP_RETURN);
        assert_eq!(bytecode[1], opcode::OP_RESERVED);
        let pushes = Script::from_bytes(bytecode[2..].to_vec()).pushes().unwrap();
        assert_eq!(pushes.len(), 1);
        assert_eq!(&pushes[0][..4], b"SLP2");
    }

    #[test]
    fn alp_amount_cap() {
        let res = send_envelope(TokenProtocol::Alp, 0, &token_id(), &[ALP_MAX_AMOUNT + 1]);
        assert!(matches!(res, Err(Error::TokenAmountOutOfRange(_, "ALP"))));
    }

    #[test]
    fn slp_output_cap() {
        let amounts = vec![1u64; SLP_MAX_SEND_OUTPUTS + 1];
        assert!(send_envelope(TokenProtocol::Slp, 1, &token_id(), &amounts).is_err());
    }

    #[test]
    fn max_supplies() {
        assert_eq!(TokenProtocol::Slp.max_supply(), u64::MAX as u128);
        assert_eq!(TokenProtocol::Alp.max_supply(), (1u128 << 48) - 1);
    }
}

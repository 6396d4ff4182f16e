//! Transaction structures and consensus wire serialization.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hash::sha256d;
use crate::script::Script;
use crate::ser::{ByteReader, compact_size_len, write_compact_size};

/// Sequence value that keeps lock-time enforcement active.
pub const SEQUENCE_WITH_LOCKTIME: u32 = 0xffff_fffe;
/// Final sequence; lock-time is ignored.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// A transaction id: the double-SHA-256 of the serialized transaction.
/// Displayed byte-reversed, matching explorer convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TxId(pub [u8; 32]);

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "{}", hex::encode(reversed))
    }
}

/// A reference to one transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: TxId,
    pub out_idx: u32,
}

impl OutPoint {
    pub fn new(txid: TxId, out_idx: u32) -> Self {
        Self { txid, out_idx }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.txid.0);
        out.extend_from_slice(&self.out_idx.to_le_bytes());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub prev_out: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
}

impl TxInput {
    pub fn write_to(&self, out: &mut Vec<u8>) {
        self.prev_out.write_to(out);
        write_compact_size(out, self.script_sig.len() as u64);
        out.extend_from_slice(self.script_sig.bytecode());
        out.extend_from_slice(&self.sequence.to_le_bytes());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub sats: u64,
    pub script: Script,
}

impl TxOutput {
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.sats.to_le_bytes());
        write_compact_size(out, self.script.len() as u64);
        out.extend_from_slice(self.script.bytecode());
    }

    pub fn serialized_len(&self) -> usize {
        8 + compact_size_len(self.script.len() as u64) + self.script.len()
    }

    pub fn read_from(reader: &mut ByteReader) -> Result<Self> {
        let sats = reader.read_u64_le()?;
        let script_len = reader.read_compact_size()? as usize;
        let script = Script::from_bytes(reader.take(script_len)?.to_vec());
        Ok(TxOutput { sats, script })
    }
}

/// Serialize a list of outputs without a leading count; the Oneshot covenant
/// commits to its enforced outputs in exactly this form.
pub fn serialize_outputs(outputs: &[TxOutput]) -> Vec<u8> {
    let mut out = Vec::new();
    for output in outputs {
        output.write_to(&mut out);
    }
    out
}

/// Parse a count-less output list, consuming the whole slice.
pub fn parse_outputs(data: &[u8]) -> Result<Vec<TxOutput>> {
    let mut reader = ByteReader::new(data);
    let mut outputs = Vec::new();
    while !reader.is_empty() {
        outputs.push(TxOutput::read_from(&mut reader)?);
    }
    Ok(outputs)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tx {
    pub version: i32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub locktime: u32,
}

impl Tx {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        write_compact_size(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            input.write_to(&mut out);
        }
        write_compact_size(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            output.write_to(&mut out);
        }
        out.extend_from_slice(&self.locktime.to_le_bytes());
        out
    }

    pub fn serialized_size(&self) -> usize {
        self.serialize().len()
    }

    pub fn txid(&self) -> TxId {
        TxId(sha256d(&self.serialize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_output() -> TxOutput {
        TxOutput {
            sats: 546,
            script: Script::p2pkh(&[0x11; 20]),
        }
    }

    #[test]
    fn output_roundtrip() {
        let output = sample_output();
        let mut buf = Vec::new();
        output.write_to(&mut buf);
        assert_eq!(buf.len(), output.serialized_len());
        let mut reader = ByteReader::new(&buf);
        assert_eq!(TxOutput::read_from(&mut reader).unwrap(), output);
    }

    #[test]
    fn outputs_list_roundtrip() {
        let outputs = vec![
            TxOutput {
                sats: 0,
                script: Script::from_bytes(vec![0x6a]),
            },
            sample_output(),
            sample_output(),
        ];
        let ser = serialize_outputs(&outputs);
        assert_eq!(parse_outputs(&ser).unwrap(), outputs);
    }

    #[test]
    fn txid_is_stable() {
        let tx = Tx {
            version: 2,
            inputs: vec![TxInput {
                prev_out: OutPoint::default(),
                script_sig: Script::new(),
                sequence: SEQUENCE_FINAL,
            }],
            outputs: vec![sample_output()],
            locktime: 0,
        };
        assert_eq!(tx.txid(), tx.txid());
        assert_eq!(tx.serialized_size(), tx.serialize().len());
    }
}

//! Fee-covering fuel input selection.
//!
//! The fee depends on the serialized transaction size, which depends on how
//! many inputs end up in the transaction, the very thing being selected.
//! The selector resolves the circularity by re-measuring the fee after every
//! added input; fee growth per input is small relative to any useful input
//! value, so the greedy prefix converges. No single up-front estimate is
//! safe, so none is attempted.

use crate::error::{Error, Result};
use crate::offer::{AgoraOffer, FuelInput};
use crate::script::Script;

/// Greedily accumulate a prefix of `candidates` (kept in caller order) until
/// it covers the requirement reported by `required_fuel_sats` for the
/// current selection. Fails with [`Error::InsufficientFuel`] when the whole
/// list cannot cover it.
pub fn select_fuel_inputs<F>(
    candidates: &[FuelInput],
    mut required_fuel_sats: F,
) -> Result<Vec<FuelInput>>
where
    F: FnMut(&[FuelInput]) -> Result<u64>,
{
    let mut selected: Vec<FuelInput> = Vec::new();
    let mut available = 0u64;
    for candidate in candidates {
        available += candidate.sats;
        selected.push(candidate.clone());
        // Fee scales with input count; re-measure with the selection as it
        // stands, never with an estimate.
        let required = required_fuel_sats(&selected)?;
        log::debug!(
            "fuel selection: {} inputs, {available}/{required} sats",
            selected.len()
        );
        if available >= required {
            return Ok(selected);
        }
    }
    let required = required_fuel_sats(&selected)?;
    Err(Error::InsufficientFuel {
        available,
        required,
    })
}

/// Select fuel for accepting `offer`.
pub fn select_accept_fuel(
    offer: &AgoraOffer,
    candidates: &[FuelInput],
    recipient_script: &Script,
    accepted_tokens: Option<u64>,
    fee_per_kb: Option<u64>,
) -> Result<Vec<FuelInput>> {
    select_fuel_inputs(candidates, |selection| {
        offer.accept_required_fuel_sats(recipient_script, selection, fee_per_kb, accepted_tokens)
    })
}

/// Select fuel for cancelling `offer`; only the fee needs covering.
pub fn select_cancel_fuel(
    offer: &AgoraOffer,
    candidates: &[FuelInput],
    recipient_script: &Script,
    fee_per_kb: Option<u64>,
) -> Result<Vec<FuelInput>> {
    select_fuel_inputs(candidates, |selection| {
        offer.cancel_required_fuel_sats(recipient_script, selection, fee_per_kb)
    })
}

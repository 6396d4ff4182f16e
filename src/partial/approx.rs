//! The parameter approximator: loss-minimizing conversion of human offer
//! terms into covenant-representable integers.
//!
//! The script VM computes in signed integers of a small fixed width
//! (normally 32 bits), while real listings span "billions of tokens per
//! satoshi" to "millions of satoshis per token". The approximator truncates
//! low-order bytes to gain range and scales to claw precision back, in a
//! fixed step order where later steps re-derive earlier values. All
//! intermediate arithmetic is `u128`; narrowing happens once, checked, at
//! construction.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sign::PubKey;
use crate::token::{TokenId, TokenProtocol};

use super::AgoraPartial;

/// The price unit: one satoshi split a billion ways.
pub const NANO_SATS_PER_SAT: u128 = 1_000_000_000;

/// Script integers are this wide unless a caller opts into a future ledger
/// upgrade.
pub const DEFAULT_SCRIPT_INTEGER_BITS: u32 = 32;

/// Floor for the scale factor applied before token truncation, so imprecise
/// prices keep at least ~3 decimal digits of quantity precision.
pub const DEFAULT_MIN_SCALE_FACTOR: u64 = 1000;

/// Price integers below this trigger an extra satoshi-truncation round when
/// there is scale headroom to pay for it.
pub const DEFAULT_MIN_PRICE_INTEGER: u64 = 1000;

/// How much scale headroom (relative to the price integer) justifies that
/// extra round.
pub const DEFAULT_PRICE_PRECISION_RATIO: u64 = 1024;

pub const DEFAULT_DUST_SATS: u64 = 546;

/// Human-specified offer terms, the approximator's input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferTerms {
    /// Quantity for sale, in base token units.
    pub offered_tokens: u64,
    /// Asking price in nano-satoshis per base token unit.
    pub price_nano_sats_per_token: u64,
    /// Maker key: payment destination and cancel authority.
    pub maker_pk: PubKey,
    /// Smallest fill the maker will entertain, in base token units.
    pub min_accepted_tokens: u64,
    pub token_id: TokenId,
    pub token_type: u8,
    pub token_protocol: TokenProtocol,
    /// Lock-time the covenant will enforce on accepts; see
    /// [`crate::discovery::choose_enforced_locktime`].
    pub enforced_locktime: u32,
    /// Overrides for the dust floor and the approximation tuning knobs.
    pub dust_sats: Option<u64>,
    pub min_scale_factor: Option<u64>,
    pub min_price_integer: Option<u64>,
    pub price_precision_ratio: Option<u64>,
}

impl AgoraPartial {
    /// Approximate with the default script integer width.
    pub fn approximate(terms: &OfferTerms) -> Result<AgoraPartial> {
        Self::approximate_with_bits(terms, DEFAULT_SCRIPT_INTEGER_BITS)
    }

    /// Produce the loss-minimizing covenant parameters for `terms` under a
    /// given script integer width, or fail if the terms cannot be
    /// represented even after maximal truncation.
    pub fn approximate_with_bits(terms: &OfferTerms, script_integer_bits: u32) -> Result<AgoraPartial> {
        if terms.offered_tokens == 0 {
            return Err(Error::ZeroOfferedQuantity);
        }
        if terms.price_nano_sats_per_token == 0 {
            return Err(Error::ZeroPrice);
        }
        if terms.min_accepted_tokens == 0 {
            return Err(Error::ZeroMinAccepted);
        }
        let max_supply = terms.token_protocol.max_supply();
        if terms.offered_tokens as u128 > max_supply {
            return Err(Error::QuantityExceedsMaxSupply(
                terms.offered_tokens as u128,
                max_supply,
            ));
        }
        if terms.min_accepted_tokens > terms.offered_tokens {
            return Err(Error::MinAcceptedExceedsOffered);
        }
        if !(8..=64).contains(&script_integer_bits) {
            return Err(Error::UnsupportedConfiguration(format!(
                "script integer width {script_integer_bits} not supported"
            )));
        }

        // One bit of the width is the sign bit.
        let max_script_int: u128 = (1u128 << (script_integer_bits - 1)) - 1;
        let price = terms.price_nano_sats_per_token as u128;

        // A price that divides the base unit evenly inverts exactly; no
        // scale floor is needed to contain the rounding loss.
        let is_precise_price = NANO_SATS_PER_SAT % price == 0;
        let min_scale_factor = if is_precise_price {
            1
        } else {
            terms.min_scale_factor.unwrap_or(DEFAULT_MIN_SCALE_FACTOR) as u128
        };

        // Truncate the offered quantity 8 bits at a time until it fits the
        // width with the scale floor applied.
        let mut trunc_tokens = terms.offered_tokens as u128;
        let mut num_token_trunc_bytes = 0u8;
        while trunc_tokens * min_scale_factor > max_script_int {
            trunc_tokens >>= 8;
            num_token_trunc_bytes += 1;
        }
        if trunc_tokens == 0 {
            return Err(Error::ScriptIntegerOverflow(min_scale_factor as i128));
        }

        // Satoshis required for a full fill, truncated independently of the
        // quantity.
        let required_sats = terms.offered_tokens as u128 * price / NANO_SATS_PER_SAT;
        let mut required_trunc_sats = required_sats;
        let mut num_sats_trunc_bytes = 0u8;
        while required_trunc_sats > max_script_int {
            required_trunc_sats >>= 8;
            num_sats_trunc_bytes += 1;
        }
        if num_sats_trunc_bytes > 7 {
            return Err(Error::ScriptIntegerOverflow(required_sats as i128));
        }

        // The largest scale that keeps the full scaled quantity in range;
        // this maximizes the precision retained after truncation.
        let mut token_scale_factor = max_script_int / trunc_tokens;

        let price_integer = |scale: u128, sats_trunc_bytes: u8| -> Result<u128> {
            let sats_unit = 1u128 << (8 * sats_trunc_bytes as u32);
            let token_unit = 1u128 << (8 * num_token_trunc_bytes as u32);
            sats_unit
                .checked_mul(NANO_SATS_PER_SAT)
                .and_then(|n| n.checked_mul(scale))
                .map(|n| n / (token_unit * price))
                .ok_or(Error::ScriptIntegerOverflow(i128::MAX))
        };

        // The exact algebraic inverse of the asked price, adjusted for both
        // truncations and the scale factor. Flooring here rounds the
        // effective price up, never down: the maker never undersells.
        let mut scaled_trunc_tokens_per_trunc_sat =
            price_integer(token_scale_factor, num_sats_trunc_bytes)?;

        // Low-price listings ("many tokens, tiny price") can end up with a
        // coarse price integer while scale headroom goes unused; one more
        // satoshi truncation round multiplies the integer by 256.
        let min_price_integer =
            terms.min_price_integer.unwrap_or(DEFAULT_MIN_PRICE_INTEGER) as u128;
        let precision_ratio = terms
            .price_precision_ratio
            .unwrap_or(DEFAULT_PRICE_PRECISION_RATIO) as u128;
        if scaled_trunc_tokens_per_trunc_sat < min_price_integer
            && token_scale_factor > scaled_trunc_tokens_per_trunc_sat.max(1) * precision_ratio
            && num_sats_trunc_bytes < 7
        {
            num_sats_trunc_bytes += 1;
            scaled_trunc_tokens_per_trunc_sat =
                price_integer(token_scale_factor, num_sats_trunc_bytes)?;
        }
        if scaled_trunc_tokens_per_trunc_sat == 0 {
            return Err(Error::PriceTooLow);
        }

        // The accept path computes
        //   (accepted_scaled + price_integer - 1) / price_integer
        // and the intermediate sum must itself fit the width.
        let ceiling_sum = |trunc_tokens: u128, scale: u128, price_int: u128| {
            trunc_tokens * scale + price_int - 1
        };
        if ceiling_sum(
            trunc_tokens,
            token_scale_factor,
            scaled_trunc_tokens_per_trunc_sat,
        ) > max_script_int
        {
            token_scale_factor = (token_scale_factor / 2).max(1);
            scaled_trunc_tokens_per_trunc_sat =
                price_integer(token_scale_factor, num_sats_trunc_bytes)?;
            if scaled_trunc_tokens_per_trunc_sat == 0 {
                return Err(Error::PriceTooLow);
            }
            if ceiling_sum(
                trunc_tokens,
                token_scale_factor,
                scaled_trunc_tokens_per_trunc_sat,
            ) > max_script_int
            {
                if scaled_trunc_tokens_per_trunc_sat > max_script_int {
                    return Err(Error::ScriptIntegerOverflow(
                        scaled_trunc_tokens_per_trunc_sat as i128,
                    ));
                }
                // Shave the quantity down to the largest value that keeps
                // the sum in range; costs the maker at most a few
                // truncation units of listed quantity.
                trunc_tokens =
                    (max_script_int + 1 - scaled_trunc_tokens_per_trunc_sat) / token_scale_factor;
                if trunc_tokens == 0 {
                    return Err(Error::ScriptIntegerOverflow(
                        scaled_trunc_tokens_per_trunc_sat as i128,
                    ));
                }
            }
        }

        // Scale and truncate the minimum-acceptance floor. A floor that
        // truncates away entirely cannot be enforced by the covenant.
        let min_accepted_scaled_trunc_tokens = (terms.min_accepted_tokens as u128
            * token_scale_factor)
            >> (8 * num_token_trunc_bytes as u32);
        if min_accepted_scaled_trunc_tokens == 0 {
            return Err(Error::MinAcceptedTruncatesToZero);
        }
        if min_accepted_scaled_trunc_tokens > trunc_tokens * token_scale_factor {
            return Err(Error::MinAcceptedExceedsOffered);
        }

        let narrow = |v: u128| -> Result<u64> {
            if v > max_script_int {
                return Err(Error::ScriptIntegerOverflow(v as i128));
            }
            Ok(v as u64)
        };

        let mut partial = AgoraPartial {
            trunc_tokens: narrow(trunc_tokens)?,
            num_token_trunc_bytes,
            token_scale_factor: narrow(token_scale_factor)?,
            scaled_trunc_tokens_per_trunc_sat: narrow(scaled_trunc_tokens_per_trunc_sat)?,
            num_sats_trunc_bytes,
            min_accepted_scaled_trunc_tokens: narrow(min_accepted_scaled_trunc_tokens)?,
            maker_pk: terms.maker_pk,
            token_id: terms.token_id,
            token_type: terms.token_type,
            token_protocol: terms.token_protocol,
            enforced_locktime: terms.enforced_locktime,
            dust_sats: terms.dust_sats.unwrap_or(DEFAULT_DUST_SATS),
            script_len: 0,
        };
        partial.update_script_len();
        Ok(partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(offered: u64, price: u64, min_accepted: u64) -> OfferTerms {
        OfferTerms {
            offered_tokens: offered,
            price_nano_sats_per_token: price,
            maker_pk: PubKey([0xaa; 32]),
            min_accepted_tokens: min_accepted,
            token_id: TokenId([0xcd; 32]),
            token_type: 1,
            token_protocol: TokenProtocol::Slp,
            enforced_locktime: 1_234_567_890,
            dust_sats: None,
            min_scale_factor: None,
            min_price_integer: None,
            price_precision_ratio: None,
        }
    }

    #[test]
    fn rejects_degenerate_terms() {
        assert!(matches!(
            AgoraPartial::approximate(&terms(0, 1, 1)),
            Err(Error::ZeroOfferedQuantity)
        ));
        assert!(matches!(
            AgoraPartial::approximate(&terms(1, 0, 1)),
            Err(Error::ZeroPrice)
        ));
        assert!(matches!(
            AgoraPartial::approximate(&terms(1, 1, 0)),
            Err(Error::ZeroMinAccepted)
        ));
        assert!(matches!(
            AgoraPartial::approximate(&terms(1, 1, 2)),
            Err(Error::MinAcceptedExceedsOffered)
        ));
    }

    #[test]
    fn rejects_quantity_over_alp_supply() {
        let mut t = terms(u64::MAX, 1_000_000_000, 1);
        t.token_protocol = TokenProtocol::Alp;
        assert!(matches!(
            AgoraPartial::approximate(&t),
            Err(Error::QuantityExceedsMaxSupply(_, _))
        ));
    }

    #[test]
    fn one_sat_per_token_is_exact() {
        // 1000 units at exactly 1 sat/unit: no truncation, maximal scale.
        let partial = AgoraPartial::approximate(&terms(1000, 1_000_000_000, 1)).unwrap();
        assert_eq!(partial.num_token_trunc_bytes, 0);
        assert_eq!(partial.num_sats_trunc_bytes, 0);
        assert_eq!(partial.offered_tokens(), 1000);
        assert_eq!(partial.asked_sats(1).unwrap(), 1);
        assert_eq!(partial.asked_sats(1000).unwrap(), 1000);
    }

    #[test]
    fn offered_quantity_never_exceeds_terms() {
        for offered in [1u64, 999, 1 << 20, u64::MAX / 3, u64::MAX] {
            for price in [1u64, 3, 1_000_000_000, 777_777_777_777] {
                let t = terms(offered, price, 1);
                let Ok(partial) = AgoraPartial::approximate(&t) else {
                    continue;
                };
                assert!(partial.offered_tokens() <= offered, "offered={offered} price={price}");
                let lost = offered - partial.offered_tokens();
                assert!(
                    (lost as u128) < partial.token_trunc_unit() as u128
                        + partial.token_trunc_unit() as u128
                            * partial.scaled_trunc_tokens_per_trunc_sat as u128
                            / partial.token_scale_factor as u128,
                    "offered={offered} price={price} lost={lost}"
                );
            }
        }
    }

    #[test]
    fn asked_sats_is_monotone() {
        let partial = AgoraPartial::approximate(&terms(100_000, 123_456_789, 10)).unwrap();
        let unit = partial.token_trunc_unit();
        let mut last = 0u64;
        let mut accepted = partial.prepare_accepted_tokens(partial.min_accepted_tokens() + unit);
        while accepted <= partial.offered_tokens() {
            let asked = partial.asked_sats(accepted).unwrap();
            assert!(asked >= last, "asked_sats not monotone at {accepted}");
            last = asked;
            accepted += unit * 997;
        }
    }

    #[test]
    fn imprecise_price_keeps_scale_floor() {
        // 1/3 sat per token does not divide the base unit evenly.
        let partial = AgoraPartial::approximate(&terms(1 << 40, 333_333_333, 1000)).unwrap();
        assert!(partial.token_scale_factor >= DEFAULT_MIN_SCALE_FACTOR);
        assert!(partial.num_token_trunc_bytes > 0);
        // Effective price within 0.1% of the request.
        let effective = partial.price_nano_sats_per_token(None).unwrap();
        let request = 333_333_333u128;
        let err = effective.abs_diff(request);
        assert!(err * 1000 < request, "effective={effective}");
    }

    #[test]
    fn coarse_price_integer_gets_extra_sats_truncation() {
        // Millions of satoshis per token: the raw price integer would be a
        // single-digit value quantizing the price by whole percents; the
        // extra satoshi-truncation round multiplies it by 256.
        let partial =
            AgoraPartial::approximate(&terms(1000, 4_000_000_000_000_000_000, 1)).unwrap();
        // Two rounds come from the required-sats fit, the third from the
        // price-precision rule.
        assert_eq!(partial.num_sats_trunc_bytes, 3);
        assert!(partial.scaled_trunc_tokens_per_trunc_sat >= 1000);
        // Effective price within 0.1% of the request.
        let effective = partial.price_nano_sats_per_token(None).unwrap();
        let request = 4_000_000_000_000_000_000u128;
        assert!(effective.abs_diff(request) * 1000 < request, "effective={effective}");
    }

    #[test]
    fn min_accept_truncating_to_zero_fails() {
        let mut t = terms(u64::MAX, 1, 1);
        t.token_protocol = TokenProtocol::Slp;
        assert!(matches!(
            AgoraPartial::approximate(&t),
            Err(Error::MinAcceptedTruncatesToZero)
        ));
    }

    #[test]
    fn ceiling_sum_fits_script_width() {
        for offered in [1000u64, 1 << 31, u64::MAX] {
            for price in [1u64, 999, 1_000_000_000, u32::MAX as u64] {
                let Ok(partial) = AgoraPartial::approximate(&terms(offered, price, 1)) else {
                    continue;
                };
                let sum = partial.trunc_tokens as u128 * partial.token_scale_factor as u128
                    + partial.scaled_trunc_tokens_per_trunc_sat as u128
                    - 1;
                assert!(sum <= (1u128 << 31) - 1, "offered={offered} price={price}");
            }
        }
    }

    #[test]
    fn wider_integers_allow_more_precision() {
        let narrow = AgoraPartial::approximate_with_bits(&terms(u64::MAX / 2, 3, 1 << 34), 32)
            .unwrap();
        let wide = AgoraPartial::approximate_with_bits(&terms(u64::MAX / 2, 3, 1 << 34), 64)
            .unwrap();
        assert!(wide.num_token_trunc_bytes <= narrow.num_token_trunc_bytes);
    }
}

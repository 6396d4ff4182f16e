use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("offered quantity must be at least 1 base unit")]
    ZeroOfferedQuantity,

    #[error("price must be at least 1 nano-satoshi per base unit")]
    ZeroPrice,

    #[error("minimum accepted quantity must be at least 1 base unit")]
    ZeroMinAccepted,

    #[error("offered quantity {0} exceeds the protocol max supply {1}")]
    QuantityExceedsMaxSupply(u128, u128),

    #[error("minimum accepted quantity exceeds the offered quantity")]
    MinAcceptedExceedsOffered,

    #[error("minimum accepted quantity truncates to zero; raise the minimum or lower the price")]
    MinAcceptedTruncatesToZero,

    #[error("price too low: the derived price integer truncates to zero")]
    PriceTooLow,

    #[error("value {0} does not fit the script integer width")]
    ScriptIntegerOverflow(i128),

    #[error("accepted quantity {0} is not a multiple of the truncation unit {1}")]
    NotTruncationMultiple(u64, u64),

    #[error("accepted quantity {accepted} outside the valid range [{min}, {max}]")]
    AcceptedQuantityOutOfRange { accepted: u64, min: u64, max: u64 },

    #[error(
        "acceptance would leave an unspendable remainder of {remaining} units \
         (minimum acceptable is {min_accepted})"
    )]
    UnspendableRemainder { remaining: u64, min_accepted: u64 },

    #[error("insufficient fuel: {available} sats available, {required} sats required")]
    InsufficientFuel { available: u64, required: u64 },

    #[error("token amount {0} exceeds the {1} transfer maximum")]
    TokenAmountOutOfRange(u64, &'static str),

    #[error("too many token outputs for one {1} send: {0}")]
    TooManyTokenOutputs(usize, &'static str),

    #[error("no covenant builder for this configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("malformed covenant constants: {0}")]
    MalformedConsts(String),

    #[error("signing error: {0}")]
    Signer(String),

    #[error("indexer error: {0}")]
    Indexer(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<secp256k1::Error> for Error {
    fn from(e: secp256k1::Error) -> Self {
        Error::Signer(e.to_string())
    }
}

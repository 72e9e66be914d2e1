//! Helper types shared across the protocol crates.

pub mod b64;
pub mod money_amount;

pub use b64::Base64Bytes;
pub use money_amount::{MoneyAmount, MoneyAmountParseError, TokenAmount};

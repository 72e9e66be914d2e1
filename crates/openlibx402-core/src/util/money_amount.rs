//! Decimal amount parsing and smallest-unit conversion.
//!
//! Protocol amounts travel as decimal strings in token UI units (`"0.10"`).
//! Every policy comparison happens either on [`MoneyAmount`] (exact decimal
//! arithmetic via `rust_decimal`) or on [`TokenAmount`] (integer smallest
//! units at `10^decimals` scale). Binary floats are never involved.

use regex::Regex;
use rust_decimal::Decimal;
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::LazyLock;

/// A token amount in smallest units (`10^decimals` scale).
///
/// This is the only scale at which sufficiency and cap comparisons are
/// performed once the mint's decimals are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TokenAmount(pub u64);

impl TokenAmount {
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        TokenAmount(value)
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A parsed monetary amount with decimal precision.
///
/// Represents a non-negative decimal value parsed from a human-readable
/// string. The original precision is preserved, which matters when
/// converting to token amounts with specific decimal places.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub struct MoneyAmount(pub Decimal);

/// Errors that can occur when parsing or converting a monetary amount.
#[derive(Debug, thiserror::Error)]
pub enum MoneyAmountParseError {
    /// The input string could not be parsed as a number.
    #[error("Invalid number format")]
    InvalidFormat,
    /// The value is outside the allowed range.
    #[error(
        "Amount must be between {} and {}",
        constants::MIN_STR,
        constants::MAX_STR
    )]
    OutOfRange,
    /// Negative values are not allowed.
    #[error("Negative value is not allowed")]
    Negative,
}

mod constants {
    use super::*;

    pub const MIN_STR: &str = "0.000000001";
    pub const MAX_STR: &str = "999999999";

    pub static MIN: LazyLock<Decimal> =
        LazyLock::new(|| Decimal::from_str(MIN_STR).expect("valid decimal"));
    pub static MAX: LazyLock<Decimal> =
        LazyLock::new(|| Decimal::from_str(MAX_STR).expect("valid decimal"));
}

static CLEAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\d\.\-]+").expect("valid regex"));

impl MoneyAmount {
    /// Parses a human-readable currency string into a [`MoneyAmount`].
    ///
    /// Currency symbols, thousand separators, and whitespace are stripped
    /// before parsing. The result must be a non-negative number within
    /// the allowed range.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The string cannot be parsed as a number
    /// - The value is negative
    /// - The value is outside the allowed range
    pub fn parse(input: &str) -> Result<Self, MoneyAmountParseError> {
        let cleaned = CLEAN_RE.replace_all(input, "").to_string();

        let parsed =
            Decimal::from_str(&cleaned).map_err(|_| MoneyAmountParseError::InvalidFormat)?;

        if parsed.is_sign_negative() {
            return Err(MoneyAmountParseError::Negative);
        }

        if parsed < *constants::MIN || parsed > *constants::MAX {
            return Err(MoneyAmountParseError::OutOfRange);
        }

        Ok(MoneyAmount(parsed))
    }

    /// Returns the number of decimal places in the original input.
    pub fn scale(&self) -> u32 {
        self.0.scale()
    }

    /// Returns the value as an unsigned integer (without decimal point).
    ///
    /// For example, `"12.34"` returns `1234`.
    pub fn mantissa(&self) -> u128 {
        self.0.mantissa().unsigned_abs()
    }

    /// Converts to smallest units at `10^decimals` scale.
    ///
    /// Fractional digits beyond `decimals` are truncated, i.e. the result is
    /// `floor(amount * 10^decimals)`.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyAmountParseError::OutOfRange`] if the scaled value does
    /// not fit in a `u64`.
    pub fn as_token_amount(&self, decimals: u32) -> Result<TokenAmount, MoneyAmountParseError> {
        let truncated = self.0.trunc_with_scale(decimals);
        let mantissa = truncated.mantissa().unsigned_abs();
        let shift = decimals.saturating_sub(truncated.scale());
        let units = 10u128
            .checked_pow(shift)
            .and_then(|scale| mantissa.checked_mul(scale))
            .ok_or(MoneyAmountParseError::OutOfRange)?;
        let units = u64::try_from(units).map_err(|_| MoneyAmountParseError::OutOfRange)?;
        Ok(TokenAmount(units))
    }

    /// Builds a UI-unit amount back from smallest units.
    pub fn from_token_amount(amount: TokenAmount, decimals: u32) -> Self {
        let decimal = Decimal::from_i128_with_scale(amount.inner() as i128, decimals);
        MoneyAmount(decimal.normalize())
    }
}

impl FromStr for MoneyAmount {
    type Err = MoneyAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MoneyAmount::parse(s)
    }
}

impl TryFrom<&str> for MoneyAmount {
    type Error = MoneyAmountParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        MoneyAmount::from_str(value)
    }
}

impl From<u128> for MoneyAmount {
    fn from(value: u128) -> Self {
        MoneyAmount(Decimal::from(value))
    }
}

impl Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

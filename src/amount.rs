//! Arbitrary-precision amount and USD rate types (component C1).
//!
//! Amounts are unsigned integers in the asset's base unit (wei, satoshi,
//! ...). USD values and rates are unsigned integers with an implicit scale
//! of `10^8`. Neither type is ever represented as a binary float.

use std::{fmt, ops::Add, str::FromStr};

use bigdecimal::{BigDecimal, ToBigInt};
use diesel::{
    deserialize::{self, FromSql},
    pg::{Pg, PgValue},
    serialize::{self, Output, ToSql},
    sql_types::Numeric,
    AsExpression, FromSqlRow,
};
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Fixed-point scale used for USD rates and values: `10^8`.
pub const USD_SCALE: u32 = 8;

macro_rules! biguint_newtype {
    ($name:ident) => {
        #[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, AsExpression, FromSqlRow)]
        #[diesel(sql_type = Numeric)]
        pub struct $name(pub BigUint);

        impl $name {
            pub fn zero() -> Self {
                Self(BigUint::zero())
            }

            pub fn is_zero(&self) -> bool {
                self.0.is_zero()
            }

            /// Returns `None` (rather than panicking) when the subtraction would
            /// be negative; callers use this to enforce non-negative balances.
            pub fn checked_sub(&self, other: &Self) -> Option<Self> {
                if self.0 < other.0 {
                    None
                } else {
                    Some(Self(&self.0 - &other.0))
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = num_bigint::ParseBigIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(BigUint::from_str(s)?))
            }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self {
                Self(BigUint::from(v))
            }
        }

        impl Add for $name {
            type Output = Self;

            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                $name::from_str(&s).map_err(serde::de::Error::custom)
            }
        }

        impl ToSql<Numeric, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                let decimal = BigDecimal::from_str(&self.0.to_string())?;
                ToSql::<Numeric, Pg>::to_sql(&decimal, &mut out.reborrow())
            }
        }

        impl FromSql<Numeric, Pg> for $name {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let decimal = <BigDecimal as FromSql<Numeric, Pg>>::from_sql(bytes)?;
                let (digits, _scale) = decimal.as_bigint_and_exponent();
                Ok(Self(digits.to_biguint().ok_or("negative numeric in unsigned column")?))
            }
        }
    };
}

biguint_newtype!(Amount);
biguint_newtype!(UsdRate);
biguint_newtype!(UsdValue);

impl Amount {
    /// `usd_value = amount * usd_rate / 10^decimals`, truncated toward zero,
    /// using exact integer arithmetic throughout (§3, §9).
    pub fn usd_value(&self, usd_rate: &UsdRate, decimals: u32) -> UsdValue {
        if self.is_zero() || usd_rate.is_zero() {
            return UsdValue::zero();
        }
        let numerator = &self.0 * &usd_rate.0;
        let denominator = BigUint::from(10u32).pow(decimals);
        UsdValue(numerator / denominator)
    }
}

impl UsdRate {
    /// Converts a provider-supplied floating USD price into the fixed-point
    /// scale-`10^8` representation, tolerating rounding loss at ingestion
    /// (§9). Negative or non-finite inputs are rejected by the caller before
    /// this is invoked; out-of-range inputs round to zero.
    pub fn from_f64_lossy(price: f64) -> Self {
        if !price.is_finite() || price <= 0.0 {
            return Self::zero();
        }
        let scaled = (price * 10f64.powi(USD_SCALE as i32)).round();
        let decimal = BigDecimal::from(scaled);
        match decimal.to_bigint().and_then(|v| v.to_biguint()) {
            Some(v) => Self(v),
            None => Self::zero(),
        }
    }
}

//! Bounded amounts and assets.
//!
//! Every amount on chain satisfies `|value| <= MAX_SHARE_SUPPLY`. Arithmetic is
//! checked: leaving the range is an [`ExecError::Overflow`], never a wrap.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::error::{ExecError, ExecResult};
use crate::types::{AssetAid, CORE_ASSET_AID, MAX_SHARE_SUPPLY};

/// Signed quantity of some asset, in its smallest unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Build an amount, rejecting values outside the supply bounds.
    pub fn new(value: i64) -> ExecResult<Self> {
        if value > MAX_SHARE_SUPPLY || value < -MAX_SHARE_SUPPLY {
            return Err(ExecError::Overflow(format!(
                "amount {} outside +/-{}",
                value, MAX_SHARE_SUPPLY
            )));
        }
        Ok(Self(value))
    }

    /// Build from an unsigned value, as produced by fee calculations.
    pub fn from_u64(value: u64) -> ExecResult<Self> {
        let v = i64::try_from(value)
            .map_err(|_| ExecError::Overflow(format!("amount {} exceeds i64", value)))?;
        Self::new(v)
    }

    pub fn value(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Amount) -> ExecResult<Amount> {
        let v = self
            .0
            .checked_add(rhs.0)
            .ok_or_else(|| ExecError::Overflow(format!("{} + {}", self.0, rhs.0)))?;
        Self::new(v)
    }

    pub fn checked_sub(self, rhs: Amount) -> ExecResult<Amount> {
        let v = self
            .0
            .checked_sub(rhs.0)
            .ok_or_else(|| ExecError::Overflow(format!("{} - {}", self.0, rhs.0)))?;
        Self::new(v)
    }

    pub fn checked_neg(self) -> ExecResult<Amount> {
        let v = self
            .0
            .checked_neg()
            .ok_or_else(|| ExecError::Overflow(format!("-{}", self.0)))?;
        Self::new(v)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An amount tagged with the asset it is denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Asset {
    pub amount: Amount,
    pub asset_id: AssetAid,
}

impl Asset {
    pub fn new(amount: Amount, asset_id: AssetAid) -> Self {
        Self { amount, asset_id }
    }

    /// An amount of the core asset.
    pub fn core(amount: Amount) -> Self {
        Self::new(amount, CORE_ASSET_AID)
    }

    pub fn is_core(&self) -> bool {
        self.asset_id == CORE_ASSET_AID
    }

    pub fn checked_add(self, rhs: Asset) -> ExecResult<Asset> {
        self.same_asset(&rhs)?;
        Ok(Self::new(self.amount.checked_add(rhs.amount)?, self.asset_id))
    }

    pub fn checked_sub(self, rhs: Asset) -> ExecResult<Asset> {
        self.same_asset(&rhs)?;
        Ok(Self::new(self.amount.checked_sub(rhs.amount)?, self.asset_id))
    }

    pub fn checked_neg(self) -> ExecResult<Asset> {
        Ok(Self::new(self.amount.checked_neg()?, self.asset_id))
    }

    fn same_asset(&self, rhs: &Asset) -> ExecResult<()> {
        if self.asset_id != rhs.asset_id {
            return Err(ExecError::validation(format!(
                "asset mismatch: {} vs {}",
                self.asset_id, rhs.asset_id
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (asset {})", self.amount, self.asset_id)
    }
}

//! Fee schedule and fee arithmetic.
//!
//! Each operation kind has its own parameter struct. Defaults are expressed in
//! multiples of [`BLOCKCHAIN_PRECISION`] so tests have sane values; networks
//! override them through [`crate::ChainParameters`].

use serde::{Deserialize, Serialize};

use crate::error::{ExecError, ExecResult};
use crate::types::{BLOCKCHAIN_PRECISION, MAX_SHARE_SUPPLY};

const P: u64 = BLOCKCHAIN_PRECISION as u64;

/// Fee for `bytes` of payload at `price_per_kbyte`, rounded down.
///
/// Computed in 128-bit space and bounded by the max share supply.
pub fn calculate_data_fee(bytes: u64, price_per_kbyte: u64) -> ExecResult<u64> {
    let result = (bytes as u128 * price_per_kbyte as u128) / 1024;
    if result > MAX_SHARE_SUPPLY as u128 {
        return Err(ExecError::Overflow(format!(
            "data fee for {} bytes at {}/KiB exceeds max supply",
            bytes, price_per_kbyte
        )));
    }
    Ok(result as u64)
}

/// Fee for contract RAM usage, rounded up (towards positive infinity).
///
/// `ram_bytes` is signed: a negative value (storage released) yields a refund,
/// which therefore never exceeds the charge for the same byte count.
pub fn calculate_ram_fee(ram_bytes: i64, price_per_kbyte_ram: u64) -> ExecResult<i64> {
    let product = ram_bytes as i128 * price_per_kbyte_ram as i128;
    let fee = if product >= 0 {
        (product + 1023) / 1024
    } else {
        -((-product) / 1024)
    };
    if fee.abs() > MAX_SHARE_SUPPLY as i128 {
        return Err(ExecError::Overflow(format!(
            "ram fee for {} bytes exceeds max supply",
            ram_bytes
        )));
    }
    Ok(fee as i64)
}

/// Fee for contract CPU time: whole started milliseconds times the price.
pub fn calculate_cpu_fee(cpu_time_us: u64, price_per_ms_cpu: u64) -> ExecResult<u64> {
    let ms = cpu_time_us.div_ceil(1000);
    let fee = ms as u128 * price_per_ms_cpu as u128;
    if fee > MAX_SHARE_SUPPLY as u128 {
        return Err(ExecError::Overflow(format!(
            "cpu fee for {}us exceeds max supply",
            cpu_time_us
        )));
    }
    Ok(fee as u64)
}

// ── Per-operation parameters ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountCreateFeeParameters {
    pub basic_fee: u64,
    pub price_per_kbyte: u64,
}

impl Default for AccountCreateFeeParameters {
    fn default() -> Self {
        Self {
            basic_fee: 5 * P,
            price_per_kbyte: P,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferFeeParameters {
    pub fee: u64,
    /// Charged on the memo.
    pub price_per_kbyte: u64,
}

impl Default for TransferFeeParameters {
    fn default() -> Self {
        Self {
            fee: 2 * P,
            price_per_kbyte: 10 * P,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicFeeParameters {
    pub fee: u64,
}

impl Default for BasicFeeParameters {
    fn default() -> Self {
        Self { fee: P / 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractDeployFeeParameters {
    pub fee: u64,
    /// Charged on code, ABI and VM descriptors.
    pub price_per_kbyte: u64,
}

impl Default for ContractDeployFeeParameters {
    fn default() -> Self {
        Self {
            fee: P,
            price_per_kbyte: 10 * P,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractCallFeeParameters {
    pub fee: u64,
    /// RAM is paid from balance after execution, not from the declared fee.
    pub price_per_kbyte_ram: u64,
    pub price_per_ms_cpu: u64,
}

impl Default for ContractCallFeeParameters {
    fn default() -> Self {
        Self {
            fee: P / 10,
            price_per_kbyte_ram: P / 2,
            price_per_ms_cpu: P,
        }
    }
}

/// Fee parameters for every operation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    pub account_create: AccountCreateFeeParameters,
    pub transfer: TransferFeeParameters,
    pub balance_lock_update: BasicFeeParameters,
    pub contract_deploy: ContractDeployFeeParameters,
    pub contract_call: ContractCallFeeParameters,
    pub inter_contract_call: BasicFeeParameters,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            account_create: AccountCreateFeeParameters::default(),
            transfer: TransferFeeParameters::default(),
            balance_lock_update: BasicFeeParameters::default(),
            contract_deploy: ContractDeployFeeParameters::default(),
            contract_call: ContractCallFeeParameters::default(),
            inter_contract_call: BasicFeeParameters { fee: 0 },
        }
    }
}

impl FeeSchedule {
    /// A schedule in which every operation is free. Handy for tests that do
    /// not exercise fees.
    pub fn zero() -> Self {
        Self {
            account_create: AccountCreateFeeParameters {
                basic_fee: 0,
                price_per_kbyte: 0,
            },
            transfer: TransferFeeParameters {
                fee: 0,
                price_per_kbyte: 0,
            },
            balance_lock_update: BasicFeeParameters { fee: 0 },
            contract_deploy: ContractDeployFeeParameters {
                fee: 0,
                price_per_kbyte: 0,
            },
            contract_call: ContractCallFeeParameters {
                fee: 0,
                price_per_kbyte_ram: 0,
                price_per_ms_cpu: 0,
            },
            inter_contract_call: BasicFeeParameters { fee: 0 },
        }
    }
}

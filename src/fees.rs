//! Fee policy: converts a byte count into a minimum-unit fee, matching
//! the reference client's own `CFeeRate` behavior (see the original
//! `cate/fees.py`): `floor(rate * bytes / 1000)`, floored up to `rate`
//! itself when that would otherwise round to zero.

/// A fee rate expressed in minimum-units per 1000 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeRate {
    sats_per_kb: u64,
}

impl FeeRate {
    pub fn new(sats_per_kb: u64) -> Self {
        Self { sats_per_kb }
    }

    pub fn sats_per_kb(&self) -> u64 {
        self.sats_per_kb
    }

    /// `fee_for_size(bytes)` from spec.md §4.2. Callers pass 1000 for
    /// refund-like single-input/single-output transactions and 2000 for
    /// commitment transactions with coin selection.
    pub fn fee_for_size(&self, bytes: u64) -> u64 {
        let fee = self.sats_per_kb * bytes / 1000;
        if fee == 0 && self.sats_per_kb > 0 {
            self.sats_per_kb
        } else {
            fee
        }
    }
}

//! Fee rate arithmetic.

/// A fee rate in satoshis per 1000 virtual bytes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct FeeRate {
    sat_per_kvb: i64,
}

impl FeeRate {
    pub fn from_sat_per_kvb(sat_per_kvb: i64) -> Self {
        Self {
            sat_per_kvb: sat_per_kvb.max(0),
        }
    }

    /// Rate implied by paying `fee` for `size` virtual bytes.
    pub fn from_fee_and_size(fee: i64, size: usize) -> Self {
        if size == 0 {
            return Self::default();
        }
        let size = i64::try_from(size).unwrap_or(i64::MAX);
        Self::from_sat_per_kvb(fee.saturating_mul(1000) / size)
    }

    pub fn sat_per_kvb(&self) -> i64 {
        self.sat_per_kvb
    }

    /// Fee for `size` virtual bytes, rounded down but never zero for a
    /// non-zero rate and size.
    pub fn fee(&self, size: usize) -> i64 {
        if self.sat_per_kvb == 0 || size == 0 {
            return 0;
        }
        let size = i64::try_from(size).unwrap_or(i64::MAX);
        let fee = self.sat_per_kvb.saturating_mul(size) / 1000;
        if fee == 0 {
            self.sat_per_kvb
        } else {
            fee
        }
    }
}

impl std::fmt::Display for FeeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} sat/kvB", self.sat_per_kvb)
    }
}

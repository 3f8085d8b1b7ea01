//! UTXO snapshot type and the view it is read through.

use std::collections::HashMap;
use std::sync::Mutex;

use blackd_primitives::outpoint::OutPoint;

/// One unspent output as the kernel checks see it.
///
/// `time` is the creating transaction's timestamp; zero for protocol versions
/// without transaction timestamps, in which case consumers substitute the
/// containing block's time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Coin {
    pub value: i64,
    pub script_pubkey: Vec<u8>,
    pub height: u32,
    pub is_coinbase: bool,
    pub is_coinstake: bool,
    pub time: u32,
}

/// Read access to the live UTXO set. Spent coins are absent.
pub trait UtxoView {
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin>;
}

/// In-memory UTXO view, used by tests and by the staker's self-checks when a
/// caller already holds a coin snapshot.
#[derive(Default)]
pub struct MemoryUtxoView {
    coins: Mutex<HashMap<OutPoint, Coin>>,
}

impl MemoryUtxoView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, outpoint: OutPoint, coin: Coin) {
        if let Ok(mut coins) = self.coins.lock() {
            coins.insert(outpoint, coin);
        }
    }

    pub fn spend(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.lock().ok()?.remove(outpoint)
    }
}

impl UtxoView for MemoryUtxoView {
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.lock().ok()?.get(outpoint).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin(value: i64) -> Coin {
        Coin {
            value,
            script_pubkey: vec![0x51],
            height: 7,
            is_coinbase: false,
            is_coinstake: false,
            time: 1_700_000_000,
        }
    }

    #[test]
    fn memory_view_add_get_spend() {
        let view = MemoryUtxoView::new();
        let outpoint = OutPoint::new([0x11; 32], 0);
        assert!(view.get_coin(&outpoint).is_none());

        view.add(outpoint.clone(), coin(500));
        assert_eq!(view.get_coin(&outpoint).map(|c| c.value), Some(500));

        assert!(view.spend(&outpoint).is_some());
        assert!(view.get_coin(&outpoint).is_none());
    }
}

//! Order payload carried from the gateway to the matching thread.
//!
//! Plain data with no behaviour of its own. Kept `Copy` so a push is a
//! single memcpy into the ring slot.

/// Order side (bid = buy, ask = sell)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    #[default]
    Bid = 0,
    /// Sell side (asks)
    Ask = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

/// A new order as received by the gateway.
///
/// The default value (all zero, `Bid`) is what a pool slot holds while free.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Order {
    /// External order ID (client-assigned)
    pub id: u64,
    /// Fixed-point price (e.g., $100.50 -> 10050000)
    pub price: u64,
    /// Order quantity
    pub qty: u32,
    /// Order side (bid/ask)
    pub side: Side,
}

impl Order {
    #[inline]
    pub const fn new(id: u64, price: u64, qty: u32, side: Side) -> Self {
        Self {
            id,
            price,
            qty,
            side,
        }
    }

    #[inline]
    pub const fn is_buy(&self) -> bool {
        matches!(self.side, Side::Bid)
    }
}

// Two orders per cache line
const _: () = assert!(std::mem::size_of::<Order>() <= 32);

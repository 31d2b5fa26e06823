//! Small fixture helpers.

use ritual_core::Address;

/// Deterministic provider address for cohort member `i`.
pub fn provider(i: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0xaa;
    bytes[19] = i;
    Address(bytes)
}

/// `n` distinct providers in enrollment order.
pub fn cohort(n: u8) -> Vec<Address> {
    (0..n).map(provider).collect()
}

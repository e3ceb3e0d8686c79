//! Hash slot calculation.
//!
//! The engine hashes [`Route::SlotKey`] keys itself. Computing the slot
//! client-side is only needed to group keys before routing, or to pin a
//! request to the slot of a key with [`Route::resolve_slot`].

use crc::{Crc, CRC_16_XMODEM};

use super::route::{Route, SLOT_COUNT};

/// CRC-16/XMODEM, the cluster key hash.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Calculates the hash slot of a key.
///
/// If the key contains a non-empty `{...}` section, only the first such
/// section is hashed, so keys sharing a hash tag share a slot.
///
/// # Examples
///
/// ```
/// use muxis_bridge::key_slot;
///
/// assert_eq!(key_slot(b"foo"), 12182);
/// assert_eq!(key_slot(b"{user1000}.following"), key_slot(b"{user1000}.followers"));
/// ```
pub fn key_slot(key: &[u8]) -> u16 {
    CRC16.checksum(hash_tag(key)) % SLOT_COUNT
}

/// Returns the hashed part of a key.
fn hash_tag(key: &[u8]) -> &[u8] {
    let Some(open) = key.iter().position(|&b| b == b'{') else {
        return key;
    };
    match key[open + 1..].iter().position(|&b| b == b'}') {
        Some(len) if len > 0 => &key[open + 1..open + 1 + len],
        _ => key,
    }
}

impl Route {
    /// Replaces a [`Route::SlotKey`] with the [`Route::SlotId`] its key
    /// hashes to. Other routes are returned unchanged.
    pub fn resolve_slot(self) -> Route {
        match self {
            Route::SlotKey { slot_type, key } => Route::SlotId {
                slot_type,
                slot_id: i32::from(key_slot(key.as_bytes())),
            },
            other => other,
        }
    }
}

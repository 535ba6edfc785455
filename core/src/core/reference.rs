//! Payment reference construction for underlying-chain transactions
//!
//! Every ledger-relevant underlying payment carries a 32-byte reference that
//! ties it to the on-ledger operation that authorized it. References are
//! type-tagged: the first byte identifies the operation kind and the
//! remaining bytes carry the operation id, so a minting payment can never
//! satisfy a redemption match.

/// Reference type tag for minting payments.
const TYPE_MINTING: u8 = 0x01;
/// Reference type tag for redemption payments.
const TYPE_REDEMPTION: u8 = 0x02;
/// Reference type tag for announced withdrawals.
const TYPE_WITHDRAWAL: u8 = 0x03;

fn tagged(ty: u8, id: u64) -> String {
    format!("0x{:02x}{:062x}", ty, id)
}

/// Payment reference for a collateral reservation (and for self-minting,
/// where the reservation id is zero).
pub fn minting(reservation_id: u64) -> String {
    tagged(TYPE_MINTING, reservation_id)
}

/// Payment reference for a redemption request.
pub fn redemption(request_id: u64) -> String {
    tagged(TYPE_REDEMPTION, request_id)
}

/// Payment reference for an announced underlying withdrawal.
pub fn withdrawal_announcement(announcement_id: u64) -> String {
    tagged(TYPE_WITHDRAWAL, announcement_id)
}

use rand::{rngs::OsRng, RngCore};

pub const API_KEY_BYTES: usize = 32;
pub const ID_BYTES: usize = 16;

fn random_hex(len: usize) -> String {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Opaque bearer credential, 64 hex chars.
pub fn new_api_key() -> String {
    random_hex(API_KEY_BYTES)
}

/// Identifier for device sessions and QR handshakes, 32 hex chars.
pub fn new_id() -> String {
    random_hex(ID_BYTES)
}

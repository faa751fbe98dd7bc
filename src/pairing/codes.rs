//! Auxiliary pairing code generation.

use rand::Rng;

/// Length of the client-chosen code some protocol versions require.
pub const AUX_CODE_LEN: usize = 8;

/// Characters allowed in an auxiliary code. Uppercase only, without the
/// glyphs users confuse with digits.
const AUX_CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generate a random auxiliary pairing code.
pub fn generate_aux_code() -> String {
    let mut rng = rand::thread_rng();
    (0..AUX_CODE_LEN)
        .map(|_| AUX_CODE_CHARSET[rng.gen_range(0..AUX_CODE_CHARSET.len())] as char)
        .collect()
}

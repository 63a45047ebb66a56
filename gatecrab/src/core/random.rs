use rand::RngCore;
use rand::rngs::OsRng;

const TOKEN_BYTES: usize = 32;

/// Source of cryptographically secure random bytes used to mint tokens
///
/// The store never generates randomness itself; it asks the source it was
/// built with.
pub trait RandomSource: Send + Sync {
    fn fill_bytes(&self, dest: &mut [u8]);
}

/// Operating system CSPRNG via [`OsRng`]
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}

/// Draw a fresh token: `TOKEN_BYTES` random bytes as lowercase hex
pub(crate) fn random_token(source: &dyn RandomSource) -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    source.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

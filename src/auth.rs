use sha2::{Digest, Sha256};

/// The shared upload password, kept only as a digest.
#[derive(Clone)]
pub struct PasswordGuard {
    expected: [u8; 32],
}

impl PasswordGuard {
    pub fn new(password: &str) -> Self {
        Self {
            expected: Sha256::digest(password.as_bytes()).into(),
        }
    }

    /// Compares digests with a constant-time fold, so neither a matching
    /// prefix nor the password length shows up in the response time.
    pub fn matches(&self, supplied: &str) -> bool {
        let supplied: [u8; 32] = Sha256::digest(supplied.as_bytes()).into();
        self.expected
            .iter()
            .zip(supplied.iter())
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for PasswordGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordGuard(..)")
    }
}

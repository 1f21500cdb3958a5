use rand::{Rng, distr::Alphanumeric};

const TEMPORARY_PASSWORD_LEN: usize = 12;

/// One-time password handed out with access-granted emails.
pub fn generate_temporary_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TEMPORARY_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Lowercase blake3 hex digest; the only form in which a credential is stored.
pub fn hash_credential(secret: &str) -> String {
    blake3::hash(secret.as_bytes()).to_hex().to_string()
}

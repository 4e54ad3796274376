//! Generated key material: name suffixes, Windows admin passwords and
//! SSH keypairs

use crate::error::{Result, TestrigError};
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use ssh_key::private::{KeypairData, RsaKeypair};
use ssh_key::{LineEnding, PrivateKey};

pub const RSA_KEY_BITS: usize = 2048;
pub const PASSWORD_LENGTH: usize = 24;
const KEY_COMMENT: &str = "testrig";

/// 8 random bytes, hex-encoded
pub fn random_suffix() -> String {
    let bytes: [u8; 8] = rand::thread_rng().r#gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Alphanumeric password containing upper case, lower case and digits
pub fn generate_password() -> String {
    let mut rng = OsRng;
    loop {
        let candidate: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(PASSWORD_LENGTH)
            .map(char::from)
            .collect();

        let upper = candidate.chars().any(|c| c.is_ascii_uppercase());
        let lower = candidate.chars().any(|c| c.is_ascii_lowercase());
        let digit = candidate.chars().any(|c| c.is_ascii_digit());
        if upper && lower && digit {
            return candidate;
        }
    }
}

/// Generated SSH keypair
pub struct SshKeypair {
    /// OpenSSH private key file content
    pub private_openssh: String,

    /// `ssh-rsa AAAA... testrig`
    pub public_openssh: String,
}

impl std::fmt::Debug for SshKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshKeypair")
            .field("public_openssh", &self.public_openssh)
            .finish_non_exhaustive()
    }
}

/// Generate a 2048-bit RSA keypair. CPU-bound; run it off the async workers.
pub fn generate_ssh_keypair() -> Result<SshKeypair> {
    let keypair = RsaKeypair::random(&mut OsRng, RSA_KEY_BITS)
        .map_err(|e| TestrigError::KeyGeneration(e.to_string()))?;
    let private = PrivateKey::new(KeypairData::from(keypair), KEY_COMMENT)
        .map_err(|e| TestrigError::KeyGeneration(e.to_string()))?;

    let private_openssh = private
        .to_openssh(LineEnding::LF)
        .map_err(|e| TestrigError::KeyGeneration(e.to_string()))?
        .to_string();
    let public_openssh = private
        .public_key()
        .to_openssh()
        .map_err(|e| TestrigError::KeyGeneration(e.to_string()))?;

    Ok(SshKeypair {
        private_openssh,
        public_openssh,
    })
}

//! Shared HS256 signing secret
//!
//! The secret is process-wide and read-only once loaded. Its bytes are wiped
//! on drop and never printed through `Debug`.

use std::fmt;
use zeroize::Zeroize;

const MIN_SECRET_LENGTH: usize = 32; // 256 bits minimum
const RECOMMENDED_SECRET_LENGTH: usize = 64; // 512 bits recommended

/// Secret strength classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretStrength {
    /// Too short, too repetitive or too predictable
    Weak,
    /// Usable, below the recommended length
    Acceptable,
    /// Recommended length and entropy
    Strong,
}

/// Symmetric key shared by the token issuer and the auth gate
#[derive(Clone)]
pub struct SecretKey {
    bytes: Vec<u8>,
}

impl SecretKey {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: secret.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Classify the secret for HS256 use
    ///
    /// **Criteria**:
    /// - Minimum 32 bytes (256 bits)
    /// - Recommended 64 bytes (512 bits)
    /// - Shannon entropy >= 4.0 bits/byte
    /// - No runs of 4 repeated or sequential bytes
    pub fn strength(&self) -> SecretStrength {
        let bytes = self.bytes.as_slice();

        if bytes.len() < MIN_SECRET_LENGTH {
            return SecretStrength::Weak;
        }

        let entropy = shannon_entropy(bytes);
        if entropy < 4.0 || has_obvious_patterns(bytes) {
            return SecretStrength::Weak;
        }

        if bytes.len() >= RECOMMENDED_SECRET_LENGTH && entropy >= 5.0 {
            SecretStrength::Strong
        } else {
            SecretStrength::Acceptable
        }
    }
}

impl From<&str> for SecretKey {
    fn from(secret: &str) -> Self {
        Self::new(secret.as_bytes().to_vec())
    }
}

impl From<String> for SecretKey {
    fn from(secret: String) -> Self {
        Self::new(secret.into_bytes())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// Bits per byte (0-8 scale)
fn shannon_entropy(data: &[u8]) -> f64 {
    let mut freq = [0u32; 256];
    let len = data.len() as f64;

    for &byte in data {
        freq[byte as usize] += 1;
    }

    freq.iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

fn has_obvious_patterns(data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }

    let mut same_run = 1;
    let mut seq_run = 1;
    for window in data.windows(2) {
        same_run = if window[0] == window[1] { same_run + 1 } else { 1 };
        seq_run = if window[1] as i16 - window[0] as i16 == 1 {
            seq_run + 1
        } else {
            1
        };

        if same_run >= 4 || seq_run >= 4 {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_secret_is_weak() {
        assert_eq!(SecretKey::from("short").strength(), SecretStrength::Weak);
    }

    #[test]
    fn test_repeated_run_is_weak() {
        let secret = format!("aaaa{}", "Zq8#mP2!xR7@kL4$vN9%wT3^yB6&cF1*");
        assert_eq!(SecretKey::from(secret).strength(), SecretStrength::Weak);
    }

    #[test]
    fn test_sequential_run_is_weak() {
        let secret = format!("abcd{}", "Zq8#mP2!xR7@kL4$vN9%wT3^yB6&cF1*");
        assert_eq!(SecretKey::from(secret).strength(), SecretStrength::Weak);
    }

    #[test]
    fn test_acceptable_secret() {
        let secret = "Zq8#mP2!xR7@kL4$vN9%wT3^yB6&cF1*Hd5";
        assert_eq!(SecretKey::from(secret).strength(), SecretStrength::Acceptable);
    }

    #[test]
    fn test_strong_secret() {
        let secret = "Zq8#mP2!xR7@kL4$vN9%wT3^yB6&cF1*Hd5(Gs0)Jt?Ua<Eb>Wc;Xe:Yf[Ig]Oh{";
        assert_eq!(SecretKey::from(secret).strength(), SecretStrength::Strong);
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = SecretKey::from("your-very-secure-secret-key-change-in-production");
        let printed = format!("{:?}", key);
        assert!(!printed.contains("secure"));
        assert!(printed.contains("len"));
    }
}

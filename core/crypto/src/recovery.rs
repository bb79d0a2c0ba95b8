//! Recovery keys issued alongside master and custom passwords.

use rand::RngCore;
use std::fmt;

use phantomvault_common::{Error, Password, Result};

/// Number of hex groups in a recovery key.
pub const GROUP_COUNT: usize = 4;

/// A recovery key of the form `3F2A-91BC-0D4E-7781`.
///
/// Shown to the user once at issuance. Only its hash and wrapped copies
/// are ever persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct RecoveryKey(Password);

impl RecoveryKey {
    /// Generate a key from four random 16-bit groups.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let groups: Vec<String> = (0..GROUP_COUNT)
            .map(|_| format!("{:04X}", rng.next_u32() as u16))
            .collect();
        Self(Password::new(groups.join("-")))
    }

    /// Parse user input, tolerating whitespace and lowercase hex.
    ///
    /// # Errors
    /// - Returns a validation error if the input is not four hex groups
    pub fn parse(input: &str) -> Result<Self> {
        let normalized = input.trim().to_ascii_uppercase();
        let groups: Vec<&str> = normalized.split('-').collect();
        let well_formed = groups.len() == GROUP_COUNT
            && groups
                .iter()
                .all(|g| g.len() == 4 && g.chars().all(|c| c.is_ascii_hexdigit()));
        if !well_formed {
            return Err(Error::Validation(
                "Recovery key must look like XXXX-XXXX-XXXX-XXXX".to_string(),
            ));
        }
        Ok(Self(Password::new(normalized)))
    }

    /// The key text. Display it to the user, never log it.
    pub fn expose(&self) -> &str {
        self.0.expose()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The key as a password-like secret.
    pub fn as_password(&self) -> &Password {
        &self.0
    }
}

impl fmt::Debug for RecoveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoveryKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generate_format() {
        let key = RecoveryKey::generate();
        let text = key.expose();

        assert_eq!(text.len(), 19);
        assert_eq!(text.matches('-').count(), 3);
        assert!(RecoveryKey::parse(text).is_ok());
    }

    #[test]
    fn test_parse_normalizes() {
        let key = RecoveryKey::parse("  3f2a-91bc-0d4e-7781 \n").unwrap();
        assert_eq!(key.expose(), "3F2A-91BC-0D4E-7781");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(RecoveryKey::parse("3F2A-91BC-0D4E").is_err());
        assert!(RecoveryKey::parse("3F2A-91BC-0D4E-77G1").is_err());
        assert!(RecoveryKey::parse("3F2A91BC0D4E7781").is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = RecoveryKey::generate();
        assert_eq!(format!("{:?}", key), "RecoveryKey([REDACTED])");
    }

    proptest! {
        #[test]
        fn prop_rendered_groups_parse(groups in proptest::array::uniform4(any::<u16>())) {
            let text = groups
                .iter()
                .map(|g| format!("{:04x}", g))
                .collect::<Vec<_>>()
                .join("-");
            let key = RecoveryKey::parse(&text).unwrap();
            prop_assert_eq!(key.expose(), text.to_ascii_uppercase());
        }
    }
}

use std::fmt;

/// CRC-32 checksum of a device password, rendered as unpadded lowercase hex.
///
/// The firmware only uses this to sanity-check a shared secret; it is not
/// authentication. An empty digest means the device has no password.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    /// Derives the digest for an optional password.
    ///
    /// ```
    /// use switchbot::PasswordDigest;
    ///
    /// assert_eq!("cbf43926", PasswordDigest::from_password(Some("123456789")).as_str());
    /// assert!(PasswordDigest::from_password(Some("")).is_empty());
    /// assert!(PasswordDigest::from_password(None).is_empty());
    /// ```
    #[must_use]
    pub fn from_password(password: Option<&str>) -> Self {
        match password {
            None | Some("") => Self::default(),
            Some(password) => Self(render(crc32fast::hash(password.as_bytes()))),
        }
    }

    /// Returns the digest hex string; empty when there is no password.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns whether the device has no password.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PasswordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn render(checksum: u32) -> String {
    format!("{checksum:x}")
}

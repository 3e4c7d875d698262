use std::fmt;

use clap::ValueEnum;
use serde::Serialize;
use strum_macros::{Display, EnumIter};
use thiserror::Error;

use super::PasswordDigest;

const KEY_PREFIX: &str = "5701";
const KEY_PASSWORD_PREFIX: &str = "5711";
const STATUS_QUERY_PREFIX: &str = "5712";

/// Logical button action sent to the actuator.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Momentary press.
    #[strum(to_string = "press")]
    Press,
    /// Switch mode on.
    #[strum(to_string = "on")]
    On,
    /// Switch mode off.
    #[strum(to_string = "off")]
    Off,
}

impl Action {
    fn suffix(self) -> &'static str {
        match self {
            Self::Press => "00",
            Self::On => "01",
            Self::Off => "02",
        }
    }
}

/// Errors returned when converting a hex frame into raw bytes.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameCodecError {
    #[error("frame `{frame}` is not transmittable hex")]
    InvalidHex {
        frame: String,
        #[source]
        source: hex::FromHexError,
    },
}

/// Hexadecimal frame written to the command characteristic.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CommandFrame(String);

impl CommandFrame {
    /// Returns the frame as a hex string.
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Converts the frame into the bytes written over the air.
    ///
    /// # Errors
    ///
    /// Returns an error when the frame has an odd number of hex digits, which
    /// happens when the password digest renders to an odd width.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameCodecError> {
        hex::decode(&self.0).map_err(|source| FrameCodecError::InvalidHex {
            frame: self.0.clone(),
            source,
        })
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encoder for SwitchBot command and status-query frames.
pub struct CommandCodec;

impl CommandCodec {
    /// Encodes one action frame.
    ///
    /// ```
    /// use switchbot::{Action, CommandCodec, PasswordDigest};
    ///
    /// let frame = CommandCodec::encode(Action::On, &PasswordDigest::default());
    /// assert_eq!("570101", frame.as_hex());
    /// ```
    #[must_use]
    pub fn encode(action: Action, digest: &PasswordDigest) -> CommandFrame {
        if digest.is_empty() {
            CommandFrame(format!("{KEY_PREFIX}{}", action.suffix()))
        } else {
            CommandFrame(format!("{KEY_PASSWORD_PREFIX}{digest}{}", action.suffix()))
        }
    }

    /// Encodes the battery/firmware status query frame.
    #[must_use]
    pub fn status_query(digest: &PasswordDigest) -> CommandFrame {
        CommandFrame(format!("{STATUS_QUERY_PREFIX}{digest}"))
    }
}

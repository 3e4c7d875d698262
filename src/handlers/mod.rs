mod command_codec;
mod command_sender;
mod password_digest;
mod status_refresher;

pub use self::command_codec::{Action, CommandCodec, CommandFrame, FrameCodecError};
pub(crate) use self::command_sender::CommandSender;
pub use self::command_sender::SendReceipt;
pub use self::password_digest::PasswordDigest;

use thiserror::Error;

use itemnet_types::TypesError;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("not a notification packet: kind {0}")]
    WrongPacketKind(u8),

    #[error("packet origin {0} is not in the topology")]
    UnknownOrigin(u32),

    #[error("too many notifications in packet: {count} > {max}")]
    TooManyNotifications { count: u32, max: u32 },

    #[error("truncated input: need {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("invalid boolean byte: {0}")]
    InvalidBool(u8),

    #[error("unregistered notification code: {0}")]
    UnknownCode(u8),

    #[error("unknown parcel type: {0}")]
    UnknownParcelType(u8),

    #[error("notification body has {0} unread bytes")]
    TrailingBytes(usize),

    #[error("invalid value: {0}")]
    Types(#[from] TypesError),
}

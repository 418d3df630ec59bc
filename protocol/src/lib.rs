//! Wire protocol: notification encoding/decoding and packet framing.
//!
//! Nodes learn each other's opinion about items by exchanging
//! [`Notification`]s. Several notifications travel together in one packet;
//! see [`packet`] for the byte layout.

pub mod codec;
pub mod error;
pub mod notification;
pub mod packet;

pub use codec::{WireCodec, WireReader, WireWriter};
pub use error::ProtocolError;
pub use notification::{
    ItemNotification, Notification, NotificationCode, ParcelNotification, ParcelType,
    ResyncKind, ResyncNotification,
};
pub use packet::{
    decode_packet, encode_packet, encode_packets, DecodedPacket, MAX_NOTIFICATIONS_PER_PACKET,
    NOTIFICATION_PACKET,
};

//! Packet framing.
//!
//! ```text
//! u8  kind          NOTIFICATION_PACKET
//! u32 origin        sender node number
//! u32 count         <= MAX_NOTIFICATIONS_PER_PACKET
//! count x { u8 code | u32 body_len | body }
//! ```
//!
//! Header problems fail the whole packet. A body that cannot be decoded
//! only drops that notification, since its length prefix keeps the framing
//! intact.

use itemnet_types::NodeInfo;
use tracing::{debug, warn};

use crate::codec::{WireReader, WireWriter};
use crate::notification::{Notification, NotificationCode};
use crate::ProtocolError;

pub const NOTIFICATION_PACKET: u8 = 3;
pub const MAX_NOTIFICATIONS_PER_PACKET: usize = 1000;

/// Result of decoding one packet.
#[derive(Debug)]
pub struct DecodedPacket {
    pub from: NodeInfo,
    pub notifications: Vec<Notification>,
    /// Notifications dropped because of unknown codes or bad bodies.
    pub skipped: usize,
}

/// Encode up to [`MAX_NOTIFICATIONS_PER_PACKET`] notifications sent by
/// `origin` into one packet.
pub fn encode_packet(
    origin: &NodeInfo,
    notifications: &[Notification],
) -> Result<Vec<u8>, ProtocolError> {
    if notifications.len() > MAX_NOTIFICATIONS_PER_PACKET {
        return Err(ProtocolError::TooManyNotifications {
            count: notifications.len() as u32,
            max: MAX_NOTIFICATIONS_PER_PACKET as u32,
        });
    }

    let mut w = WireWriter::new();
    w.put_u8(NOTIFICATION_PACKET);
    w.put_u32(origin.number);
    w.put_u32(notifications.len() as u32);
    for n in notifications {
        let mut body = WireWriter::new();
        n.encode_body(&mut body);
        w.put_u8(n.code().as_byte());
        w.put_u32(body.len() as u32);
        w.put_bytes(&body.into_bytes());
    }
    Ok(w.into_bytes())
}

/// Split an arbitrary number of notifications into as many packets as
/// needed.
pub fn encode_packets(
    origin: &NodeInfo,
    notifications: &[Notification],
) -> Result<Vec<Vec<u8>>, ProtocolError> {
    notifications
        .chunks(MAX_NOTIFICATIONS_PER_PACKET)
        .map(|chunk| encode_packet(origin, chunk))
        .collect()
}

/// Decode a packet. `resolve` maps the origin number to a known node; an
/// unknown origin rejects the packet.
pub fn decode_packet<F>(data: &[u8], resolve: F) -> Result<DecodedPacket, ProtocolError>
where
    F: Fn(u32) -> Option<NodeInfo>,
{
    let mut r = WireReader::new(data);

    let kind = r.get_u8()?;
    if kind != NOTIFICATION_PACKET {
        return Err(ProtocolError::WrongPacketKind(kind));
    }
    let origin = r.get_u32()?;
    let from = resolve(origin).ok_or(ProtocolError::UnknownOrigin(origin))?;
    let count = r.get_u32()?;
    if count as usize > MAX_NOTIFICATIONS_PER_PACKET {
        return Err(ProtocolError::TooManyNotifications {
            count,
            max: MAX_NOTIFICATIONS_PER_PACKET as u32,
        });
    }

    let mut notifications = Vec::with_capacity(count as usize);
    let mut skipped = 0;
    for index in 0..count {
        let code = r.get_u8()?;
        let len = r.get_u32()? as usize;
        let body = r.take(len)?;

        let Some(code) = NotificationCode::from_byte(code) else {
            warn!(from = %from, index, code, "skipping notification with unregistered code");
            skipped += 1;
            continue;
        };
        match Notification::decode_body(code, from.clone(), body) {
            Ok(n) => notifications.push(n),
            Err(e) => {
                warn!(from = %from, index, error = %e, "skipping undecodable notification");
                skipped += 1;
            }
        }
    }

    if !r.is_empty() {
        warn!(from = %from, trailing = r.remaining(), "ignoring trailing bytes after last notification");
    }
    debug!(from = %from, count, skipped, "decoded notification packet");

    Ok(DecodedPacket {
        from,
        notifications,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{ItemNotification, ResyncNotification};
    use itemnet_types::{HashId, ItemResult, ItemState};

    fn node(n: u32) -> NodeInfo {
        NodeInfo::new(n, format!("node-{n}"))
    }

    fn resolve_known(n: u32) -> Option<NodeInfo> {
        (n < 10).then(|| node(n))
    }

    fn header(kind: u8, origin: u32, count: u32) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.put_u8(kind);
        w.put_u32(origin);
        w.put_u32(count);
        w.into_bytes()
    }

    #[test]
    fn packet_round_trip_sets_sender_from_origin() {
        let id = HashId::of(b"item");
        let sent = vec![
            Notification::from(ResyncNotification::request(node(1), id)),
            Notification::from(ResyncNotification::answer(node(1), id, ItemState::Approved, false)),
            Notification::from(ItemNotification::new(node(1), id, ItemResult::UNDEFINED, true)),
        ];
        let bytes = encode_packet(&node(1), &sent).unwrap();
        let decoded = decode_packet(&bytes, resolve_known).unwrap();
        assert_eq!(decoded.from, node(1));
        assert_eq!(decoded.skipped, 0);
        assert_eq!(decoded.notifications, sent);
    }

    #[test]
    fn header_layout() {
        let bytes = encode_packet(&node(7), &[]).unwrap();
        assert_eq!(bytes, vec![3, 0, 0, 0, 7, 0, 0, 0, 0]);
    }

    #[test]
    fn wrong_kind_rejected() {
        let bytes = header(2, 1, 0);
        assert!(matches!(
            decode_packet(&bytes, resolve_known),
            Err(ProtocolError::WrongPacketKind(2))
        ));
    }

    #[test]
    fn unknown_origin_rejected() {
        let bytes = header(NOTIFICATION_PACKET, 42, 0);
        assert!(matches!(
            decode_packet(&bytes, resolve_known),
            Err(ProtocolError::UnknownOrigin(42))
        ));
    }

    #[test]
    fn oversized_count_rejected_before_bodies() {
        // count 5000 with no bodies at all: rejected on the count, not on truncation
        let bytes = header(NOTIFICATION_PACKET, 1, 5000);
        assert!(matches!(
            decode_packet(&bytes, resolve_known),
            Err(ProtocolError::TooManyNotifications { count: 5000, max: 1000 })
        ));
    }

    #[test]
    fn unknown_code_skips_only_that_notification() {
        let id = HashId::of(b"a");
        let good = Notification::from(ResyncNotification::request(node(1), id));
        let mut bytes = encode_packet(&node(1), &[good.clone()]).unwrap();
        // bump count to 2 and append a notification with code 9
        bytes[8] = 2;
        bytes.extend_from_slice(&[9, 0, 0, 0, 2, 0xAA, 0xBB]);
        let decoded = decode_packet(&bytes, resolve_known).unwrap();
        assert_eq!(decoded.notifications, vec![good]);
        assert_eq!(decoded.skipped, 1);
    }

    #[test]
    fn bad_body_skips_only_that_notification() {
        let id = HashId::of(b"b");
        let good = Notification::from(ResyncNotification::answer(node(1), id, ItemState::Declined, true));
        let mut bytes = header(NOTIFICATION_PACKET, 1, 2);
        // resync body too short to hold an id
        bytes.extend_from_slice(&[1, 0, 0, 0, 3, 1, 2, 3]);
        let tail = encode_packet(&node(1), &[good.clone()]).unwrap();
        bytes.extend_from_slice(&tail[9..]);
        let decoded = decode_packet(&bytes, resolve_known).unwrap();
        assert_eq!(decoded.notifications, vec![good]);
        assert_eq!(decoded.skipped, 1);
    }

    #[test]
    fn body_running_past_end_fails_packet() {
        let mut bytes = header(NOTIFICATION_PACKET, 1, 1);
        bytes.extend_from_slice(&[1, 0, 0, 1, 0, 0]);
        assert!(matches!(
            decode_packet(&bytes, resolve_known),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn trailing_bytes_are_tolerated() {
        let id = HashId::of(b"c");
        let good = Notification::from(ResyncNotification::request(node(2), id));
        let mut bytes = encode_packet(&node(2), &[good.clone()]).unwrap();
        bytes.extend_from_slice(&[0, 0]);
        let decoded = decode_packet(&bytes, resolve_known).unwrap();
        assert_eq!(decoded.notifications, vec![good]);
    }

    #[test]
    fn encode_refuses_oversized_batch() {
        let id = HashId::of(b"d");
        let many = vec![Notification::from(ResyncNotification::request(node(1), id)); 1001];
        assert!(encode_packet(&node(1), &many).is_err());
        let packets = encode_packets(&node(1), &many).unwrap();
        assert_eq!(packets.len(), 2);
        let second = decode_packet(&packets[1], resolve_known).unwrap();
        assert_eq!(second.notifications.len(), 1);
    }
}

//! Notifications nodes exchange about items.
//!
//! The set of variants is closed; each carries an explicit wire code. The
//! sender identity (`from`) is never encoded. The receiver fills it in from
//! the packet origin, so a peer cannot claim to speak for another node.

use itemnet_types::{HashId, ItemResult, ItemState, NodeInfo};

use crate::codec::{WireCodec, WireReader, WireWriter};
use crate::ProtocolError;

/// Wire discriminant of a notification variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NotificationCode {
    Item = 0,
    Resync = 1,
    Parcel = 2,
}

impl NotificationCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Item),
            1 => Some(Self::Resync),
            2 => Some(Self::Parcel),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Generic item notification: the sender's view of an item, optionally
/// asking the receiver to reply with its own view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemNotification {
    pub from: NodeInfo,
    pub item_id: HashId,
    pub item_result: ItemResult,
    pub answer_is_requested: bool,
}

impl ItemNotification {
    pub fn new(
        from: NodeInfo,
        item_id: HashId,
        item_result: ItemResult,
        answer_is_requested: bool,
    ) -> Self {
        Self {
            from,
            item_id,
            item_result,
            answer_is_requested,
        }
    }

    fn encode_body(&self, w: &mut WireWriter) {
        self.item_id.encode(w);
        self.item_result.encode(w);
        w.put_bool(self.answer_is_requested);
    }

    fn decode_body(from: NodeInfo, r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let item_id = HashId::decode(r)?;
        let item_result = ItemResult::decode(r)?;
        let answer_is_requested = r.get_bool()?;
        Ok(Self {
            from,
            item_id,
            item_result,
            answer_is_requested,
        })
    }
}

/// Whether a resync notification asks for a vote or carries one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResyncKind {
    Request,
    Answer {
        item_state: ItemState,
        has_environment: bool,
    },
}

/// Resync traffic: a poll for a peer's vote on an item, or the vote itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResyncNotification {
    pub from: NodeInfo,
    pub item_id: HashId,
    pub kind: ResyncKind,
}

impl ResyncNotification {
    pub fn request(from: NodeInfo, item_id: HashId) -> Self {
        Self {
            from,
            item_id,
            kind: ResyncKind::Request,
        }
    }

    pub fn answer(
        from: NodeInfo,
        item_id: HashId,
        item_state: ItemState,
        has_environment: bool,
    ) -> Self {
        Self {
            from,
            item_id,
            kind: ResyncKind::Answer {
                item_state,
                has_environment,
            },
        }
    }

    pub fn answer_is_requested(&self) -> bool {
        matches!(self.kind, ResyncKind::Request)
    }

    /// The voted state, present only on answers.
    pub fn item_state(&self) -> Option<ItemState> {
        match self.kind {
            ResyncKind::Answer { item_state, .. } => Some(item_state),
            ResyncKind::Request => None,
        }
    }

    pub fn has_environment(&self) -> bool {
        matches!(
            self.kind,
            ResyncKind::Answer {
                has_environment: true,
                ..
            }
        )
    }

    fn encode_body(&self, w: &mut WireWriter) {
        self.item_id.encode(w);
        match self.kind {
            ResyncKind::Request => w.put_bool(true),
            ResyncKind::Answer {
                item_state,
                has_environment,
            } => {
                w.put_bool(false);
                item_state.encode(w);
                w.put_bool(has_environment);
            }
        }
    }

    fn decode_body(from: NodeInfo, r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let item_id = HashId::decode(r)?;
        let kind = if r.get_bool()? {
            ResyncKind::Request
        } else {
            ResyncKind::Answer {
                item_state: ItemState::decode(r)?,
                has_environment: r.get_bool()?,
            }
        };
        Ok(Self {
            from,
            item_id,
            kind,
        })
    }
}

/// Role of an item inside a parcel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ParcelType {
    Payment = 0,
    Payload = 1,
}

impl ParcelType {
    fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            0 => Ok(Self::Payment),
            1 => Ok(Self::Payload),
            other => Err(ProtocolError::UnknownParcelType(other)),
        }
    }
}

/// Item notification scoped to one half of a payment/payload parcel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParcelNotification {
    pub item: ItemNotification,
    pub parcel_id: HashId,
    pub parcel_type: ParcelType,
}

impl ParcelNotification {
    fn encode_body(&self, w: &mut WireWriter) {
        self.item.encode_body(w);
        self.parcel_id.encode(w);
        w.put_u8(self.parcel_type as u8);
    }

    fn decode_body(from: NodeInfo, r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let item = ItemNotification::decode_body(from, r)?;
        let parcel_id = HashId::decode(r)?;
        let parcel_type = ParcelType::from_byte(r.get_u8()?)?;
        Ok(Self {
            item,
            parcel_id,
            parcel_type,
        })
    }
}

/// Any notification a node can send or receive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    Item(ItemNotification),
    Resync(ResyncNotification),
    Parcel(ParcelNotification),
}

impl Notification {
    pub fn code(&self) -> NotificationCode {
        match self {
            Self::Item(_) => NotificationCode::Item,
            Self::Resync(_) => NotificationCode::Resync,
            Self::Parcel(_) => NotificationCode::Parcel,
        }
    }

    pub fn sender(&self) -> &NodeInfo {
        match self {
            Self::Item(n) => &n.from,
            Self::Resync(n) => &n.from,
            Self::Parcel(n) => &n.item.from,
        }
    }

    pub fn item_id(&self) -> HashId {
        match self {
            Self::Item(n) => n.item_id,
            Self::Resync(n) => n.item_id,
            Self::Parcel(n) => n.item.item_id,
        }
    }

    /// Short label for logs and spans.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Item(_) => "item",
            Self::Resync(_) => "resync",
            Self::Parcel(_) => "parcel",
        }
    }

    pub fn encode_body(&self, w: &mut WireWriter) {
        match self {
            Self::Item(n) => n.encode_body(w),
            Self::Resync(n) => n.encode_body(w),
            Self::Parcel(n) => n.encode_body(w),
        }
    }

    /// Decode one notification body. The whole body must be consumed.
    pub fn decode_body(
        code: NotificationCode,
        from: NodeInfo,
        body: &[u8],
    ) -> Result<Self, ProtocolError> {
        let mut r = WireReader::new(body);
        let notification = match code {
            NotificationCode::Item => Self::Item(ItemNotification::decode_body(from, &mut r)?),
            NotificationCode::Resync => {
                Self::Resync(ResyncNotification::decode_body(from, &mut r)?)
            }
            NotificationCode::Parcel => {
                Self::Parcel(ParcelNotification::decode_body(from, &mut r)?)
            }
        };
        if !r.is_empty() {
            return Err(ProtocolError::TrailingBytes(r.remaining()));
        }
        Ok(notification)
    }
}

impl From<ItemNotification> for Notification {
    fn from(n: ItemNotification) -> Self {
        Self::Item(n)
    }
}

impl From<ResyncNotification> for Notification {
    fn from(n: ResyncNotification) -> Self {
        Self::Resync(n)
    }
}

impl From<ParcelNotification> for Notification {
    fn from(n: ParcelNotification) -> Self {
        Self::Parcel(n)
    }
}

//! Byte-level primitives for the compact wire form.
//!
//! All integers are big-endian. Booleans are a single `0`/`1` byte; any other
//! value is rejected. A null timestamp is written as `0` seconds.

use itemnet_types::{HashId, ItemResult, ItemState, Timestamp};

use crate::ProtocolError;

/// Append-only buffer for encoding.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_timestamp(&mut self, ts: Option<Timestamp>) {
        self.put_u64(ts.map(|t| t.as_secs()).unwrap_or(0));
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over received bytes.
#[derive(Debug)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn get_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn get_u64(&mut self) -> Result<u64, ProtocolError> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    pub fn get_bool(&mut self) -> Result<bool, ProtocolError> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::InvalidBool(other)),
        }
    }

    pub fn get_timestamp(&mut self) -> Result<Option<Timestamp>, ProtocolError> {
        let secs = self.get_u64()?;
        Ok((secs != 0).then(|| Timestamp::new(secs)))
    }
}

/// A value with a compact wire representation.
pub trait WireCodec: Sized {
    fn encode(&self, w: &mut WireWriter);
    fn decode(r: &mut WireReader<'_>) -> Result<Self, ProtocolError>;
}

impl WireCodec for HashId {
    fn encode(&self, w: &mut WireWriter) {
        w.put_bytes(self.as_bytes());
    }

    fn decode(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(HashId::new(r.take_array()?))
    }
}

impl WireCodec for ItemState {
    fn encode(&self, w: &mut WireWriter) {
        w.put_u8(self.ordinal());
    }

    fn decode(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(ItemState::from_ordinal(r.get_u8()?)?)
    }
}

/// Narrow form: state, timestamps and possession only. Errors and the
/// locking item are not carried on this path.
impl WireCodec for ItemResult {
    fn encode(&self, w: &mut WireWriter) {
        self.state().encode(w);
        w.put_timestamp(self.created_at());
        w.put_timestamp(self.expires_at());
        w.put_bool(self.have_copy());
    }

    fn decode(r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let state = ItemState::decode(r)?;
        let created_at = r.get_timestamp()?;
        let expires_at = r.get_timestamp()?;
        let have_copy = r.get_bool()?;
        Ok(ItemResult::new(state, have_copy, created_at, expires_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemnet_types::ErrorRecord;

    #[test]
    fn integers_are_big_endian() {
        let mut w = WireWriter::new();
        w.put_u32(0x0102_0304);
        w.put_u64(5);
        assert_eq!(
            w.into_bytes(),
            vec![1, 2, 3, 4, 0, 0, 0, 0, 0, 0, 0, 5]
        );
    }

    #[test]
    fn truncated_read_reports_sizes() {
        let mut r = WireReader::new(&[0, 1]);
        match r.get_u32() {
            Err(ProtocolError::Truncated { needed, remaining }) => {
                assert_eq!(needed, 4);
                assert_eq!(remaining, 2);
            }
            other => panic!("expected Truncated, got {:?}", other),
        }
    }

    #[test]
    fn bool_rejects_other_bytes() {
        let mut r = WireReader::new(&[2]);
        assert!(matches!(r.get_bool(), Err(ProtocolError::InvalidBool(2))));
    }

    #[test]
    fn item_result_compact_layout() {
        let result = ItemResult::new(
            ItemState::Approved,
            true,
            Some(Timestamp::new(1000)),
            None,
        );
        let mut w = WireWriter::new();
        result.encode(&mut w);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 1 + 8 + 8 + 1);
        assert_eq!(bytes[0], 4);
        assert_eq!(&bytes[1..9], &1000u64.to_be_bytes());
        assert_eq!(&bytes[9..17], &[0u8; 8]);
        assert_eq!(bytes[17], 1);
    }

    #[test]
    fn compact_form_drops_errors() {
        let result = ItemResult::new(ItemState::Declined, false, Some(Timestamp::new(7)), None)
            .with_errors(vec![ErrorRecord::new("FAILED_CHECK", "", "bad")]);
        let mut w = WireWriter::new();
        result.encode(&mut w);
        let bytes = w.into_bytes();
        let decoded = ItemResult::decode(&mut WireReader::new(&bytes)).unwrap();
        assert_eq!(decoded.state(), ItemState::Declined);
        assert_eq!(decoded.created_at(), Some(Timestamp::new(7)));
        assert!(decoded.errors().is_empty());
    }

    #[test]
    fn unknown_state_ordinal_is_an_error() {
        let mut r = WireReader::new(&[42]);
        assert!(matches!(
            ItemState::decode(&mut r),
            Err(ProtocolError::Types(_))
        ));
    }
}

use bytes::{BufMut, BytesMut};

use crate::{AttrFlags, AttrType};

/// Path attribute encoding: the implementor writes the value and the
/// trait writes the flags/type/length header around it.
pub trait AttrEmitter {
    fn attr_flags(&self) -> AttrFlags;

    fn attr_type(&self) -> AttrType;

    /// Value length when it is known up front. `None` makes `attr_emit`
    /// buffer the value first.
    fn len(&self) -> Option<usize>;

    fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    fn emit(&self, buf: &mut BytesMut);

    fn attr_emit(&self, buf: &mut BytesMut) {
        let emit_header = |buf: &mut BytesMut, len: usize| {
            if len > 255 {
                buf.put_u8(self.attr_flags().with_extended(true).into());
                buf.put_u8(self.attr_type().into());
                buf.put_u16(len as u16);
            } else {
                buf.put_u8(self.attr_flags().into());
                buf.put_u8(self.attr_type().into());
                buf.put_u8(len as u8);
            }
        };

        match self.len() {
            Some(len) => {
                emit_header(buf, len);
                self.emit(buf);
            }
            None => {
                let mut value = BytesMut::new();
                self.emit(&mut value);
                emit_header(buf, value.len());
                buf.put(&value[..]);
            }
        }
    }

    /// Encodes the whole attribute into a fresh buffer.
    fn attr_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.attr_emit(&mut buf);
        buf
    }
}

//! Bounds-checked byte cursor shared by all decoders.

use uuid::Uuid;

use crate::varint;

/// A read cursor over a borrowed buffer. Every accessor returns `None`
/// instead of reading past the end.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if n > self.buf.len() {
            return None;
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Some(head)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.take(N)?.try_into().ok()
    }

    pub(crate) fn u8(&mut self) -> Option<u8> {
        Some(self.array::<1>()?[0])
    }

    pub(crate) fn u16_le(&mut self) -> Option<u16> {
        Some(u16::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32_le(&mut self) -> Option<u32> {
        Some(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn i32_be(&mut self) -> Option<i32> {
        Some(i32::from_be_bytes(self.array()?))
    }

    pub(crate) fn i64_be(&mut self) -> Option<i64> {
        Some(i64::from_be_bytes(self.array()?))
    }

    pub(crate) fn uuid(&mut self) -> Option<Uuid> {
        Some(Uuid::from_bytes(self.array()?))
    }

    pub(crate) fn varint(&mut self) -> Option<u32> {
        varint::read(&mut self.buf)
    }

    /// Varint-prefixed bytes, rejected before allocation if longer than `max`.
    pub(crate) fn var_bytes(&mut self, max: usize) -> Option<&'a [u8]> {
        let len = self.varint()? as usize;
        if len > max {
            return None;
        }
        self.take(len)
    }

    pub(crate) fn var_string(&mut self, max: usize) -> Option<String> {
        let bytes = self.var_bytes(max)?;
        String::from_utf8(bytes.to_vec()).ok()
    }

    /// `i32` big-endian length prefix followed by that many bytes.
    pub(crate) fn sized_bytes(&mut self) -> Option<&'a [u8]> {
        let len = usize::try_from(self.i32_be()?).ok()?;
        self.take(len)
    }

    pub(crate) fn sized_string(&mut self) -> Option<String> {
        let bytes = self.sized_bytes()?;
        String::from_utf8(bytes.to_vec()).ok()
    }
}

pub(crate) fn put_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    varint::write(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

pub(crate) fn put_sized_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
    out.extend_from_slice(bytes);
}

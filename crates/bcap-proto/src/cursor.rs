//! Checked little-endian byte cursor.
//!
//! Decoding walks untrusted bytes from the network (and, for the fuzz
//! targets, from an arbitrary byte soup). Every read is bounds-checked and
//! returns `E_INVALID_PACKET` on underrun rather than panicking.

use crate::error::{Error, Result};

pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::invalid_packet(format!(
                "expected {n} more bytes, only {} remain",
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.take(N)?;
        let mut arr = [0u8; N];
        arr.copy_from_slice(slice);
        Ok(arr)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn i8(&mut self) -> Result<i8> {
        Ok(self.u8()? as i8)
    }

    pub(crate) fn u16_le(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub(crate) fn i16_le(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.take_array()?))
    }

    pub(crate) fn u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub(crate) fn i32_le(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub(crate) fn u64_le(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub(crate) fn i64_le(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    pub(crate) fn f32_le(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    pub(crate) fn f64_le(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take_array()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_scalars() {
        let bytes = [0x01, 0x00, 0x02, 0x00, 0x00, 0x00];
        let mut cur = Cursor::new(&bytes);
        assert_eq!(cur.u16_le().unwrap(), 1);
        assert_eq!(cur.u32_le().unwrap(), 2);
        assert_eq!(cur.remaining(), 0);
    }

    #[test]
    fn underrun_is_an_error_not_a_panic() {
        let bytes = [0x01];
        let mut cur = Cursor::new(&bytes);
        assert!(cur.u32_le().is_err());
    }
}

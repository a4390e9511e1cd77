use std::io::{self, Read, Write};

use bytemuck::cast_slice;

pub fn as_word_slice(input: &[u8]) -> &[u16] {
    cast_slice(input)
}

pub fn as_byte_slice(input: &[u16]) -> &[u8] {
    cast_slice(input)
}

////////////////////////////////////////////////////////////////////////////////

pub trait ReadU16 {
    fn read_u16(&mut self) -> io::Result<u16>;
}

impl<T: Read> ReadU16 for T {
    fn read_u16(&mut self) -> io::Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        let lower = buf[0] as u16;
        let upper = buf[1] as u16;
        Ok(lower | (upper << u8::BITS))
    }
}

////////////////////////////////////////////////////////////////////////////////

pub trait WriteU16 {
    fn write_u16(&mut self, val: u16) -> io::Result<()>;
}

impl<T: Write> WriteU16 for T {
    fn write_u16(&mut self, val: u16) -> io::Result<()> {
        let lower = val as u8;
        let upper = (val >> u8::BITS) as u8;
        self.write_all(&[lower, upper])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_round_trip() {
        let mut buf = Vec::new();
        buf.write_u16(0o7402).unwrap();
        buf.write_u16(0o0001).unwrap();
        assert_eq!(buf, &[0x02, 0x0f, 0x01, 0x00]);

        let mut cursor = buf.as_slice();
        assert_eq!(cursor.read_u16().unwrap(), 0o7402);
        assert_eq!(cursor.read_u16().unwrap(), 0o0001);
        assert!(cursor.read_u16().is_err());
    }
}

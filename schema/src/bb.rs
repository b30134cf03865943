use crate::error::DecodeError;
use crate::types::WireType;

/// Longest legal varint: ten groups of seven bits cover all 64 bits.
pub const MAX_VARINT_LEN: usize = 10;

/// Maps a signed 32-bit integer onto an unsigned one so that values of small
/// magnitude stay small.
pub fn zigzag_encode32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

pub fn zigzag_decode32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

pub fn zigzag_encode64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn zigzag_decode64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// A protobuf byte buffer meant for reading.
///
/// Example usage:
///
/// ```
/// let mut bb = brine_proto_schema::ByteBuffer::new(&[0x96, 0x01, 0x03, 0x61, 0x62, 0x63]);
/// assert_eq!(bb.read_var_uint32(), Ok(150));
/// assert_eq!(bb.read_string(), Ok("abc".to_owned()));
/// assert!(bb.is_empty());
/// ```
///
pub struct ByteBuffer<'a> {
    data: &'a [u8],
    index: usize,
}

impl<'a> ByteBuffer<'a> {
    /// Create a new ByteBuffer that wraps the provided byte slice. The lifetime
    /// of the returned ByteBuffer must not outlive the lifetime of the byte
    /// slice.
    pub fn new(data: &'a [u8]) -> ByteBuffer<'a> {
        ByteBuffer { data, index: 0 }
    }

    /// Retrieves the underlying byte slice.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Retrieves the current index into the underlying byte slice. This starts
    /// off as 0 and ends up as `self.data().len()` when everything has been
    /// read.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.index
    }

    pub fn is_empty(&self) -> bool {
        self.index >= self.data.len()
    }

    /// Try to read a byte starting at the current index.
    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        if self.index >= self.data.len() {
            Err(DecodeError::Truncated { needed: 1, remaining: 0 })
        } else {
            let value = self.data[self.index];
            self.index += 1;
            Ok(value)
        }
    }

    /// Try to read `len` raw bytes starting at the current index. The returned
    /// slice aliases the underlying memory.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            Err(DecodeError::Truncated { needed: len, remaining: self.remaining() })
        } else {
            let value = &self.data[self.index..self.index + len];
            self.index += len;
            Ok(value)
        }
    }

    /// Advance the index by `len` bytes without looking at them.
    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.read_bytes(len).map(|_| ())
    }

    /// Try to read a base-128 varint of up to 64 bits. Fails if the varint
    /// runs past the end of the buffer or past ten bytes.
    pub fn read_var_uint64(&mut self) -> Result<u64, DecodeError> {
        let mut result: u64 = 0;

        for i in 0..MAX_VARINT_LEN {
            let byte = self.read_byte()?;
            result |= ((byte & 127) as u64) << (7 * i);
            if (byte & 128) == 0 {
                return Ok(result);
            }
        }

        Err(DecodeError::VarintOverflow)
    }

    /// Try to read a varint and keep its low 32 bits. Negative `int32` values
    /// are written sign extended to ten bytes, so truncation recovers them.
    pub fn read_var_uint32(&mut self) -> Result<u32, DecodeError> {
        Ok(self.read_var_uint64()? as u32)
    }

    pub fn read_var_int32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.read_var_uint64()? as i32)
    }

    pub fn read_var_int64(&mut self) -> Result<i64, DecodeError> {
        Ok(self.read_var_uint64()? as i64)
    }

    /// Try to read a zigzag encoded `sint32` starting at the current index.
    pub fn read_zigzag32(&mut self) -> Result<i32, DecodeError> {
        Ok(zigzag_decode32(self.read_var_uint32()?))
    }

    /// Try to read a zigzag encoded `sint64` starting at the current index.
    pub fn read_zigzag64(&mut self) -> Result<i64, DecodeError> {
        Ok(zigzag_decode64(self.read_var_uint64()?))
    }

    /// Any non-zero varint reads as `true`.
    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_var_uint64()? != 0)
    }

    pub fn read_fixed32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_fixed64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn read_sfixed32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.read_fixed32()? as i32)
    }

    pub fn read_sfixed64(&mut self) -> Result<i64, DecodeError> {
        Ok(self.read_fixed64()? as i64)
    }

    pub fn read_float(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_bits(self.read_fixed32()?))
    }

    pub fn read_double(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(self.read_fixed64()?))
    }

    /// Try to read a varint length prefix followed by that many bytes. The
    /// prefix is read at full width, so an oversized length never wraps.
    pub fn read_length_delimited(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_var_uint64()?;
        match usize::try_from(len) {
            Ok(len) if len <= self.remaining() => self.read_bytes(len),
            _ => Err(DecodeError::Truncated {
                needed:    usize::try_from(len).unwrap_or(usize::MAX),
                remaining: self.remaining(),
            }),
        }
    }

    /// Try to read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let bytes = self.read_length_delimited()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }

    /// Try to read a tag, splitting it into field id and wire type.
    pub fn read_tag(&mut self) -> Result<(u32, WireType), DecodeError> {
        let wide = self.read_var_uint64()?;
        let tag = u32::try_from(wide)
            .map_err(|_| DecodeError::InvalidFieldId(u32::try_from(wide >> 3).unwrap_or(u32::MAX)))?;
        let wire_type = WireType::from_u32(tag & 7).ok_or(DecodeError::InvalidWireType(tag & 7))?;
        Ok((tag >> 3, wire_type))
    }
}

#[test]
fn read_byte() {
    let read = |bytes| ByteBuffer::new(bytes).read_byte();
    assert_eq!(read(&[]), Err(DecodeError::Truncated { needed: 1, remaining: 0 }));
    assert_eq!(read(&[0]), Ok(0));
    assert_eq!(read(&[255]), Ok(255));
}

#[test]
fn read_bytes() {
    let mut bb = ByteBuffer::new(&[1, 2, 3, 4, 5]);
    assert_eq!(bb.read_bytes(3), Ok([1, 2, 3].as_slice()));
    assert_eq!(bb.remaining(), 2);
    assert_eq!(bb.read_bytes(3), Err(DecodeError::Truncated { needed: 3, remaining: 2 }));
    assert_eq!(bb.read_bytes(2), Ok([4, 5].as_slice()));
    assert!(bb.is_empty());
}

#[test]
fn read_var_uint64() {
    let read = |bytes| ByteBuffer::new(bytes).read_var_uint64();
    assert_eq!(read(&[0]), Ok(0));
    assert_eq!(read(&[1]), Ok(1));
    assert_eq!(read(&[127]), Ok(127));
    assert_eq!(read(&[0x96, 0x01]), Ok(150));
    assert_eq!(read(&[0xAC, 0x02]), Ok(300));
    assert_eq!(read(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]), Ok(0xFFFF_FFFF));
    assert_eq!(
        read(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]),
        Ok(u64::MAX)
    );
    assert!(matches!(read(&[128]), Err(DecodeError::Truncated { .. })));
    assert_eq!(
        read(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x01]),
        Err(DecodeError::VarintOverflow)
    );
}

#[test]
fn read_var_int32() {
    let read = |bytes| ByteBuffer::new(bytes).read_var_int32();
    assert_eq!(read(&[0x96, 0x01]), Ok(150));
    assert_eq!(
        read(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]),
        Ok(-1)
    );
    assert_eq!(
        read(&[0x80, 0x80, 0x80, 0x80, 0xF8, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]),
        Ok(i32::MIN)
    );
}

#[test]
fn read_zigzag() {
    let read32 = |bytes| ByteBuffer::new(bytes).read_zigzag32();
    assert_eq!(read32(&[0]), Ok(0));
    assert_eq!(read32(&[1]), Ok(-1));
    assert_eq!(read32(&[2]), Ok(1));
    assert_eq!(read32(&[3]), Ok(-2));
    assert_eq!(read32(&[0xFE, 0xFF, 0xFF, 0xFF, 0x0F]), Ok(i32::MAX));
    assert_eq!(read32(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]), Ok(i32::MIN));

    let read64 = |bytes| ByteBuffer::new(bytes).read_zigzag64();
    assert_eq!(read64(&[1]), Ok(-1));
    assert_eq!(
        read64(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]),
        Ok(i64::MIN)
    );
}

#[test]
fn read_fixed() {
    let mut bb = ByteBuffer::new(&[
        0x78, 0x56, 0x34, 0x12, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0, 0, 0, 0xF0, 0x3F,
    ]);
    assert_eq!(bb.read_fixed32(), Ok(0x1234_5678));
    assert_eq!(bb.read_sfixed32(), Ok(-1));
    assert_eq!(bb.read_double(), Ok(1.0));
    assert_eq!(bb.read_float(), Err(DecodeError::Truncated { needed: 4, remaining: 0 }));
}

#[test]
fn read_string() {
    let read = |bytes| ByteBuffer::new(bytes).read_string();
    assert_eq!(read(&[0]), Ok(String::new()));
    assert_eq!(read(&[3, 97, 98, 99]), Ok("abc".to_owned()));
    assert_eq!(read(&[4, 240, 159, 141, 149]), Ok("🍕".to_owned()));
    assert_eq!(read(&[2, 0xC3, 0x28]), Err(DecodeError::InvalidUtf8));
    assert_eq!(read(&[5, 97]), Err(DecodeError::Truncated { needed: 5, remaining: 1 }));
}

#[test]
fn read_tag() {
    let read = |bytes| ByteBuffer::new(bytes).read_tag();
    assert_eq!(read(&[0x08]), Ok((1, WireType::Varint)));
    assert_eq!(read(&[0x12]), Ok((2, WireType::Ldelim)));
    assert_eq!(read(&[0xA2, 0x06]), Ok((100, WireType::Ldelim)));
    assert_eq!(read(&[0x0E]), Err(DecodeError::InvalidWireType(6)));

    // Tags wider than 32 bits are not truncated into a valid id
    assert_eq!(
        read(&[0x88, 0x80, 0x80, 0x80, 0x10]),
        Err(DecodeError::InvalidFieldId(1 << 29 | 1))
    );
    assert_eq!(read(&[0xF8, 0xFF, 0xFF, 0xFF, 0x0F]), Ok(((1 << 29) - 1, WireType::Varint)));
}

#[test]
fn read_length_delimited() {
    let mut bb = ByteBuffer::new(&[0x02, 0xAA, 0xBB, 0xCC]);
    assert_eq!(bb.read_length_delimited(), Ok([0xAA, 0xBB].as_slice()));
    assert_eq!(bb.remaining(), 1);

    // 2^32 + 1 must not wrap around to a length of one
    let mut bb = ByteBuffer::new(&[0x81, 0x80, 0x80, 0x80, 0x10, 0xAA]);
    assert!(matches!(bb.read_length_delimited(), Err(DecodeError::Truncated { remaining: 1, .. })));

    let mut bb = ByteBuffer::new(&[0x05, 0x01]);
    assert_eq!(bb.read_length_delimited(), Err(DecodeError::Truncated { needed: 5, remaining: 1 }));
}

/// A protobuf byte buffer meant for writing.
///
/// Example usage:
///
/// ```
/// let mut bb = brine_proto_schema::ByteBufferMut::new();
/// bb.write_var_uint32(150);
/// bb.write_string("abc");
/// assert_eq!(bb.data(), [0x96, 0x01, 0x03, 0x61, 0x62, 0x63]);
/// ```
///
#[derive(Debug, Default)]
pub struct ByteBufferMut {
    data: Vec<u8>,
}

impl ByteBufferMut {
    /// Creates an empty ByteBufferMut ready for writing.
    pub fn new() -> ByteBufferMut {
        ByteBufferMut { data: vec![] }
    }

    /// Consumes this buffer and returns the underlying backing store. Use this
    /// to get the data out when you're done writing to the buffer.
    pub fn data(self) -> Vec<u8> {
        self.data
    }

    /// Borrow what has been written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Returns the number of bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write a byte to the end of the buffer.
    pub fn write_byte(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Write a raw byte slice to the end of the buffer.
    pub fn write_bytes(&mut self, value: &[u8]) {
        self.data.extend_from_slice(value);
    }

    /// Write a base-128 varint, least significant group first.
    pub fn write_var_uint64(&mut self, mut value: u64) {
        loop {
            let byte = value as u8 & 127;
            value >>= 7;

            if value == 0 {
                self.write_byte(byte);
                return;
            }

            self.write_byte(byte | 128);
        }
    }

    pub fn write_var_uint32(&mut self, value: u32) {
        self.write_var_uint64(value as u64);
    }

    /// Negative values are sign extended, which always takes ten bytes.
    pub fn write_var_int32(&mut self, value: i32) {
        self.write_var_uint64(value as i64 as u64);
    }

    pub fn write_var_int64(&mut self, value: i64) {
        self.write_var_uint64(value as u64);
    }

    pub fn write_zigzag32(&mut self, value: i32) {
        self.write_var_uint32(zigzag_encode32(value));
    }

    pub fn write_zigzag64(&mut self, value: i64) {
        self.write_var_uint64(zigzag_encode64(value));
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_byte(if value { 1 } else { 0 });
    }

    pub fn write_fixed32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_fixed64(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_sfixed32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_sfixed64(&mut self, value: i64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_float(&mut self, value: f32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_double(&mut self, value: f64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a varint length prefix followed by the payload.
    pub fn write_length_delimited(&mut self, value: &[u8]) {
        self.write_var_uint32(value.len() as u32);
        self.write_bytes(value);
    }

    /// Write a length-prefixed UTF-8 string to the end of the buffer.
    pub fn write_string(&mut self, value: &str) {
        self.write_length_delimited(value.as_bytes());
    }

    /// Write the `(id << 3) | wire_type` key that precedes every field.
    pub fn write_tag(&mut self, id: u32, wire_type: WireType) {
        self.write_var_uint32((id << 3) | wire_type as u32);
    }
}

#[cfg(test)]
fn write_once(cb: fn(&mut ByteBufferMut)) -> Vec<u8> {
    let mut bb = ByteBufferMut::new();
    cb(&mut bb);
    bb.data()
}

#[test]
fn write_var_uint() {
    assert_eq!(write_once(|bb| bb.write_var_uint32(0)), [0]);
    assert_eq!(write_once(|bb| bb.write_var_uint32(1)), [1]);
    assert_eq!(write_once(|bb| bb.write_var_uint32(127)), [127]);
    assert_eq!(write_once(|bb| bb.write_var_uint32(128)), [128, 1]);
    assert_eq!(write_once(|bb| bb.write_var_uint32(150)), [0x96, 0x01]);
    assert_eq!(write_once(|bb| bb.write_var_uint32(300)), [0xAC, 0x02]);
    assert_eq!(
        write_once(|bb| bb.write_var_uint32(u32::MAX)),
        [0xFF, 0xFF, 0xFF, 0xFF, 0x0F]
    );
    assert_eq!(
        write_once(|bb| bb.write_var_uint64(u64::MAX)),
        [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]
    );
}

#[test]
fn write_var_int() {
    assert_eq!(write_once(|bb| bb.write_var_int32(150)), [0x96, 0x01]);
    assert_eq!(
        write_once(|bb| bb.write_var_int32(-1)),
        [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]
    );
    assert_eq!(
        write_once(|bb| bb.write_var_int64(-2)),
        [0xFE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]
    );
}

#[test]
fn write_zigzag() {
    assert_eq!(write_once(|bb| bb.write_zigzag32(0)), [0]);
    assert_eq!(write_once(|bb| bb.write_zigzag32(-1)), [1]);
    assert_eq!(write_once(|bb| bb.write_zigzag32(1)), [2]);
    assert_eq!(write_once(|bb| bb.write_zigzag32(-64)), [127]);
    assert_eq!(write_once(|bb| bb.write_zigzag32(64)), [128, 1]);
    assert_eq!(
        write_once(|bb| bb.write_zigzag32(i32::MIN)),
        [0xFF, 0xFF, 0xFF, 0xFF, 0x0F]
    );
    assert_eq!(
        write_once(|bb| bb.write_zigzag64(i64::MAX)),
        [0xFE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]
    );
    assert_eq!(zigzag_encode64(-3), 5);
    assert_eq!(zigzag_decode64(5), -3);
}

#[test]
fn write_fixed() {
    assert_eq!(write_once(|bb| bb.write_fixed32(0x1234_5678)), [0x78, 0x56, 0x34, 0x12]);
    assert_eq!(write_once(|bb| bb.write_sfixed32(-1)), [0xFF; 4]);
    assert_eq!(write_once(|bb| bb.write_float(1.0)), [0, 0, 0x80, 0x3F]);
    assert_eq!(
        write_once(|bb| bb.write_double(-2.0)),
        [0, 0, 0, 0, 0, 0, 0, 0xC0]
    );
}

#[test]
fn write_tag() {
    assert_eq!(write_once(|bb| bb.write_tag(1, WireType::Varint)), [0x08]);
    assert_eq!(write_once(|bb| bb.write_tag(2, WireType::Ldelim)), [0x12]);
    assert_eq!(write_once(|bb| bb.write_tag(3, WireType::StartGroup)), [0x1B]);
    assert_eq!(write_once(|bb| bb.write_tag(16, WireType::Bits32)), [0x85, 0x01]);
}

#[test]
fn write_sequence() {
    let mut bb = ByteBufferMut::new();
    bb.write_tag(1, WireType::Varint);
    bb.write_var_uint32(150);
    bb.write_tag(2, WireType::Ldelim);
    bb.write_string("testing");
    assert_eq!(
        bb.data(),
        [0x08, 0x96, 0x01, 0x12, 0x07, 0x74, 0x65, 0x73, 0x74, 0x69, 0x6E, 0x67]
    );
}

//! Little-endian cursor helpers shared by the container readers and writers.

pub(crate) fn read_u8(bytes: &[u8], ix: &mut usize) -> Option<u8> {
    let result = *bytes.get(*ix)?;
    *ix += 1;
    Some(result)
}

pub(crate) fn read_u16(bytes: &[u8], ix: &mut usize) -> Option<u16> {
    let slice = bytes.get(*ix..*ix + 2)?;
    *ix += 2;
    Some(u16::from_le_bytes([slice[0], slice[1]]))
}

pub(crate) fn read_u32(bytes: &[u8], ix: &mut usize) -> Option<u32> {
    let slice = bytes.get(*ix..*ix + 4)?;
    *ix += 4;
    Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

pub(crate) fn read_bytes<'a>(bytes: &'a [u8], ix: &mut usize, length: usize) -> Option<&'a [u8]> {
    let slice = bytes.get(*ix..*ix + length)?;
    *ix += length;
    Some(slice)
}

pub(crate) fn write_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

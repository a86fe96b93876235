//! Reader for the HotSpot performance-data file (`hsperfdata_<user>/<pid>`).
//!
//! The file starts with a fixed prologue followed by self-describing entries.
//! Only version 2 of the layout is understood.

use std::collections::HashMap;

use thiserror::Error;

const MAGIC: [u8; 4] = [0xca, 0xfe, 0xc0, 0xc0];
const PROLOGUE_LEN: usize = 32;
const ENTRY_HEADER_LEN: usize = 20;
const SUPPORTED_MAJOR: u8 = 2;

const TYPE_LONG: u8 = b'J';
const TYPE_BYTE: u8 = b'B';

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PerfDataError {
    #[error("file is {0} bytes, shorter than the prologue")]
    TooShort(usize),
    #[error("bad magic {0:02x?}")]
    BadMagic([u8; 4]),
    #[error("unsupported version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },
    #[error("entry {index} at offset {offset} runs past the end of the file")]
    Truncated { index: usize, offset: usize },
    #[error("entry {index} at offset {offset} has invalid length {length}")]
    BadEntryLength {
        index: usize,
        offset: usize,
        length: i32,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PerfValue {
    Long(i64),
    Text(String),
}

#[derive(Clone, Copy)]
enum ByteOrder {
    Big,
    Little,
}

struct Reader<'a> {
    buf: &'a [u8],
    order: ByteOrder,
}

impl Reader<'_> {
    fn bytes<const N: usize>(&self, at: usize) -> Option<[u8; N]> {
        self.buf.get(at..at.checked_add(N)?)?.try_into().ok()
    }

    fn i32(&self, at: usize) -> Option<i32> {
        let raw = self.bytes::<4>(at)?;
        Some(match self.order {
            ByteOrder::Big => i32::from_be_bytes(raw),
            ByteOrder::Little => i32::from_le_bytes(raw),
        })
    }

    fn i64(&self, at: usize) -> Option<i64> {
        let raw = self.bytes::<8>(at)?;
        Some(match self.order {
            ByteOrder::Big => i64::from_be_bytes(raw),
            ByteOrder::Little => i64::from_le_bytes(raw),
        })
    }

    fn u8(&self, at: usize) -> Option<u8> {
        self.buf.get(at).copied()
    }

    /// NUL-terminated string starting at `at`, bounded by `end`.
    fn c_str(&self, at: usize, end: usize) -> Option<String> {
        let slice = self.buf.get(at..end.min(self.buf.len()))?;
        let len = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
        Some(String::from_utf8_lossy(&slice[..len]).into_owned())
    }
}

/// Counters of one JVM, keyed by their dotted name.
#[derive(Clone, Debug, Default)]
pub struct PerfData {
    accessible: bool,
    counters: HashMap<String, PerfValue>,
}

impl PerfData {
    pub fn parse(buf: &[u8]) -> Result<Self, PerfDataError> {
        if buf.len() < PROLOGUE_LEN {
            return Err(PerfDataError::TooShort(buf.len()));
        }
        let magic = [buf[0], buf[1], buf[2], buf[3]];
        if magic != MAGIC {
            return Err(PerfDataError::BadMagic(magic));
        }
        let order = if buf[4] == 0 {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        };
        let (major, minor) = (buf[5], buf[6]);
        if major != SUPPORTED_MAJOR {
            return Err(PerfDataError::UnsupportedVersion { major, minor });
        }
        let accessible = buf[7] != 0;

        let reader = Reader { buf, order };
        let entry_offset = reader.i32(24).unwrap_or(0).max(0) as usize;
        let num_entries = reader.i32(28).unwrap_or(0).max(0) as usize;

        let mut counters = HashMap::with_capacity(num_entries.min(buf.len() / ENTRY_HEADER_LEN));
        let mut offset = entry_offset;
        for index in 0..num_entries {
            let header_fits = offset
                .checked_add(ENTRY_HEADER_LEN)
                .is_some_and(|end| end <= buf.len());
            let Some(length) = reader.i32(offset).filter(|_| header_fits) else {
                return Err(PerfDataError::Truncated { index, offset });
            };
            let end = offset.saturating_add(length.max(0) as usize);
            if length < ENTRY_HEADER_LEN as i32 || end > buf.len() {
                return Err(PerfDataError::BadEntryLength {
                    index,
                    offset,
                    length,
                });
            }

            if let Some((name, value)) = read_entry(&reader, offset, end) {
                counters.insert(name, value);
            }
            offset = end;
        }

        Ok(Self {
            accessible,
            counters,
        })
    }

    /// False while the JVM is still initialising the file.
    pub fn is_accessible(&self) -> bool {
        self.accessible
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&PerfValue> {
        self.counters.get(name)
    }

    pub fn long(&self, name: &str) -> Option<i64> {
        match self.counters.get(name)? {
            PerfValue::Long(v) => Some(*v),
            PerfValue::Text(_) => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.counters.get(name)? {
            PerfValue::Text(s) => Some(s),
            PerfValue::Long(_) => None,
        }
    }
}

/// Decodes one entry; unknown data types are skipped.
fn read_entry(reader: &Reader<'_>, start: usize, end: usize) -> Option<(String, PerfValue)> {
    let name_offset = reader.i32(start + 4)?.max(0) as usize;
    let vector_length = reader.i32(start + 8)?;
    let data_type = reader.u8(start + 12)?;
    let data_offset = reader.i32(start + 16)?.max(0) as usize;

    let name = reader.c_str(start.checked_add(name_offset)?, end)?;
    let data_at = start.checked_add(data_offset)?;

    let value = match (data_type, vector_length) {
        (TYPE_LONG, 0) => PerfValue::Long(reader.i64(data_at)?),
        (TYPE_BYTE, len) if len > 0 => {
            let data_end = data_at.checked_add(len as usize)?.min(end);
            PerfValue::Text(reader.c_str(data_at, data_end)?)
        }
        _ => return None,
    };
    Some((name, value))
}

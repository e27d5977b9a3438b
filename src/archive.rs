use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::error::ArchiveError;

/// Name of the archive entry holding the data model schema.
pub const SCHEMA_ENTRY: &str = "DataModelSchema";

/// Upper bound on the buffer reserved up front from an entry's declared size.
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// Reads the data model schema text out of a template archive.
pub fn read_schema(pbit: &[u8]) -> Result<String, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(pbit))?;
    let mut entry = match archive.by_name(SCHEMA_ENTRY) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(ArchiveError::MissingSchemaEntry(SCHEMA_ENTRY.to_owned()));
        }
        Err(err) => return Err(err.into()),
    };
    let mut bytes = Vec::with_capacity(preallocation(entry.size()));
    entry.read_to_end(&mut bytes)?;
    log::debug!("Read {} bytes from `{}`", bytes.len(), SCHEMA_ENTRY);
    decode_utf16(&bytes)
}

/// The declared size of an archive entry is untrusted, so only part of it is
/// reserved; the buffer still grows to the real size while reading.
fn preallocation(declared_size: u64) -> usize {
    declared_size.min(MAX_PREALLOCATION) as usize
}

/// Decodes UTF-16 text, little-endian unless a big-endian byte order mark
/// says otherwise. The byte order mark is not part of the result.
pub fn decode_utf16(bytes: &[u8]) -> Result<String, ArchiveError> {
    if bytes.len() % 2 != 0 {
        return Err(ArchiveError::Decode(format!(
            "odd number of bytes ({})",
            bytes.len()
        )));
    }
    let (body, big_endian) = match bytes {
        [0xFF, 0xFE, rest @ ..] => (rest, false),
        [0xFE, 0xFF, rest @ ..] => (rest, true),
        _ => (bytes, false),
    };
    let units = body
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .collect::<Vec<_>>();
    String::from_utf16(&units).map_err(|err| ArchiveError::Decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16_le(text: &str, bom: bool) -> Vec<u8> {
        let mut bytes = if bom { vec![0xFF, 0xFE] } else { vec![] };
        bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
        bytes
    }

    #[test]
    fn test_decode_little_endian() {
        assert_eq!(decode_utf16(&utf16_le("{\"a\": \"é\"}", true)).unwrap(), "{\"a\": \"é\"}");
        assert_eq!(decode_utf16(&utf16_le("plain", false)).unwrap(), "plain");
    }

    #[test]
    fn test_decode_big_endian() {
        let mut bytes = vec![0xFE, 0xFF];
        bytes.extend("ok".encode_utf16().flat_map(u16::to_be_bytes));
        assert_eq!(decode_utf16(&bytes).unwrap(), "ok");
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode_utf16(&[0x41]), Err(ArchiveError::Decode(_))));
        // Lone high surrogate
        assert!(matches!(decode_utf16(&[0x00, 0xD8]), Err(ArchiveError::Decode(_))));
    }

    #[test]
    fn test_preallocation_is_capped() {
        assert_eq!(preallocation(1024), 1024);
        assert_eq!(preallocation(u64::MAX), MAX_PREALLOCATION as usize);
    }

    #[test]
    fn test_not_a_zip() {
        assert!(matches!(read_schema(b"not a zip"), Err(ArchiveError::Zip(_))));
    }
}

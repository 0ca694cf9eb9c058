//! In-memory view of the EPUB container.
//!
//! The whole archive is inflated up front (bounded by the configured
//! memory ceiling) so that workers can share it read-only without touching
//! the zip machinery again.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::{Cursor, Read};

use crate::error::{Error, Result};

/// Read-only mapping from internal path to byte content.
#[derive(Debug)]
pub struct Archive {
    files: HashMap<String, Vec<u8>>,
    /// Paths in sorted order, for deterministic traversal.
    paths: Vec<String>,
    /// Entries that could not be inflated (kept for diagnostics).
    skipped: Vec<String>,
}

impl Archive {
    /// Open a zip archive from raw bytes, inflating every file entry.
    ///
    /// Damaged entries are skipped rather than failing the whole archive;
    /// their paths are reported through [`Archive::skipped`]. Exceeding
    /// `max_memory_bytes` of inflated content is an error, since nothing
    /// downstream could safely hold the result.
    pub fn open(data: &[u8], max_memory_bytes: u64) -> Result<Archive> {
        let mut zip = zip::ZipArchive::new(Cursor::new(data))?;

        let mut files = HashMap::new();
        let mut skipped = Vec::new();
        let mut inflated: u64 = 0;

        for i in 0..zip.len() {
            let mut entry = match zip.by_index(i) {
                Ok(entry) => entry,
                Err(_) => {
                    skipped.push(format!("#{}", i));
                    continue;
                }
            };
            if entry.is_dir() {
                continue;
            }

            inflated = inflated.saturating_add(entry.size());
            if inflated > max_memory_bytes {
                return Err(Error::MemoryCeiling(max_memory_bytes));
            }

            let name = entry.name().replace('\\', "/");
            let mut contents = Vec::with_capacity(entry.size() as usize);
            match entry.read_to_end(&mut contents) {
                Ok(_) => {
                    files.insert(name, contents);
                }
                Err(_) => skipped.push(name),
            }
        }

        let mut paths: Vec<String> = files.keys().cloned().collect();
        paths.sort();

        Ok(Archive {
            files,
            paths,
            skipped,
        })
    }

    /// Number of file entries.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Paths of entries that failed to inflate.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// All entry paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }

    /// Read an entry's bytes.
    ///
    /// Tries the literal path first, then a percent-decoded form (hrefs in
    /// malformed EPUBs are often percent-encoded while the zip entry is
    /// not).
    pub fn read(&self, path: &str) -> Result<&[u8]> {
        self.resolve(path)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::MissingEntry(path.to_string()))
    }

    /// Read an entry and decode it to text via the configured encoding
    /// chain.
    pub fn read_text(&self, path: &str, encodings: &[String]) -> Result<String> {
        let bytes = self.read(path)?;
        Ok(decode_text(strip_bom(bytes), encodings).into_owned())
    }

    fn resolve(&self, path: &str) -> Option<&Vec<u8>> {
        if let Some(data) = self.files.get(path) {
            return Some(data);
        }
        let decoded = percent_encoding::percent_decode_str(path)
            .decode_utf8()
            .ok()?;
        self.files.get(decoded.as_ref())
    }
}

/// Strip a UTF-8 BOM (byte order mark) if present.
pub fn strip_bom(data: &[u8]) -> &[u8] {
    // UTF-8 BOM: EF BB BF
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    }
}

/// Decode bytes to a string, handling various encodings.
///
/// 1. First tries UTF-8 (handles BOM automatically via encoding_rs)
/// 2. If malformed, tries each configured encoding label in order
/// 3. Falls back to Windows-1252 (common in old ebooks)
pub fn decode_text<'a>(bytes: &'a [u8], encodings: &[String]) -> Cow<'a, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);
    if !malformed {
        return result;
    }

    for label in encodings {
        if let Some(encoding) = encoding_rs::Encoding::for_label(label.as_bytes()) {
            let (result, _, malformed) = encoding.decode(bytes);
            if !malformed {
                return result;
            }
        }
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn open_and_read_entries() {
        let data = build_zip(&[
            ("mimetype", b"application/epub+zip"),
            ("OEBPS/ch1.xhtml", b"<html/>"),
        ]);
        let archive = Archive::open(&data, u64::MAX).unwrap();

        assert_eq!(archive.len(), 2);
        assert_eq!(archive.read("mimetype").unwrap(), b"application/epub+zip");
        assert!(archive.contains("OEBPS/ch1.xhtml"));
        assert!(archive.read("missing").is_err());
    }

    #[test]
    fn percent_decoded_lookup_fallback() {
        let data = build_zip(&[("OEBPS/my chapter.xhtml", b"<html/>")]);
        let archive = Archive::open(&data, u64::MAX).unwrap();
        assert!(archive.contains("OEBPS/my%20chapter.xhtml"));
    }

    #[test]
    fn memory_ceiling_is_enforced() {
        let big = vec![b'x'; 4096];
        let data = build_zip(&[("a.xhtml", big.as_slice())]);
        match Archive::open(&data, 1024) {
            Err(Error::MemoryCeiling(limit)) => assert_eq!(limit, 1024),
            other => panic!("expected memory ceiling error, got {:?}", other),
        }
    }

    #[test]
    fn strip_bom_removes_utf8_marker() {
        assert_eq!(strip_bom(&[0xEF, 0xBB, 0xBF, b'a']), b"a");
        assert_eq!(strip_bom(b"abc"), b"abc");
    }

    #[test]
    fn decode_text_falls_back_to_windows_1252() {
        // 0xE9 is 'é' in Windows-1252 but malformed UTF-8.
        let bytes = [b'c', b'a', b'f', 0xE9];
        let text = decode_text(&bytes, &[]);
        assert_eq!(text, "café");
    }

    #[test]
    fn decode_text_uses_hint_encodings_in_order() {
        let bytes: Vec<u8> = "héllo"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        let encodings = vec!["utf-16le".to_string()];
        assert_eq!(decode_text(&bytes, &encodings), "héllo");
    }
}

// ── Text encodings for written content and append separators ────────────────

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FileEncoding {
    #[default]
    Utf8,
    /// 7-bit ASCII; anything else becomes `?`.
    Ascii,
    /// ISO-8859-1; code points above U+00FF become `?`.
    Latin1,
    /// UTF-16 little endian.
    Utf16Le,
    Utf16Be,
}

impl FileEncoding {
    /// Byte order mark for the encoding, empty for single-byte encodings.
    pub fn bom(&self) -> &'static [u8] {
        match self {
            FileEncoding::Utf8 => &[0xEF, 0xBB, 0xBF],
            FileEncoding::Utf16Le => &[0xFF, 0xFE],
            FileEncoding::Utf16Be => &[0xFE, 0xFF],
            FileEncoding::Ascii | FileEncoding::Latin1 => &[],
        }
    }

    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            FileEncoding::Utf8 => text.as_bytes().to_vec(),
            FileEncoding::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
            FileEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
            FileEncoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            FileEncoding::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
        }
    }

    /// Encode with an optional BOM prefix.
    pub fn encode_with_bom(&self, text: &str, bom: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(text.len() + 3);
        if bom {
            out.extend_from_slice(self.bom());
        }
        out.extend(self.encode(text));
        out
    }

    /// Whether `tail` (the last bytes of a file) ends in a line feed.
    pub fn ends_with_line_break(&self, tail: &[u8]) -> bool {
        match self {
            FileEncoding::Utf16Le => tail.ends_with(&[b'\n', 0]),
            FileEncoding::Utf16Be => tail.ends_with(&[0, b'\n']),
            _ => tail.ends_with(b"\n"),
        }
    }

    /// Bytes needed to check [`ends_with_line_break`](Self::ends_with_line_break).
    pub fn tail_len(&self) -> u64 {
        match self {
            FileEncoding::Utf16Le | FileEncoding::Utf16Be => 2,
            _ => 1,
        }
    }
}

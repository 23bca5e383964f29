// ── Host key fingerprint verification ────────────────────────────────────────

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use md5::{Digest, Md5};
use sha2::Sha256;

/// Host key as received during key exchange.
#[derive(Debug, Clone)]
pub struct HostKey {
    raw: Vec<u8>,
    md5: [u8; 16],
}

impl HostKey {
    /// `md5` is the digest the protocol library already computed, if any.
    pub fn new(raw: impl Into<Vec<u8>>, md5: Option<[u8; 16]>) -> Self {
        let raw = raw.into();
        let md5 = md5.unwrap_or_else(|| Md5::digest(&raw).into());
        Self { raw, md5 }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// `aa:bb:cc:…`
    pub fn md5_colon_hex(&self) -> String {
        self.md5
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":")
    }

    pub fn md5_hex(&self) -> String {
        hex::encode(self.md5)
    }

    pub fn sha256(&self) -> [u8; 32] {
        Sha256::digest(&self.raw).into()
    }

    /// OpenSSH style `SHA256:` value, without padding.
    pub fn sha256_base64(&self) -> String {
        STANDARD_NO_PAD.encode(self.sha256())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Trusted,
    Rejected(String),
}

impl Verification {
    pub fn is_trusted(&self) -> bool {
        matches!(self, Verification::Trusted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FingerprintFormat {
    Md5,
    Sha256Hex,
    Sha256Base64,
}

fn is_hex(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_hexdigit())
}

fn strip_label(s: &str) -> &str {
    for label in ["MD5:", "SHA256:"] {
        if s.len() > label.len() && s[..label.len()].eq_ignore_ascii_case(label) {
            return &s[label.len()..];
        }
    }
    s
}

fn classify(fp: &str) -> Option<FingerprintFormat> {
    if fp.len() == 32 && is_hex(fp) {
        return Some(FingerprintFormat::Md5);
    }
    let pairs: Vec<&str> = fp.split(':').collect();
    if pairs.len() == 16 && pairs.iter().all(|p| p.len() == 2 && is_hex(p)) {
        return Some(FingerprintFormat::Md5);
    }
    if fp.len() == 64 && is_hex(fp) {
        return Some(FingerprintFormat::Sha256Hex);
    }
    if matches!(fp.len(), 43 | 44) {
        let unpadded = fp.trim_end_matches('=');
        if let Ok(bytes) = STANDARD_NO_PAD.decode(unpadded) {
            if bytes.len() == 32 {
                return Some(FingerprintFormat::Sha256Base64);
            }
        }
    }
    None
}

/// Check `expected` against the received key. An empty expectation trusts
/// any key.
pub fn verify(expected: &str, key: &HostKey) -> Verification {
    let expected = expected.trim();
    if expected.is_empty() {
        return Verification::Trusted;
    }
    let fp = strip_label(expected);

    let (matched, actual) = match classify(fp) {
        Some(FingerprintFormat::Md5) => {
            let actual = if fp.contains(':') {
                key.md5_colon_hex()
            } else {
                key.md5_hex()
            };
            (fp.eq_ignore_ascii_case(&actual), actual)
        }
        Some(FingerprintFormat::Sha256Hex) => {
            let actual = hex::encode(key.sha256());
            (fp.eq_ignore_ascii_case(&actual), actual)
        }
        Some(FingerprintFormat::Sha256Base64) => {
            let actual = key.sha256_base64();
            (fp.trim_end_matches('=') == actual, actual)
        }
        None => return Verification::Rejected("unsupported format".to_string()),
    };

    if matched {
        Verification::Trusted
    } else {
        Verification::Rejected(format!(
            "fingerprint mismatch: expected '{}', server presented '{}'",
            fp, actual
        ))
    }
}

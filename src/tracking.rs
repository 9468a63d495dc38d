//! Tracking codes and session identifiers.
//!
//! Codes are short enough to read over the phone; session ids carry enough
//! entropy to correlate captures without coordination. Neither identifier
//! mutates anything outside the generator.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use rand::Rng;
use std::collections::HashSet;
use std::fmt;

/// Prefix shared by tracking codes and session ids.
pub const CODE_PREFIX: &str = "VB";

const CODE_SUFFIX_LEN: usize = 6;
const SESSION_RANDOM_LEN: usize = 16;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A human-relayable design code, e.g. `VB-20260823-K4QZ1N`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackingCode(String);

impl TrackingCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stem used for artifact filenames derived from this code.
    pub fn file_stem(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issues tracking codes and session ids for one capture session.
///
/// Codes already issued by this generator are never issued again; the
/// random suffix is rerolled (and grown if the space runs hot) until an
/// unused one comes up.
pub struct IdGenerator {
    customer_email: Option<String>,
    issued: HashSet<String>,
}

impl IdGenerator {
    pub fn new(customer_email: Option<String>) -> Self {
        Self {
            customer_email,
            issued: HashSet::new(),
        }
    }

    /// A fresh `VB-YYYYMMDD-XXXXXX` code, distinct from every code this
    /// generator has already issued.
    pub fn tracking_code(&mut self) -> TrackingCode {
        let date = Utc::now().format("%Y%m%d");
        let mut suffix_len = CODE_SUFFIX_LEN;
        let mut attempts = 0u32;
        loop {
            let suffix = random_base36(suffix_len).to_uppercase();
            let code = format!("{}-{}-{}", CODE_PREFIX, date, suffix);
            if self.issued.insert(code.clone()) {
                return TrackingCode(code);
            }
            attempts += 1;
            if attempts % 8 == 0 {
                suffix_len += 1;
            }
        }
    }

    /// The session id for this generator's identity, of the form
    /// `vb_<random16>_<unix-millis>` with an encoded identity suffix when
    /// a customer email is known.
    pub fn session_id(&self) -> String {
        let base = format!(
            "{}_{}_{}",
            CODE_PREFIX.to_lowercase(),
            random_base36(SESSION_RANDOM_LEN),
            Utc::now().timestamp_millis()
        );
        match self.customer_email.as_deref() {
            Some(email) if !email.is_empty() => {
                format!("{}_{}", base, URL_SAFE_NO_PAD.encode(email))
            }
            _ => base,
        }
    }
}

/// Recover the customer identity encoded into a session id, if any.
pub fn decode_identity(session_id: &str) -> Option<String> {
    let parts: Vec<&str> = session_id.splitn(4, '_').collect();
    if parts.len() < 4 {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(parts[3]).ok()?;
    String::from_utf8(bytes).ok()
}

fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_code_format() {
        let mut ids = IdGenerator::new(None);
        let code = ids.tracking_code();
        let parts: Vec<&str> = code.as_str().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "VB");
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_tracking_codes_distinct_within_session() {
        let mut ids = IdGenerator::new(None);
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(ids.tracking_code().as_str().to_string()));
        }
    }

    #[test]
    fn test_session_id_without_identity() {
        let ids = IdGenerator::new(None);
        let id = ids.session_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "vb");
        assert_eq!(parts[1].len(), 16);
        assert!(parts[2].parse::<i64>().is_ok());
        assert_eq!(decode_identity(&id), None);
    }

    #[test]
    fn test_session_id_identity_roundtrip() {
        let ids = IdGenerator::new(Some("ana@example.com".to_string()));
        let id = ids.session_id();
        assert_eq!(decode_identity(&id).as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn test_empty_identity_not_encoded() {
        let ids = IdGenerator::new(Some(String::new()));
        let id = ids.session_id();
        assert_eq!(id.split('_').count(), 3);
    }

    #[test]
    fn test_session_ids_distinct() {
        let ids = IdGenerator::new(None);
        let mut seen = HashSet::new();
        for _ in 0..1_000 {
            assert!(seen.insert(ids.session_id()));
        }
    }
}

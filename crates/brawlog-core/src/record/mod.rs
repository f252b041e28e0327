//! Event records: the immutable unit of decoded combat data.

pub mod line;
mod payload;

pub use line::{decode_line, format_line};
pub use payload::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::source::ImportSourceType;

/// Which reader produced a record.
///
/// Sequence numbers are validated per provenance, so records from a live
/// capture and records imported from a foreign file never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Live,
    Replay,
    Import(ImportSourceType),
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provenance::Live => write!(f, "live"),
            Provenance::Replay => write!(f, "replay"),
            Provenance::Import(format) => write!(f, "import:{}", format),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    /// Source-reported time; replays keep the historical value.
    pub timestamp: DateTime<Utc>,
    pub provenance: Provenance,
    pub payload: Payload,
    /// Chat line the payload was decoded from.
    pub raw: String,
}

impl EventRecord {
    /// Decode a raw chat line into a record.
    pub fn decode(
        sequence: u64,
        timestamp: DateTime<Utc>,
        provenance: Provenance,
        raw: impl Into<String>,
    ) -> Result<Self> {
        let raw = raw.into();
        let payload = decode_line(&raw)?;
        Ok(Self {
            sequence,
            timestamp,
            provenance,
            payload,
            raw,
        })
    }

    pub fn kind(&self) -> PayloadKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_decode_record() {
        let ts = Utc.with_ymd_and_hms(2009, 4, 1, 20, 15, 0).unwrap();
        let raw = format_line(line::codes::HEAL, "Alice heals Bob for 120 hit points.");
        let record = EventRecord::decode(7, ts, Provenance::Live, raw.clone()).unwrap();

        assert_eq!(record.sequence, 7);
        assert_eq!(record.timestamp, ts);
        assert_eq!(record.kind(), PayloadKind::Action);
        assert_eq!(record.raw, raw);
    }

    #[test]
    fn test_decode_record_rejects_malformed_line() {
        let ts = Utc.with_ymd_and_hms(2009, 4, 1, 20, 15, 0).unwrap();
        assert!(EventRecord::decode(1, ts, Provenance::Replay, "garbage").is_err());
    }

    #[test]
    fn test_provenance_display() {
        assert_eq!(Provenance::Live.to_string(), "live");
        assert_eq!(
            Provenance::Import(ImportSourceType::DirectParse).to_string(),
            "import:direct-parse"
        );
    }
}

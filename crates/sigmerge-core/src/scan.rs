//! Scanned-document anomaly detection
//!
//! Real-world scanners and mobile scan apps frequently emit rotation=0
//! pages whose visual content is nonetheless rotated, because the
//! capture pipeline baked the rotation in inconsistently. Relying only
//! on the declared /Rotate value silently misplaces signatures on such
//! files, so a heuristic producer-metadata signal is combined with the
//! deterministic rotation signal.

use lopdf::{Document, Object};
use pagegeom::DocumentGeometry;
use tracing::debug;

/// Substrings matched (case-insensitively) against document metadata.
/// Tuned toward over-detection: flattening a normal PDF is cheap,
/// missing a mis-rotated scan misplaces signatures visibly.
const SCANNER_INDICATORS: &[&str] = &[
    "scan",
    "scansnap",
    "camscanner",
    "adobe scan",
    "genius scan",
    "office lens",
    "tiny scanner",
    "turboscan",
    "scanbot",
    "naps2",
    "vuescan",
    "paperport",
    "readiris",
    "abbyy",
    "epson",
    "canon",
    "xerox",
    "ricoh",
    "kyocera",
    "konica",
    "brother",
    "fujitsu",
    "hp smart",
    "notes", // iOS Notes document capture
];

const CREATOR_WEIGHT: f64 = 0.6;
const PRODUCER_WEIGHT: f64 = 0.5;
const TITLE_WEIGHT: f64 = 0.3;
const SUBJECT_WEIGHT: f64 = 0.2;
const MIXED_ORIENTATION_WEIGHT: f64 = 0.3;

/// Confidence at or above this triggers flattening.
pub const SCAN_CONFIDENCE_THRESHOLD: f64 = 0.4;

/// Document information fields relevant to scan detection.
/// Missing or undecodable fields are simply `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetadata {
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub title: Option<String>,
    pub subject: Option<String>,
}

impl DocumentMetadata {
    /// Read the trailer Info dictionary. Never fails: anything
    /// malformed or absent yields empty metadata.
    pub fn from_document(doc: &Document) -> Self {
        let info = match doc.trailer.get(b"Info") {
            Ok(Object::Reference(id)) => doc.get_object(*id).ok().and_then(|o| o.as_dict().ok()),
            Ok(Object::Dictionary(dict)) => Some(dict),
            _ => None,
        };
        let Some(info) = info else {
            return Self::default();
        };

        let text = |key: &[u8]| -> Option<String> {
            match info.get(key) {
                Ok(Object::String(bytes, _)) => Some(decode_pdf_text(bytes)),
                _ => None,
            }
        };

        Self {
            creator: text(b"Creator"),
            producer: text(b"Producer"),
            title: text(b"Title"),
            subject: text(b"Subject"),
        }
    }
}

/// Decode a PDF text string: UTF-16BE when BOM-prefixed, else Latin-1.
fn decode_pdf_text(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

/// Result of the heuristic classifier: the additive confidence score
/// plus which indicators matched, so thresholds and weights can be
/// tuned without touching flattening logic.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfidence {
    pub score: f64,
    pub indicators: Vec<String>,
    pub mixed_orientations: bool,
}

impl ScanConfidence {
    pub fn is_scanned(&self) -> bool {
        self.score >= SCAN_CONFIDENCE_THRESHOLD
    }
}

/// Pure heuristic scoring over metadata and page orientations.
pub fn scan_confidence(metadata: &DocumentMetadata, geometry: &DocumentGeometry) -> ScanConfidence {
    let mut score = 0.0;
    let mut indicators = Vec::new();

    let mut check = |field: &Option<String>, field_name: &str, weight: f64| {
        let Some(value) = field else { return };
        let lowered = value.to_lowercase();
        for indicator in SCANNER_INDICATORS {
            if lowered.contains(indicator) {
                score += weight;
                indicators.push(format!("{}:{}", field_name, indicator));
                // One hit per field; stacked substrings ("scan" inside
                // "camscanner") must not double-count.
                return;
            }
        }
    };

    check(&metadata.creator, "creator", CREATOR_WEIGHT);
    check(&metadata.producer, "producer", PRODUCER_WEIGHT);
    check(&metadata.title, "title", TITLE_WEIGHT);
    check(&metadata.subject, "subject", SUBJECT_WEIGHT);

    let mixed_orientations = geometry.total_pages > 1 && geometry.has_mixed_orientations();
    if mixed_orientations {
        score += MIXED_ORIENTATION_WEIGHT;
        indicators.push("pages:mixed-orientations".to_string());
    }

    ScanConfidence {
        score,
        indicators,
        mixed_orientations,
    }
}

/// Decide whether a document needs the rotation-0 rewrite before
/// signatures are drawn. Never fails; unknown metadata means no anomaly.
pub fn needs_flattening(doc: &Document, geometry: &DocumentGeometry) -> bool {
    // Declared rotation is sufficient on its own and cheap to check.
    if geometry.has_rotated_pages() {
        debug!("document has rotated pages, flattening required");
        return true;
    }

    let metadata = DocumentMetadata::from_document(doc);
    let confidence = scan_confidence(&metadata, geometry);
    if confidence.is_scanned() {
        debug!(
            score = confidence.score,
            indicators = ?confidence.indicators,
            "scan heuristic triggered flattening"
        );
        return true;
    }
    false
}

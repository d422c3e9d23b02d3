//! ISA envelope header parsing.
//!
//! The first segment of every X12 interchange is the fixed ISA header. Its
//! eighth element (ISA08) is the interchange receiver ID, which is the key
//! used to look up the trading partner for an outbound document.

use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::EnvelopeError;

/// Element separator used by the envelopes we route.
pub const ELEMENT_SEPARATOR: char = '*';

/// Segment terminator; anything after it on the first line belongs to the
/// next segment.
pub const SEGMENT_TERMINATOR: char = '~';

const ISA_TAG: &str = "ISA";
const RECEIVER_ID_INDEX: usize = 8;

/// The parsed ISA segment, as an ordered list of element values.
///
/// Element 0 is the segment tag itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    fields: Vec<String>,
}

impl EnvelopeHeader {
    /// Parse the first line of a document.
    pub fn parse(line: &str) -> Result<Self, EnvelopeError> {
        let line = line.trim_start_matches('\u{feff}');
        let segment = match line.find(SEGMENT_TERMINATOR) {
            Some(end) => &line[..end],
            None => line,
        };
        let segment = segment.trim();
        if segment.is_empty() {
            return Err(EnvelopeError::Empty);
        }

        let fields: Vec<String> = segment
            .split(ELEMENT_SEPARATOR)
            .map(str::to_string)
            .collect();

        let tag = fields[0].trim();
        if tag != ISA_TAG {
            return Err(EnvelopeError::NotIsa {
                found: tag.chars().take(16).collect(),
            });
        }
        if fields.len() <= RECEIVER_ID_INDEX {
            return Err(EnvelopeError::TooFewFields {
                fields: fields.len(),
            });
        }
        if fields[RECEIVER_ID_INDEX].trim().is_empty() {
            return Err(EnvelopeError::EmptyReceiver);
        }

        Ok(Self { fields })
    }

    /// Element at `index`, untrimmed. Index 0 is the tag.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Number of elements including the tag.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// ISA08, trimmed of the fixed-width padding.
    pub fn receiver_id(&self) -> &str {
        self.fields[RECEIVER_ID_INDEX].trim()
    }
}

/// Extract the receiver identifier from a header line.
pub fn parse_receiver_id(line: &str) -> Result<String, EnvelopeError> {
    EnvelopeHeader::parse(line).map(|header| header.receiver_id().to_string())
}

/// Read the first line of `path` and extract its receiver identifier.
///
/// Invalid UTF-8 is replaced rather than rejected; only the ISA segment has
/// to be readable.
pub async fn read_receiver_id(path: &Path) -> Result<String, EnvelopeError> {
    let unreadable = |e: std::io::Error| EnvelopeError::Unreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let file = tokio::fs::File::open(path).await.map_err(unreadable)?;
    let mut reader = BufReader::new(file);
    let mut first_line = Vec::new();
    reader
        .read_until(b'\n', &mut first_line)
        .await
        .map_err(unreadable)?;

    parse_receiver_id(&String::from_utf8_lossy(&first_line))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "ISA*00*          *00*          *ZZ*SENDERID       *ZZ*6048558786     *260109*1230*U*00401*000000323*0*P*>~";

    #[test]
    fn extracts_trimmed_receiver_id() {
        assert_eq!(parse_receiver_id(HEADER).unwrap(), "6048558786");
    }

    #[test]
    fn tolerates_surrounding_whitespace_and_crlf() {
        let line = format!("  {HEADER}\r\n");
        assert_eq!(parse_receiver_id(&line).unwrap(), "6048558786");
    }

    #[test]
    fn stops_at_segment_terminator() {
        let line = format!("{HEADER}GS*PO*SENDER*RECEIVER~ST*850*0001~");
        let header = EnvelopeHeader::parse(&line).unwrap();
        assert_eq!(header.len(), 17);
        assert_eq!(header.receiver_id(), "6048558786");
    }

    #[test]
    fn exactly_nine_fields_is_enough() {
        assert_eq!(parse_receiver_id("ISA*1*2*3*4*5*6*7* RCV ~").unwrap(), "RCV");
    }

    #[test]
    fn rejects_non_isa_header() {
        let err = parse_receiver_id("GS*PO*SENDER*RECEIVER*20260109").unwrap_err();
        assert!(matches!(err, EnvelopeError::NotIsa { ref found } if found == "GS"));
    }

    #[test]
    fn rejects_short_header() {
        let err = parse_receiver_id("ISA*00*01*02").unwrap_err();
        assert_eq!(err, EnvelopeError::TooFewFields { fields: 4 });
    }

    #[test]
    fn rejects_empty_receiver() {
        let err = parse_receiver_id("ISA*1*2*3*4*5*6*7*   *9").unwrap_err();
        assert_eq!(err, EnvelopeError::EmptyReceiver);
    }

    #[test]
    fn rejects_empty_document() {
        assert_eq!(parse_receiver_id("\n").unwrap_err(), EnvelopeError::Empty);
    }

    #[test]
    fn strips_byte_order_mark() {
        let line = format!("\u{feff}{HEADER}");
        assert_eq!(parse_receiver_id(&line).unwrap(), "6048558786");
    }

    #[tokio::test]
    async fn reads_first_line_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000000323.832");
        let body = format!("{HEADER}\nGS*SC*SENDER*6048558786~\nST*832*0001~\n");
        tokio::fs::write(&path, body).await.unwrap();

        assert_eq!(read_receiver_id(&path).await.unwrap(), "6048558786");
    }

    #[tokio::test]
    async fn missing_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_receiver_id(&dir.path().join("gone.edi"))
            .await
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::Unreadable { .. }));
    }
}

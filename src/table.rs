//! The submission-tracking spreadsheet as an in-memory table of strings.

use anyhow::{Context, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Decode ISO-8859-1: every byte is the code point of the same value,
/// so decoding never fails.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

impl Table {
    /// Parse raw spreadsheet bytes exported as Latin-1 CSV.
    pub fn from_latin1(bytes: &[u8]) -> Result<Self> {
        Self::parse(&decode_latin1(bytes))
    }

    /// Parse CSV text. Header names are trimmed; short rows are padded with
    /// empty cells, rows longer than the header are rejected.
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .context("failed to read CSV header")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.context("failed to read CSV record")?;
            if record.len() > headers.len() {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                anyhow::bail!(
                    "CSV line {} has {} fields, expected at most {}",
                    line,
                    record.len(),
                    headers.len()
                );
            }
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Serialize as UTF-8 CSV with a header row.
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.headers)
            .context("failed to write CSV header")?;
        for row in &self.rows {
            writer.write_record(row).context("failed to write CSV row")?;
        }
        writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("failed to flush CSV output: {}", e.error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_latin1_maps_high_bytes() {
        // 0xE9 is 'é' in Latin-1 and invalid as a lone UTF-8 byte
        assert_eq!(decode_latin1(b"Caf\xe9"), "Café");
        assert_eq!(decode_latin1(b"\xae"), "®");
    }

    #[test]
    fn test_headers_are_trimmed() {
        let table = Table::parse(" Submission Number ,Device\nK240369,Scanner\n").unwrap();
        assert_eq!(table.headers, vec!["Submission Number", "Device"]);
        assert_eq!(table.column("Submission Number"), Some(0));
        assert_eq!(table.rows, vec![vec!["K240369", "Scanner"]]);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let table = Table::parse("a,b,c\n1\n1,2,3\n").unwrap();
        assert_eq!(table.rows[0], vec!["1", "", ""]);
        assert_eq!(table.rows[1], vec!["1", "2", "3"]);
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let table = Table::parse("a,b\n\n1,2\n\n3,4\n").unwrap();
        assert_eq!(table.rows, vec![vec!["1", "2"], vec!["3", "4"]]);
    }

    #[test]
    fn test_long_rows_are_rejected() {
        let err = Table::parse("a,b\n1,2,3\n").unwrap_err();
        assert!(err.to_string().contains("expected at most 2"), "{err}");
    }

    #[test]
    fn test_quoted_fields_survive_round_trip() {
        let table = Table::parse("name,note\n\"Acme, Inc.\",\"says \"\"hi\"\"\"\n").unwrap();
        assert_eq!(table.rows[0][0], "Acme, Inc.");
        assert_eq!(table.rows[0][1], "says \"hi\"");
        let out = String::from_utf8(table.to_csv().unwrap()).unwrap();
        assert_eq!(out, "name,note\n\"Acme, Inc.\",\"says \"\"hi\"\"\"\n");
    }

    #[test]
    fn test_latin1_input_written_as_utf8() {
        let table = Table::from_latin1(b"Device\nStent\xae\n").unwrap();
        let out = table.to_csv().unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Device\nStent®\n");
    }
}

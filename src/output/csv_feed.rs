//! CSV record feed
//!
//! Writes a header row followed by one row per record, in the fixed column
//! order `name, latitude, longitude, address, price, rating, url`.

use crate::crawler::{PropertyRecord, RECORD_COLUMNS};
use crate::output::traits::{OutputResult, RecordFeed};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Feed writing delimited rows to any writer
pub struct CsvFeed<W: Write + Send> {
    writer: csv::Writer<W>,
}

impl CsvFeed<File> {
    /// Creates (or truncates) the CSV file at `path` and writes the header
    pub fn create(path: &Path) -> OutputResult<Self> {
        let file = File::create(path)?;
        Self::from_writer(file)
    }
}

impl<W: Write + Send> CsvFeed<W> {
    /// Wraps a writer and writes the header row
    pub fn from_writer(inner: W) -> OutputResult<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(inner);
        writer.write_record(RECORD_COLUMNS)?;
        Ok(Self { writer })
    }

    /// Flushes and returns the underlying writer
    pub fn into_inner(self) -> OutputResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| crate::output::OutputError::Write(e.to_string()))
    }
}

impl<W: Write + Send> RecordFeed for CsvFeed<W> {
    fn write_record(&mut self, record: &PropertyRecord) -> OutputResult<()> {
        self.writer.serialize(record.row())?;
        // Rows are flushed as they come so an interrupted run keeps its output
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> OutputResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::GeoPoint;

    fn record(name: &str, coordinates: Option<GeoPoint>) -> PropertyRecord {
        PropertyRecord {
            name: name.to_string(),
            coordinates,
            address: "Carrer de Mallorca, 401, Barcelona".to_string(),
            price: "€ 1.234".to_string(),
            rating: "8,7".to_string(),
            url: "https://www.example.test/hotel/a.html".to_string(),
        }
    }

    #[test]
    fn test_header_only_when_empty() {
        let feed = CsvFeed::from_writer(Vec::new()).unwrap();
        let bytes = feed.into_inner().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "name,latitude,longitude,address,price,rating,url\n"
        );
    }

    #[test]
    fn test_rows_in_column_order() {
        let mut feed = CsvFeed::from_writer(Vec::new()).unwrap();
        feed.write_record(&record(
            "Hotel Sol",
            Some(GeoPoint {
                latitude: 41.3851,
                longitude: 2.1734,
            }),
        ))
        .unwrap();
        feed.write_record(&record("Casa \"Luna\"", None)).unwrap();

        let output = String::from_utf8(feed.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "Hotel Sol,41.3851,2.1734,\"Carrer de Mallorca, 401, Barcelona\",€ 1.234,\"8,7\",https://www.example.test/hotel/a.html"
        );
        assert!(lines[2].starts_with("\"Casa \"\"Luna\"\"\",,,"));
    }

    #[test]
    fn test_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let mut feed = CsvFeed::create(&path).unwrap();
        feed.write_record(&record("Hotel Sol", None)).unwrap();
        feed.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("name,latitude"));
        assert_eq!(content.lines().count(), 2);
    }
}

//! Decoding of the CSV bodies returned by the query API.
//!
//! A body holds one or more tables. Each table starts with a header row
//! whose second and third columns are `result` and `table`; a new header
//! row replaces the previous one. Annotation rows (`#datatype`, `#group`,
//! `#default`) are ignored.

use tideye_core::TideyeResult;

use crate::{invalid_response, TelemetryRow};

fn is_header(record: &csv::StringRecord) -> bool {
    record.get(1) == Some("result") && record.get(2) == Some("table")
}

fn is_annotation(record: &csv::StringRecord) -> bool {
    record.get(0).is_some_and(|first| first.starts_with('#'))
}

/// Parse a query response body into column maps.
///
/// Empty cells and the unnamed leading column are left out of each row.
pub fn parse_rows(body: &str) -> TideyeResult<Vec<TelemetryRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut header: Option<csv::StringRecord> = None;
    let mut rows = Vec::new();

    for record in reader.records() {
        let record =
            record.map_err(|e| invalid_response("influxdb", format!("Bad CSV: {}", e)))?;
        if is_annotation(&record) || record.iter().all(str::is_empty) {
            continue;
        }
        if is_header(&record) {
            header = Some(record);
            continue;
        }
        let Some(columns) = header.as_ref() else {
            return Err(invalid_response("influxdb", "CSV data row before header"));
        };

        let row: TelemetryRow = columns
            .iter()
            .zip(record.iter())
            .filter(|(name, value)| !name.is_empty() && !value.is_empty())
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        rows.push(row);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_table() {
        let body = ",result,table,_time,context\r\n\
            ,vessels,0,2024-06-01T12:00:00Z,vessels.urn:mrn:imo:mmsi:319139200\r\n\
            ,vessels,1,2024-06-01T12:05:00Z,vessels.urn:mrn:imo:mmsi:227000001\r\n";
        let rows = parse_rows(body).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].get("context").map(String::as_str),
            Some("vessels.urn:mrn:imo:mmsi:319139200")
        );
        assert_eq!(rows[1].get("table").map(String::as_str), Some("1"));
        assert!(!rows[0].contains_key(""));
    }

    #[test]
    fn test_parse_multiple_tables_with_new_header() {
        let body = ",result,table,_time,context\r\n\
            ,vessels,0,2024-06-01T12:00:00Z,vessels.urn:mrn:imo:mmsi:319139200\r\n\
            \r\n\
            ,result,table,_time,context,lat,lon\r\n\
            ,positions,0,2024-06-01T12:00:00Z,vessels.urn:mrn:imo:mmsi:319139200,43.7,7.42\r\n";
        let rows = parse_rows(body).unwrap();

        assert_eq!(rows.len(), 2);
        assert!(!rows[0].contains_key("lat"));
        assert_eq!(rows[1].get("lat").map(String::as_str), Some("43.7"));
        assert_eq!(rows[1].get("lon").map(String::as_str), Some("7.42"));
    }

    #[test]
    fn test_annotations_skipped_and_empty_cells_dropped() {
        let body = "#datatype,string,long,dateTime:RFC3339,string,double\r\n\
            #group,false,false,false,true,false\r\n\
            ,result,table,_time,context,lat\r\n\
            ,positions,0,2024-06-01T12:00:00Z,vessels.urn:mrn:imo:mmsi:319139200,\r\n";
        let rows = parse_rows(body).unwrap();

        assert_eq!(rows.len(), 1);
        assert!(!rows[0].contains_key("lat"));
    }

    #[test]
    fn test_empty_body_has_no_rows() {
        assert!(parse_rows("").unwrap().is_empty());
        assert!(parse_rows("\r\n").unwrap().is_empty());
    }

    #[test]
    fn test_data_before_header_is_invalid() {
        assert!(parse_rows(",vessels,0,2024-06-01T12:00:00Z\r\n").is_err());
    }
}

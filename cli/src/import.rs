//! CSV ingestion
//!
//! Files are parsed and cross-checked before anything touches the store, so a
//! bad file never leaves a half-imported catalog behind.

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use shelfwise::{MovementEvent, Product, Section, SectionId};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SECTION_COLUMNS: [&str; 4] = ["section_id", "name", "x", "y"];
const PRODUCT_COLUMNS: [&str; 4] = ["product_id", "name", "category", "current_section_id"];
const MOVEMENT_COLUMNS: [&str; 4] = ["session_id", "step_order", "section_id", "timestamp"];

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("{path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path}: missing required columns: {}", missing.join(", "))]
    MissingColumns { path: PathBuf, missing: Vec<String> },

    #[error("{path}: file has no data rows")]
    Empty { path: PathBuf },

    #[error("{path}: row {row} references unknown section '{section}'")]
    UnknownSection {
        path: PathBuf,
        row: usize,
        section: String,
    },

    #[error("{path}: row {row} has an unreadable timestamp '{value}'")]
    Timestamp {
        path: PathBuf,
        row: usize,
        value: String,
    },
}

#[derive(Debug, Deserialize)]
struct SectionRow {
    section_id: String,
    name: String,
    x: i32,
    y: i32,
}

#[derive(Debug, Deserialize)]
struct ProductRow {
    product_id: u64,
    name: String,
    category: String,
    current_section_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MovementRow {
    session_id: String,
    step_order: u32,
    section_id: String,
    timestamp: String,
}

/// A validated set of catalog and movement rows
#[derive(Debug)]
pub struct ImportBatch {
    pub sections: Vec<Section>,
    pub products: Vec<Product>,
    pub movements: Vec<MovementEvent>,
}

fn read_rows<T: serde::de::DeserializeOwned>(
    path: &Path,
    required: &[&str],
) -> Result<Vec<T>, ImportError> {
    let csv_err = |source| ImportError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = reader.headers().map_err(csv_err)?.clone();
    let missing: Vec<String> = required
        .iter()
        .filter(|column| !headers.iter().any(|h| h == **column))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ImportError::MissingColumns {
            path: path.to_path_buf(),
            missing,
        });
    }

    let rows = reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(csv_err)?;
    if rows.is_empty() {
        return Err(ImportError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(rows)
}

/// Unix milliseconds, RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS[.f]` read as UTC
pub fn parse_timestamp(value: &str) -> Option<i64> {
    if let Ok(millis) = value.parse::<i64>() {
        return Some(millis);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.timestamp_millis());
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|ts| ts.and_utc().timestamp_millis())
}

pub fn load_sections(path: &Path) -> Result<Vec<Section>, ImportError> {
    let rows: Vec<SectionRow> = read_rows(path, &SECTION_COLUMNS)?;
    Ok(rows
        .into_iter()
        .map(|r| Section::new(r.section_id, r.name, r.x, r.y))
        .collect())
}

pub fn load_products(path: &Path, known: &HashSet<SectionId>) -> Result<Vec<Product>, ImportError> {
    let rows: Vec<ProductRow> = read_rows(path, &PRODUCT_COLUMNS)?;
    let mut products = Vec::with_capacity(rows.len());

    for (i, row) in rows.into_iter().enumerate() {
        let current = row
            .current_section_id
            .filter(|s| !s.is_empty())
            .map(SectionId::from);
        if let Some(section) = &current {
            if !known.contains(section) {
                return Err(ImportError::UnknownSection {
                    path: path.to_path_buf(),
                    row: i + 1,
                    section: section.to_string(),
                });
            }
        }
        products.push(Product::new(row.product_id, row.name, row.category, current));
    }
    Ok(products)
}

pub fn load_movements(
    path: &Path,
    known: &HashSet<SectionId>,
) -> Result<Vec<MovementEvent>, ImportError> {
    let rows: Vec<MovementRow> = read_rows(path, &MOVEMENT_COLUMNS)?;
    let mut events = Vec::with_capacity(rows.len());

    for (i, row) in rows.into_iter().enumerate() {
        let section = SectionId::from(row.section_id);
        if !known.contains(&section) {
            return Err(ImportError::UnknownSection {
                path: path.to_path_buf(),
                row: i + 1,
                section: section.to_string(),
            });
        }
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| ImportError::Timestamp {
            path: path.to_path_buf(),
            row: i + 1,
            value: row.timestamp.clone(),
        })?;
        events.push(MovementEvent::new(row.session_id, row.step_order, section, timestamp));
    }
    Ok(events)
}

/// Parse and cross-check all three files
pub fn load_batch(
    sections: &Path,
    products: &Path,
    movements: &Path,
) -> Result<ImportBatch, ImportError> {
    let sections = load_sections(sections)?;
    let known: HashSet<SectionId> = sections.iter().map(|s| s.id.clone()).collect();
    let products = load_products(products, &known)?;
    let movements = load_movements(movements, &known)?;

    Ok(ImportBatch {
        sections,
        products,
        movements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("1704099600000"), Some(1_704_099_600_000));
        assert_eq!(parse_timestamp("2024-01-01T09:00:00Z"), Some(1_704_099_600_000));
        assert_eq!(parse_timestamp("2024-01-01 09:00:00"), Some(1_704_099_600_000));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_load_batch() {
        let dir = TempDir::new().unwrap();
        let sections = write(&dir, "sections.csv", "section_id,name,x,y\nA,Entrance,0,0\nB,Produce,1,0\n");
        let products = write(
            &dir,
            "products.csv",
            "product_id,name,category,current_section_id\n1,Apples,Produce,B\n2,Mystery,Misc,\n",
        );
        let movements = write(
            &dir,
            "movements.csv",
            "session_id,step_order,section_id,timestamp\ns1,0,A,2024-01-01 09:00:00\ns1,1,B,1704099660000\n",
        );

        let batch = load_batch(&sections, &products, &movements).unwrap();
        assert_eq!(batch.sections.len(), 2);
        assert_eq!(batch.products[1].current_section, None);
        assert_eq!(batch.movements[1].timestamp, 1_704_099_660_000);
    }

    #[test]
    fn test_missing_columns() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "sections.csv", "section_id,name\nA,Entrance\n");
        match load_sections(&path) {
            Err(ImportError::MissingColumns { missing, .. }) => {
                assert_eq!(missing, vec!["x".to_string(), "y".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "sections.csv", "section_id,name,x,y\n");
        assert!(matches!(load_sections(&path), Err(ImportError::Empty { .. })));
    }

    #[test]
    fn test_unknown_section_reference() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "movements.csv",
            "session_id,step_order,section_id,timestamp\ns1,0,Q,0\n",
        );
        let known: HashSet<SectionId> = [SectionId::new("A")].into_iter().collect();
        let err = load_movements(&path, &known).unwrap_err();
        assert!(matches!(err, ImportError::UnknownSection { row: 1, .. }));
    }
}

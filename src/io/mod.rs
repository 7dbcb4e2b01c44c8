//! Tab-separated reading and writing of expression data and cell metadata.

use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use log::debug;

use crate::batch::BatchLabels;
use crate::config::ColumnMapping;
use crate::dense::ExpressionMatrix;
use crate::error::{CombatError, Result};

fn column_index(headers: &StringRecord, name: &str, source: &str) -> Result<usize> {
    headers.iter().position(|h| h == name).ok_or_else(|| {
        CombatError::input(format!(
            "column '{}' not found in {} (columns: {})",
            name,
            source,
            headers.iter().collect::<Vec<_>>().join(", ")
        ))
    })
}

fn field<'r>(record: &'r StringRecord, index: usize, line: u64) -> Result<&'r str> {
    record
        .get(index)
        .ok_or_else(|| CombatError::input(format!("line {}: missing field {}", line, index + 1)))
}

/// Reads a long-format table (one row per feature, sample, value) and
/// pivots it into a features × samples matrix. Absent pairs are zero.
pub fn read_expression_long<R: Read>(reader: R, columns: &ColumnMapping) -> Result<ExpressionMatrix> {
    let mut rdr = ReaderBuilder::new().delimiter(b'\t').from_reader(reader);
    let headers = rdr.headers()?.clone();
    let gene_col = column_index(&headers, &columns.genes, "expression table")?;
    let cell_col = column_index(&headers, &columns.cells, "expression table")?;
    let expr_col = column_index(&headers, &columns.expression, "expression table")?;

    let mut triples = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let raw = field(&record, expr_col, line)?.trim();
        let value: f64 = raw.parse().map_err(|_| {
            CombatError::input(format!("line {}: invalid expression value '{}'", line, raw))
        })?;
        triples.push((
            field(&record, gene_col, line)?.to_string(),
            field(&record, cell_col, line)?.to_string(),
            value,
        ));
    }
    if triples.is_empty() {
        return Err(CombatError::input("expression table has no rows"));
    }

    let matrix = ExpressionMatrix::from_triples(triples)?;
    debug!(
        "pivoted expression table into {} features x {} samples",
        matrix.nfeatures(),
        matrix.nsamples()
    );
    Ok(matrix)
}

/// Reads the batch label of every cell from a metadata table.
pub fn read_batch_labels<R: Read>(reader: R, columns: &ColumnMapping) -> Result<BatchLabels> {
    let mut rdr = ReaderBuilder::new().delimiter(b'\t').from_reader(reader);
    let headers = rdr.headers()?.clone();
    let cell_col = column_index(&headers, &columns.cells, "cell metadata")?;
    let batch_col = column_index(&headers, &columns.batch, "cell metadata")?;

    let mut pairs = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        pairs.push((
            field(&record, cell_col, line)?.to_string(),
            field(&record, batch_col, line)?.to_string(),
        ));
    }
    BatchLabels::from_pairs(pairs)
}

/// Writes the matrix with sample ids as header and one row per feature.
pub fn write_matrix<W: Write>(writer: W, matrix: &ExpressionMatrix) -> Result<()> {
    let mut wtr = WriterBuilder::new().delimiter(b'\t').from_writer(writer);

    let mut header = vec![String::new()];
    header.extend(matrix.sample_ids().iter().cloned());
    wtr.write_record(&header)?;

    for (feature, row) in matrix.feature_ids().iter().zip(matrix.values().rows()) {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(feature.clone());
        record.extend(row.iter().map(|v| v.to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Reads a matrix in the layout produced by [`write_matrix`].
pub fn read_matrix<R: Read>(reader: R) -> Result<ExpressionMatrix> {
    let mut rdr = ReaderBuilder::new().delimiter(b'\t').from_reader(reader);
    let headers = rdr.headers()?.clone();
    let sample_ids: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut feature_ids = Vec::new();
    let mut values = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        feature_ids.push(field(&record, 0, line)?.to_string());
        for raw in record.iter().skip(1) {
            values.push(raw.trim().parse::<f64>().map_err(|_| {
                CombatError::input(format!("line {}: invalid value '{}'", line, raw))
            })?);
        }
    }

    let values = ndarray::Array2::from_shape_vec((feature_ids.len(), sample_ids.len()), values)
        .map_err(|e| CombatError::input(format!("ragged matrix: {}", e)))?;
    ExpressionMatrix::new(values, feature_ids, sample_ids)
}

pub fn read_expression_file<P: AsRef<Path>>(path: P, columns: &ColumnMapping) -> Result<ExpressionMatrix> {
    read_expression_long(std::fs::File::open(path)?, columns)
}

pub fn read_batch_labels_file<P: AsRef<Path>>(path: P, columns: &ColumnMapping) -> Result<BatchLabels> {
    read_batch_labels(std::fs::File::open(path)?, columns)
}

pub fn write_matrix_file<P: AsRef<Path>>(path: P, matrix: &ExpressionMatrix) -> Result<()> {
    write_matrix(std::fs::File::create(path)?, matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn columns() -> ColumnMapping {
        ColumnMapping {
            cells: "cell".into(),
            genes: "gene".into(),
            expression: "value".into(),
            batch: "batch".into(),
        }
    }

    #[test]
    fn test_read_long_format() {
        let data = "gene\tcell\tvalue\n\
                    g1\tc1\t1.5\n\
                    g2\tc1\t2\n\
                    g1\tc2\t3.25\n";
        let matrix = read_expression_long(data.as_bytes(), &columns()).unwrap();
        assert_eq!(matrix.feature_ids(), &["g1", "g2"]);
        assert_eq!(matrix.sample_ids(), &["c1", "c2"]);
        assert_eq!(matrix.values(), array![[1.5, 3.25], [2.0, 0.0]]);
    }

    #[test]
    fn test_default_column_names() {
        let data = "entrezId*Ganzzahl\tcellId*Ganzzahl\texpressionValue*Zahl\n7\t1\t0.5\n";
        let matrix = read_expression_long(data.as_bytes(), &ColumnMapping::default()).unwrap();
        assert_eq!(matrix.shape(), (1, 1));
    }

    #[test]
    fn test_missing_column_and_bad_value() {
        let missing = "gene\tcell\n g1\tc1\n";
        assert!(matches!(
            read_expression_long(missing.as_bytes(), &columns()),
            Err(CombatError::Input { .. })
        ));

        let bad = "gene\tcell\tvalue\ng1\tc1\tabc\n";
        assert!(matches!(
            read_expression_long(bad.as_bytes(), &columns()),
            Err(CombatError::Input { .. })
        ));

        let empty = "gene\tcell\tvalue\n";
        assert!(read_expression_long(empty.as_bytes(), &columns()).is_err());
    }

    #[test]
    fn test_read_batch_labels() {
        let meta = "cell\tbatch\tdonor\nc1\tb1\td1\nc2\tb2\td1\n";
        let labels = read_batch_labels(meta.as_bytes(), &columns()).unwrap();
        assert_eq!(labels.get("c1"), Some("b1"));
        assert_eq!(labels.get("c2"), Some("b2"));

        let duplicated = "cell\tbatch\nc1\tb1\nc1\tb2\n";
        assert!(read_batch_labels(duplicated.as_bytes(), &columns())
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn test_matrix_written_as_tsv() {
        let matrix = ExpressionMatrix::new(
            array![[1.0, -0.5], [2.25, 3.0]],
            vec!["g1".into(), "g2".into()],
            vec!["c1".into(), "c2".into()],
        )
        .unwrap();

        let mut buffer = Vec::new();
        write_matrix(&mut buffer, &matrix).unwrap();
        let text = String::from_utf8(buffer.clone()).unwrap();
        assert_eq!(text, "\tc1\tc2\ng1\t1\t-0.5\ng2\t2.25\t3\n");

        let back = read_matrix(buffer.as_slice()).unwrap();
        assert_eq!(back, matrix);
    }

    #[test]
    fn test_file_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrected.tsv");
        let matrix = ExpressionMatrix::new(
            array![[1.0, 2.0]],
            vec!["g".into()],
            vec!["a".into(), "b".into()],
        )
        .unwrap();
        write_matrix_file(&path, &matrix).unwrap();
        let back = read_matrix(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(back, matrix);
        assert!(read_expression_file(dir.path().join("absent.tsv"), &columns()).is_err());
    }
}

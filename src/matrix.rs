//! Square distance matrix reading and validation for the de novo path.
//!
//! The matrix file is a delimited table whose header names every sample and
//! whose rows repeat those names in the same order (or a consistently
//! reorderable one, with `sort`). Validation mirrors the assignment path's
//! fail-fast policy: the matrix is either fully usable or the run aborts.

use std::io::BufRead;
use std::path::PathBuf;

use crate::error::{GasError, Result};
use crate::reader::open_table;

/// Relative tolerance for the triangle symmetry check.
const SYMMETRY_RTOL: f64 = 1e-9;

/// A validated square distance matrix, reduced to its condensed form.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    pub labels: Vec<String>,
    /// Upper triangle, row-major: `(0,1), (0,2), .., (1,2), ..`;
    /// `n * (n - 1) / 2` entries for `n` labels.
    pub condensed: Vec<f64>,
}

impl DistanceMatrix {
    pub fn num_samples(&self) -> usize {
        self.labels.len()
    }
}

/// Read and validate a distance matrix file.
///
/// Checks, in order: numeric values (`Parse`), NaN-freeness, squareness,
/// row/column label agreement, and symmetry of the two triangles
/// (`MatrixShape`). With `sort`, rows and columns are lexically sorted
/// before the label agreement check.
pub fn read_distance_matrix(
    path: impl Into<PathBuf>,
    sort: bool,
) -> Result<DistanceMatrix> {
    let path = path.into();
    let mut lines = open_table(&path)?.lines();

    let header = match lines.next() {
        Some(Ok(line)) => line,
        Some(Err(e)) => return Err(GasError::io(&path, "read", e)),
        None => return Err(GasError::header(&path, "missing header row")),
    };
    // first header token names the label column, the rest are sample labels
    let mut col_labels: Vec<String> = header
        .trim_end_matches('\r')
        .split('\t')
        .skip(1)
        .map(|s| s.to_string())
        .collect();
    if col_labels.is_empty() {
        return Err(GasError::header(
            &path,
            "expected a label column followed by at least one sample column",
        ));
    }

    let mut row_labels: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut line_number: u64 = 1;
    for line in lines {
        let line = line.map_err(|e| GasError::io(&path, "read", e))?;
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.trim_end_matches('\r').split('\t');
        let label = fields.next().unwrap_or_default();
        let mut values = Vec::with_capacity(col_labels.len());
        for raw in fields {
            let value: f64 = raw.trim().parse().map_err(|_| {
                GasError::parse(
                    &path,
                    line_number,
                    format!("matrix must only contain numerical values (got '{}')", raw),
                )
            })?;
            if value.is_nan() {
                return Err(GasError::matrix_shape(
                    &path,
                    "matrix contains NaN, null or NA values",
                ));
            }
            values.push(value);
        }
        row_labels.push(label.to_string());
        rows.push(values);
    }

    let n = col_labels.len();
    if row_labels.len() != n || rows.iter().any(|r| r.len() != n) {
        return Err(GasError::matrix_shape(
            &path,
            format!(
                "matrix must have (n x n) dimensions ({} columns, {} rows)",
                n,
                row_labels.len()
            ),
        ));
    }

    if sort {
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| row_labels[a].cmp(&row_labels[b]));
        let col_order = {
            let mut order: Vec<usize> = (0..n).collect();
            order.sort_by(|&a, &b| col_labels[a].cmp(&col_labels[b]));
            order
        };
        row_labels = order.iter().map(|&i| row_labels[i].clone()).collect();
        rows = order
            .iter()
            .map(|&i| col_order.iter().map(|&j| rows[i][j]).collect())
            .collect();
        col_labels = col_order.iter().map(|&j| col_labels[j].clone()).collect();
    }

    if row_labels != col_labels {
        return Err(GasError::matrix_shape(
            &path,
            "row and column labels must match and be in the same order",
        ));
    }

    // both triangles must agree
    for i in 0..n {
        for j in (i + 1)..n {
            let upper = rows[i][j];
            let lower = rows[j][i];
            let scale = upper.abs().max(lower.abs()).max(1.0);
            if (upper - lower).abs() > SYMMETRY_RTOL * scale {
                return Err(GasError::matrix_shape(
                    &path,
                    format!(
                        "non-symmetrical values for ({}, {}): {} vs {}",
                        row_labels[i], row_labels[j], upper, lower
                    ),
                ));
            }
        }
    }

    let mut condensed = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            condensed.push(rows[i][j]);
        }
    }

    Ok(DistanceMatrix {
        labels: row_labels,
        condensed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_table(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_reads_condensed_upper_triangle() {
        let file = write_table(
            "dists\tA\tB\tC\n\
             A\t0\t1\t2\n\
             B\t1\t0\t3\n\
             C\t2\t3\t0\n",
        );
        let matrix = read_distance_matrix(file.path(), false).unwrap();
        assert_eq!(matrix.labels, vec!["A", "B", "C"]);
        assert_eq!(matrix.condensed, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_non_numeric_value_is_parse_error() {
        let file = write_table(
            "dists\tA\tB\n\
             A\t0\tx\n\
             B\t1\t0\n",
        );
        assert!(matches!(
            read_distance_matrix(file.path(), false),
            Err(GasError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn test_nan_rejected() {
        let file = write_table(
            "dists\tA\tB\n\
             A\t0\tNaN\n\
             B\t1\t0\n",
        );
        assert!(matches!(
            read_distance_matrix(file.path(), false),
            Err(GasError::MatrixShape { .. })
        ));
    }

    #[test]
    fn test_non_square_rejected() {
        let file = write_table(
            "dists\tA\tB\tC\n\
             A\t0\t1\t2\n\
             B\t1\t0\t3\n",
        );
        assert!(matches!(
            read_distance_matrix(file.path(), false),
            Err(GasError::MatrixShape { .. })
        ));
    }

    #[test]
    fn test_label_order_mismatch_rejected() {
        let file = write_table(
            "dists\tA\tB\n\
             B\t0\t1\n\
             A\t1\t0\n",
        );
        assert!(matches!(
            read_distance_matrix(file.path(), false),
            Err(GasError::MatrixShape { .. })
        ));
    }

    #[test]
    fn test_sort_reorders_rows_and_columns() {
        // same matrix as test_reads_condensed_upper_triangle with rows and
        // columns both in the order C, A, B
        let file = write_table(
            "dists\tC\tA\tB\n\
             C\t0\t2\t3\n\
             A\t2\t0\t1\n\
             B\t3\t1\t0\n",
        );
        let matrix = read_distance_matrix(file.path(), true).unwrap();
        assert_eq!(matrix.labels, vec!["A", "B", "C"]);
        assert_eq!(matrix.condensed, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_asymmetry_rejected() {
        let file = write_table(
            "dists\tA\tB\n\
             A\t0\t1\n\
             B\t2\t0\n",
        );
        assert!(matches!(
            read_distance_matrix(file.path(), false),
            Err(GasError::MatrixShape { .. })
        ));
    }
}

//! Unified error type for the gaddr library.
//!
//! This module provides a structured error type that captures all failure modes
//! in the library with appropriate context. Library code uses `GasError` while
//! CLI code continues using `anyhow::Result` for convenience.
//!
//! # Error Categories
//!
//! - **Config**: Invalid configuration (method name, batch size, delimiter, thresholds)
//! - **InputFile**: Missing or empty input files
//! - **Header**: Missing or malformed table headers
//! - **AddressFormat**: Reference addresses that fail validation, bucketed by cause
//! - **MatrixShape**: Distance matrices that are not square/symmetric/numeric
//! - **Parse**: Malformed numeric fields mid-stream
//! - **Io**: File system operations (open, read, write)

use std::fmt;
use std::path::PathBuf;

/// Unified error type for the gaddr library.
#[derive(Debug)]
pub enum GasError {
    /// Invalid configuration detected before any processing begins.
    Config(String),

    /// Input file missing or empty.
    InputFile { path: PathBuf, detail: String },

    /// Missing or malformed header row.
    Header { path: PathBuf, detail: String },

    /// Reference addresses that failed validation, grouped by failure mode.
    /// Each bucket carries the offending sample ids so the caller can render
    /// one diagnostic per bucket.
    AddressFormat {
        path: PathBuf,
        missing_delimiter: Vec<String>,
        wrong_length: Vec<String>,
        non_integer: Vec<String>,
        level_names: Vec<String>,
    },

    /// Distance matrix shape violation (non-square, asymmetric, NaN).
    MatrixShape { path: PathBuf, detail: String },

    /// Malformed numeric field. Fatal: later batches depend on earlier ones,
    /// so a corrupt distance stream is not salvageable row by row.
    Parse {
        path: PathBuf,
        line: u64,
        detail: String,
    },

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: std::io::Error,
    },
}

impl fmt::Display for GasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GasError::Config(msg) => write!(f, "Configuration error: {}", msg),
            GasError::InputFile { path, detail } => {
                write!(f, "Input file '{}': {}", path.display(), detail)
            }
            GasError::Header { path, detail } => {
                write!(f, "Invalid header in '{}': {}", path.display(), detail)
            }
            GasError::AddressFormat {
                path,
                missing_delimiter,
                wrong_length,
                non_integer,
                level_names,
            } => {
                writeln!(
                    f,
                    "Invalid addresses in '{}' for levels [{}]:",
                    path.display(),
                    level_names.join(", ")
                )?;
                if !missing_delimiter.is_empty() {
                    writeln!(
                        f,
                        "  missing delimiter: {}",
                        missing_delimiter.join(", ")
                    )?;
                }
                if !wrong_length.is_empty() {
                    writeln!(f, "  wrong number of levels: {}", wrong_length.join(", "))?;
                }
                if !non_integer.is_empty() {
                    writeln!(f, "  non-integer labels: {}", non_integer.join(", "))?;
                }
                Ok(())
            }
            GasError::MatrixShape { path, detail } => {
                write!(f, "Invalid distance matrix '{}': {}", path.display(), detail)
            }
            GasError::Parse { path, line, detail } => {
                write!(f, "Parse error in '{}' line {}: {}", path.display(), line, detail)
            }
            GasError::Io {
                path,
                operation,
                source,
            } => {
                write!(
                    f,
                    "I/O error during {} on '{}': {}",
                    operation,
                    path.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for GasError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GasError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Convenience type alias for Results using GasError.
pub type Result<T> = std::result::Result<T, GasError>;

// ============================================================================
// Helper constructors
// ============================================================================

impl GasError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        GasError::Config(msg.into())
    }

    /// Create an input file error.
    pub fn input_file(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        GasError::InputFile {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Create a header error.
    pub fn header(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        GasError::Header {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Create a matrix shape error.
    pub fn matrix_shape(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        GasError::MatrixShape {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Create a parse error with line context.
    pub fn parse(path: impl Into<PathBuf>, line: u64, detail: impl Into<String>) -> Self {
        GasError::Parse {
            path: path.into(),
            line,
            detail: detail.into(),
        }
    }

    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, operation: &'static str, source: std::io::Error) -> Self {
        GasError::Io {
            path: path.into(),
            operation,
            source,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

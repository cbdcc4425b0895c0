//! Training dataset loading.
//!
//! The dataset is a list of observed `(user, item, rating)` triples. It is
//! read once at startup, handed to the factorizer, and dropped.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::constants::cli::{MODE_BINARY, MODE_TEXT};
use crate::error::{ConfigError, DatasetError};

/// Size of one packed binary record: `u32 user, u32 item, f32 rating`.
const BINARY_RECORD_LEN: usize = 12;

/// One observed rating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rating {
    pub user: u32,
    pub item: u32,
    pub value: f32,
}

/// On-disk encoding of the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    /// `user item rating` per line, whitespace or comma separated.
    Text,
    /// Packed little-endian records.
    Binary,
}

impl TryFrom<u8> for DatasetFormat {
    type Error = ConfigError;

    fn try_from(mode: u8) -> Result<Self, Self::Error> {
        match mode {
            MODE_TEXT => Ok(DatasetFormat::Text),
            MODE_BINARY => Ok(DatasetFormat::Binary),
            other => Err(ConfigError::Validation(format!(
                "dataset mode must be {} (text) or {} (binary), got {}",
                MODE_TEXT, MODE_BINARY, other
            ))),
        }
    }
}

/// Observed ratings plus the matrix dimensions they imply.
#[derive(Debug, Clone)]
pub struct Dataset {
    ratings: Vec<Rating>,
    num_users: u32,
    num_items: u32,
}

impl Dataset {
    /// Build a dataset from ratings; dimensions are `max id + 1` on each axis.
    pub fn from_ratings(ratings: Vec<Rating>) -> Result<Self, DatasetError> {
        if ratings.is_empty() {
            return Err(DatasetError::Empty);
        }

        let mut max_user = 0u32;
        let mut max_item = 0u32;
        for r in &ratings {
            if !r.value.is_finite() {
                return Err(DatasetError::NonFiniteRating {
                    user: r.user,
                    item: r.item,
                });
            }
            max_user = max_user.max(r.user);
            max_item = max_item.max(r.item);
        }

        let num_users = max_user
            .checked_add(1)
            .ok_or(DatasetError::IdentifierOverflow(max_user))?;
        let num_items = max_item
            .checked_add(1)
            .ok_or(DatasetError::IdentifierOverflow(max_item))?;

        Ok(Self {
            ratings,
            num_users,
            num_items,
        })
    }

    /// Read and parse a dataset file.
    pub fn load(path: &Path, format: DatasetFormat) -> Result<Self, DatasetError> {
        let bytes = fs::read(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Read {} bytes from {:?}", bytes.len(), path);

        match format {
            DatasetFormat::Text => {
                let text = String::from_utf8_lossy(&bytes);
                Self::parse_text(&text)
            }
            DatasetFormat::Binary => Self::parse_binary(&bytes),
        }
    }

    /// Parse the text encoding. Blank lines and `#` comments are skipped.
    pub fn parse_text(text: &str) -> Result<Self, DatasetError> {
        let mut ratings = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|f| !f.is_empty())
                .collect();
            if fields.len() != 3 {
                return Err(DatasetError::Parse {
                    line: line_no,
                    reason: format!("expected 3 fields, found {}", fields.len()),
                });
            }

            let user = parse_field::<u32>(fields[0], "user", line_no)?;
            let item = parse_field::<u32>(fields[1], "item", line_no)?;
            let value = parse_field::<f32>(fields[2], "rating", line_no)?;
            ratings.push(Rating { user, item, value });
        }

        Self::from_ratings(ratings)
    }

    /// Parse the packed binary encoding.
    pub fn parse_binary(bytes: &[u8]) -> Result<Self, DatasetError> {
        let whole = bytes.len() - bytes.len() % BINARY_RECORD_LEN;
        if whole != bytes.len() {
            return Err(DatasetError::TruncatedRecord { offset: whole });
        }

        let ratings = bytes
            .chunks_exact(BINARY_RECORD_LEN)
            .map(|rec| Rating {
                user: u32::from_le_bytes([rec[0], rec[1], rec[2], rec[3]]),
                item: u32::from_le_bytes([rec[4], rec[5], rec[6], rec[7]]),
                value: f32::from_le_bytes([rec[8], rec[9], rec[10], rec[11]]),
            })
            .collect();

        Self::from_ratings(ratings)
    }

    /// Encode ratings in the binary layout understood by [`Dataset::parse_binary`].
    pub fn encode_binary(ratings: &[Rating]) -> Vec<u8> {
        let mut out = Vec::with_capacity(ratings.len() * BINARY_RECORD_LEN);
        for r in ratings {
            out.extend_from_slice(&r.user.to_le_bytes());
            out.extend_from_slice(&r.item.to_le_bytes());
            out.extend_from_slice(&r.value.to_le_bytes());
        }
        out
    }

    pub fn ratings(&self) -> &[Rating] {
        &self.ratings
    }

    pub fn num_users(&self) -> u32 {
        self.num_users
    }

    pub fn num_items(&self) -> u32 {
        self.num_items
    }

    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }
}

fn parse_field<T: std::str::FromStr>(
    field: &str,
    name: &str,
    line: usize,
) -> Result<T, DatasetError> {
    field.parse::<T>().map_err(|_| DatasetError::Parse {
        line,
        reason: format!("invalid {} value {:?}", name, field),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_text_dimensions() {
        let ds = Dataset::parse_text("# header\n0 0 5\n1,1,3.5\n\n2 0 1\n").unwrap();

        assert_eq!(ds.len(), 3);
        assert_eq!(ds.num_users(), 3);
        assert_eq!(ds.num_items(), 2);
        assert_eq!(ds.ratings()[1], Rating { user: 1, item: 1, value: 3.5 });
    }

    #[test]
    fn test_parse_text_rejects_bad_lines() {
        let err = Dataset::parse_text("0 0 5\n1 1\n").unwrap_err();
        assert!(matches!(err, DatasetError::Parse { line: 2, .. }));

        let err = Dataset::parse_text("0 x 5\n").unwrap_err();
        assert!(matches!(err, DatasetError::Parse { line: 1, .. }));

        let err = Dataset::parse_text("0 -1 5\n").unwrap_err();
        assert!(matches!(err, DatasetError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_empty_and_non_finite() {
        assert!(matches!(
            Dataset::parse_text("# nothing\n"),
            Err(DatasetError::Empty)
        ));
        assert!(matches!(
            Dataset::parse_text("0 0 NaN\n"),
            Err(DatasetError::NonFiniteRating { user: 0, item: 0 })
        ));
    }

    #[test]
    fn test_identifier_overflow() {
        let ratings = vec![Rating { user: u32::MAX, item: 0, value: 1.0 }];
        assert!(matches!(
            Dataset::from_ratings(ratings),
            Err(DatasetError::IdentifierOverflow(u32::MAX))
        ));
    }

    #[test]
    fn test_binary_layout() {
        let ratings = vec![
            Rating { user: 0, item: 1, value: 4.0 },
            Rating { user: 2, item: 0, value: 2.5 },
        ];
        let bytes = Dataset::encode_binary(&ratings);
        assert_eq!(bytes.len(), 24);

        let ds = Dataset::parse_binary(&bytes).unwrap();
        assert_eq!(ds.ratings(), ratings.as_slice());

        let err = Dataset::parse_binary(&bytes[..20]).unwrap_err();
        assert!(matches!(err, DatasetError::TruncatedRecord { offset: 12 }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0 0 5\n1 1 3").unwrap();

        let ds = Dataset::load(file.path(), DatasetFormat::Text).unwrap();
        assert_eq!(ds.num_users(), 2);

        let missing = Dataset::load(Path::new("/nonexistent/ratings.txt"), DatasetFormat::Text);
        assert!(matches!(missing, Err(DatasetError::Io { .. })));
    }

    #[test]
    fn test_format_from_mode() {
        assert_eq!(DatasetFormat::try_from(1).unwrap(), DatasetFormat::Text);
        assert_eq!(DatasetFormat::try_from(2).unwrap(), DatasetFormat::Binary);
        assert!(DatasetFormat::try_from(3).is_err());
    }
}

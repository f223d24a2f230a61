//! Label Table
//!
//! Ordered label strings read once from a newline-delimited file. Index `i`
//! names the `i`-th score of the model output. Immutable after load and shared
//! behind an `Arc` across all requests.

use crate::error::LabelError;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    /// Read the label file. Trailing blank lines are ignored; a blank line
    /// between labels would shift every later index and is rejected.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LabelError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| LabelError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        // A leading byte order mark is not part of the first label
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

        // Labels are kept verbatim apart from the line terminator
        let mut labels: Vec<String> = content.lines().map(str::to_string).collect();
        while labels.last().is_some_and(|l| l.trim().is_empty()) {
            labels.pop();
        }

        if labels.is_empty() {
            return Err(LabelError::Empty {
                path: path.to_path_buf(),
            });
        }

        if let Some(idx) = labels.iter().position(|l| l.trim().is_empty()) {
            return Err(LabelError::BlankLabel {
                path: path.to_path_buf(),
                line: idx + 1,
            });
        }

        info!(path = %path.display(), count = labels.len(), "Loaded label table");
        Ok(Self { labels })
    }

    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn get(&self, index: usize) -> Result<&str, LabelError> {
        self.labels
            .get(index)
            .map(String::as_str)
            .ok_or(LabelError::IndexOutOfRange {
                index,
                len: self.labels.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

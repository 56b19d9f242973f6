//! Reader for the sectioned `key=value` calibration files.
//!
//! Every pyramid level of a dataset is described by one of these files:
//!
//! ```text
//! [Header]
//! iImageWidth=752
//! iImageHeight=480
//! lXStepSize=2256
//!
//! [Da0]
//! x=114000
//! y=51000
//! ```
//!
//! The grammar is deliberately forgiving: comment lines (`;` or `#`), blank
//! lines and lines without `=` are skipped, and keys that appear before the
//! first section header land in an unnamed section.

use std::path::Path;

use crate::error::IoError;

// =============================================================================
// IniSection
// =============================================================================

/// One bracketed section and its entries, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IniSection {
    name: String,
    entries: Vec<(String, String)>,
}

impl IniSection {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Section name without brackets. Empty for the leading unnamed section.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a key. When a key repeats, the last value wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All entries in file order.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Number of entries in this section.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the section has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// IniDocument
// =============================================================================

/// A parsed calibration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: Vec<IniSection>,
}

impl IniDocument {
    /// Parse calibration text.
    ///
    /// Parsing never fails; malformed lines are skipped.
    pub fn parse(text: &str) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut sections: Vec<IniSection> = Vec::new();

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                if let Some(end) = rest.find(']') {
                    sections.push(IniSection::new(rest[..end].trim()));
                    continue;
                }
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };

            if sections.is_empty() {
                sections.push(IniSection::new(""));
            }
            if let Some(current) = sections.last_mut() {
                current
                    .entries
                    .push((key.trim().to_string(), value.trim().to_string()));
            }
        }

        Self { sections }
    }

    /// Read and parse a calibration file from disk.
    ///
    /// The file is expected to be ASCII; invalid UTF-8 is replaced rather
    /// than rejected.
    pub fn read(path: &Path) -> Result<Self, IoError> {
        let bytes =
            std::fs::read(path).map_err(|e| IoError::from_std(path.display().to_string(), &e))?;
        Ok(Self::parse(&String::from_utf8_lossy(&bytes)))
    }

    /// First section with exactly this name.
    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// First section whose name matches ignoring ASCII case.
    pub fn section_ignore_case(&self, name: &str) -> Option<&IniSection> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// All sections in file order, including the unnamed leading section.
    pub fn sections(&self) -> impl Iterator<Item = &IniSection> {
        self.sections.iter()
    }

    /// Number of sections.
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }
}

// =============================================================================
// Tests
// =============================================================================

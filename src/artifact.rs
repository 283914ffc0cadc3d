//! Figure records and registration requests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Digits used when formatting a sequence id
const SEQUENCE_WIDTH: usize = 3;

/// A registered figure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Unique key (e.g., "fig:intro")
    pub label: String,
    /// Zero-padded creation sequence (e.g., "007")
    pub sequence_id: String,
    /// Figure file name as referenced by documents
    pub filename: String,
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Script or tool that produced the figure
    pub generator: String,
    pub width: String,
    pub placement: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Absent in stores written before timestamps were recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<DateTime<Utc>>,
}

impl ArtifactRecord {
    /// Numeric value of the sequence id, read from its trailing digits
    pub fn sequence_number(&self) -> Option<u64> {
        parse_sequence(&self.sequence_id)
    }
}

/// Parse the trailing run of ASCII digits in a sequence id
///
/// Accepts bare ids ("012") as well as prefixed ones ("fig_012").
pub fn parse_sequence(id: &str) -> Option<u64> {
    let digits_start = id
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    id[digits_start..].parse().ok()
}

/// Format a sequence number as a zero-padded id
pub fn format_sequence(n: u64) -> String {
    format!("{:0width$}", n, width = SEQUENCE_WIDTH)
}

/// Request to register a figure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FigureSpec {
    pub filename: String,
    pub caption: String,
    pub label: Option<String>,
    pub section: Option<String>,
    pub width: Option<String>,
    pub placement: Option<String>,
    pub generator: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl FigureSpec {
    /// Create a spec with only the required fields
    pub fn new(filename: impl Into<String>, caption: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            caption: caption.into(),
            ..Default::default()
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn width(mut self, width: impl Into<String>) -> Self {
        self.width = Some(width.into());
        self
    }

    pub fn placement(mut self, placement: impl Into<String>) -> Self {
        self.placement = Some(placement.into());
        self
    }

    pub fn generator(mut self, generator: impl Into<String>) -> Self {
        self.generator = Some(generator.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The label this spec registers under
    ///
    /// Falls back to `fig:<stem>` derived from the filename.
    pub fn resolved_label(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => {
                let stem = Path::new(&self.filename)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| self.filename.clone());
                format!("fig:{}", stem)
            }
        }
    }

    /// Build the record this spec produces under a given sequence id
    pub(crate) fn into_record(self, sequence_id: String, default_generator: &str) -> ArtifactRecord {
        let label = self.resolved_label();
        ArtifactRecord {
            label,
            sequence_id,
            filename: self.filename,
            caption: self.caption,
            section: self.section,
            generator: self
                .generator
                .unwrap_or_else(|| default_generator.to_string()),
            width: self.width.unwrap_or_else(|| "\\linewidth".to_string()),
            placement: self.placement.unwrap_or_else(|| "htbp".to_string()),
            metadata: self.metadata,
            registered_at: Some(Utc::now()),
        }
    }
}

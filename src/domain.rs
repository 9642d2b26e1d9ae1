use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::TaxlenError;

/// Nucleotide database queried by the survey.
pub const NUCLEOTIDE_DB: &str = "nucleotide";

/// Upper bound on records returned by the single bulk fetch. Taxa with more
/// matches are truncated to the first `MAX_RECORDS` in NCBI's default order.
pub const MAX_RECORDS: u32 = 500;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaxonId(String);

impl TaxonId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Entrez term restricting a search to this taxon and its descendants.
    pub fn organism_term(&self) -> String {
        format!("txid{}[Organism]", self.0)
    }
}

impl fmt::Display for TaxonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaxonId {
    type Err = TaxlenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let digits = trimmed
            .strip_prefix("txid")
            .or_else(|| trimmed.strip_prefix("TXID"))
            .unwrap_or(trimmed);
        let is_valid = !digits.is_empty() && digits.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(TaxlenError::InvalidTaxonId(value.to_string()));
        }
        Ok(Self(digits.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCriteria {
    taxon_id: TaxonId,
    min_length: u64,
    max_length: u64,
}

impl SearchCriteria {
    pub fn new(taxon_id: TaxonId, min_length: u64, max_length: u64) -> Result<Self, TaxlenError> {
        if min_length > max_length {
            return Err(TaxlenError::InvalidLengthRange {
                min: min_length,
                max: max_length,
            });
        }
        Ok(Self {
            taxon_id,
            min_length,
            max_length,
        })
    }

    pub fn taxon_id(&self) -> &TaxonId {
        &self.taxon_id
    }

    pub fn min_length(&self) -> u64 {
        self.min_length
    }

    pub fn max_length(&self) -> u64 {
        self.max_length
    }

    pub fn accepts(&self, length: u64) -> bool {
        self.min_length <= length && length <= self.max_length
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub api_key: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            api_key: api_key.into(),
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        let key = self.api_key.trim();
        (!key.is_empty()).then_some(key)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &"<redacted>")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRecord {
    #[serde(rename = "Accession")]
    pub accession: String,
    #[serde(rename = "Length")]
    pub length: u64,
    #[serde(rename = "Description")]
    pub description: String,
}

impl SequenceRecord {
    pub fn new(accession: impl Into<String>, length: u64, description: impl Into<String>) -> Self {
        Self {
            accession: accession.into(),
            length,
            description: description.into(),
        }
    }
}

/// Records ordered by length, longest first. Equal lengths keep retrieval order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReportTable {
    rows: Vec<SequenceRecord>,
}

impl ReportTable {
    pub fn from_records(mut records: Vec<SequenceRecord>) -> Self {
        // `sort_by` is stable.
        records.sort_by(|a, b| b.length.cmp(&a.length));
        Self { rows: records }
    }

    pub fn rows(&self) -> &[SequenceRecord] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<SequenceRecord> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_sorted(&self) -> bool {
        self.rows.windows(2).all(|pair| pair[0].length >= pair[1].length)
    }

    pub fn ensure_sorted(self) -> Self {
        if self.is_sorted() {
            self
        } else {
            Self::from_records(self.rows)
        }
    }

    pub fn longest(&self) -> Option<&SequenceRecord> {
        self.rows.first()
    }

    pub fn shortest(&self) -> Option<&SequenceRecord> {
        self.rows.last()
    }
}

/// Unsorted rows, e.g. a table assembled by hand. `ensure_sorted` restores the order.
impl From<Vec<SequenceRecord>> for ReportTable {
    fn from(rows: Vec<SequenceRecord>) -> Self {
        Self { rows }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub report: Utf8PathBuf,
    pub chart: Utf8PathBuf,
}

impl ArtifactPaths {
    pub fn new(output_dir: &Utf8Path, taxon_id: &TaxonId) -> Self {
        Self {
            report: output_dir.join(format!("taxid_{taxon_id}_report.csv")),
            chart: output_dir.join(format!("taxid_{taxon_id}_plot.png")),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_taxon_id_strips_prefix() {
        let id: TaxonId = " txid9606 ".parse().unwrap();
        assert_eq!(id.as_str(), "9606");
        assert_eq!(id.organism_term(), "txid9606[Organism]");
    }

    #[test]
    fn parse_taxon_id_invalid() {
        let err = "Homo sapiens".parse::<TaxonId>().unwrap_err();
        assert_matches!(err, TaxlenError::InvalidTaxonId(_));
        assert_matches!("".parse::<TaxonId>(), Err(TaxlenError::InvalidTaxonId(_)));
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials::new("me@example.org", "secret-key");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("secret-key"));
        assert!(!debug.contains("me@example.org"));
    }

    #[test]
    fn blank_api_key_is_absent() {
        assert_eq!(Credentials::new("me@example.org", "  ").api_key(), None);
        assert_eq!(Credentials::new("me@example.org", "k").api_key(), Some("k"));
    }
}

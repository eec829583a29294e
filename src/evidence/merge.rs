use std::fmt;

/// The evidence field of a finding or audit: an ordered list of URLs.
///
/// Stored as a single comma-joined string. Commas inside URLs are not escaped,
/// so a URL containing one reads back as two entries. Parsing a non-empty
/// field and rendering it again yields the same string, so malformed prior
/// content (empty segments, stray whitespace) survives an append untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceList {
    urls: Vec<String>,
}

impl EvidenceList {
    pub fn parse(field: &str) -> Self {
        if field.is_empty() {
            return Self::default();
        }
        Self {
            urls: field.split(',').map(str::to_string).collect(),
        }
    }

    /// Append a URL. Duplicates are kept.
    pub fn push(&mut self, url: impl Into<String>) {
        self.urls.push(url.into());
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

impl fmt::Display for EvidenceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.urls.join(","))
    }
}

/// Append `incoming` to the stored evidence field and return the new field.
pub fn append_evidence(existing: &str, incoming: &str) -> EvidenceList {
    let mut list = EvidenceList::parse(existing);
    list.push(incoming);
    list
}

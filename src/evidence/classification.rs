use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Discriminator key selecting the upload branch.
pub const DOCUMENT_TYPE: &str = "documentType";
pub const COMPLIANCE_ID: &str = "compliance_id";
pub const AUDIT_ID: &str = "audit_id";

/// Caller-supplied upload parameters, kept in the order they were supplied.
///
/// The order matters: it is folded into the generated object name and echoed
/// back as the file metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    entries: Vec<(String, String)>,
}

/// Which reconciliation branch an upload takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// `documentType=evidence`: compliance-finding evidence, needs `compliance_id`.
    ComplianceEvidence,
    /// `documentType=audit_evidence`: audit-level evidence, needs `audit_id`.
    AuditEvidence,
    /// Anything else goes to the generic file-metadata table.
    General,
}

impl Classification {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`. A repeated key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Like `get`, but treats blank values as absent.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn document_kind(&self) -> DocumentKind {
        match self.get(DOCUMENT_TYPE) {
            Some("evidence") => DocumentKind::ComplianceEvidence,
            Some("audit_evidence") => DocumentKind::AuditEvidence,
            _ => DocumentKind::General,
        }
    }

    /// True when every `(key, needle)` filter pair names a key whose value
    /// contains `needle`.
    pub fn matches_filters<'a, I>(&self, filters: I) -> bool
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        filters
            .into_iter()
            .all(|(key, needle)| self.get(key).is_some_and(|value| value.contains(needle)))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Classification {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut classification = Classification::new();
        for (k, v) in iter {
            classification.insert(k, v);
        }
        classification
    }
}

impl Serialize for Classification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Classification {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ClassificationVisitor;

        impl<'de> Visitor<'de> for ClassificationVisitor {
            type Value = Classification;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of classification parameters")
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Classification, E> {
                Ok(Classification::new())
            }

            fn visit_none<E: serde::de::Error>(self) -> Result<Classification, E> {
                Ok(Classification::new())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Classification, A::Error> {
                let mut classification = Classification::new();
                while let Some((key, value)) = access.next_entry::<String, serde_json::Value>()? {
                    let value = match value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    classification.insert(key, value);
                }
                Ok(classification)
            }
        }

        deserializer.deserialize_any(ClassificationVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_kind() {
        let c: Classification = [("documentType", "evidence")].into_iter().collect();
        assert_eq!(c.document_kind(), DocumentKind::ComplianceEvidence);

        let c: Classification = [("documentType", "audit_evidence")].into_iter().collect();
        assert_eq!(c.document_kind(), DocumentKind::AuditEvidence);

        let c: Classification = [("documentType", "policy")].into_iter().collect();
        assert_eq!(c.document_kind(), DocumentKind::General);
        assert_eq!(Classification::new().document_kind(), DocumentKind::General);
    }

    #[test]
    fn test_insert_keeps_first_position() {
        let mut c = Classification::new();
        c.insert("b", "1");
        c.insert("a", "2");
        c.insert("b", "3");
        let pairs: Vec<_> = c.iter().collect();
        assert_eq!(pairs, vec![("b", "3"), ("a", "2")]);
    }

    #[test]
    fn test_json_preserves_order() {
        let c: Classification = [("zeta", "1"), ("alpha", "2")].into_iter().collect();
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#"{"zeta":"1","alpha":"2"}"#);

        let back: Classification = serde_json::from_str(r#"{"zeta":"1","alpha":2}"#).unwrap();
        let pairs: Vec<_> = back.iter().collect();
        assert_eq!(pairs, vec![("zeta", "1"), ("alpha", "2")]);
    }

    #[test]
    fn test_matches_filters() {
        let c: Classification = [("documentType", "policy_doc"), ("framework", "iso27001")]
            .into_iter()
            .collect();
        assert!(c.matches_filters([("documentType", "policy")]));
        assert!(c.matches_filters([("documentType", "policy"), ("framework", "27001")]));
        assert!(!c.matches_filters([("framework", "soc2")]));
        assert!(!c.matches_filters([("missing", "")]));
        assert!(c.matches_filters(std::iter::empty()));
    }
}

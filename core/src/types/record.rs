use std::collections::HashMap;

/// Clinical outcome of one study
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct StudyRecord {
    pub study_uid: String,
    pub result_text: String,
}

impl StudyRecord {
    /// Creates a new StudyRecord
    pub fn new(study_uid: impl Into<String>, result_text: impl Into<String>) -> Self {
        Self {
            study_uid: study_uid.into(),
            result_text: result_text.into(),
        }
    }

    /// Diagnosis code of this study: the text before the first space
    ///
    /// Purely lexical; the code is not checked against any format.
    pub fn diagnosis_code(&self) -> &str {
        leading_token(&self.result_text)
    }
}

/// Returns the substring before the first space (the whole string if there is none)
pub fn leading_token(value: &str) -> &str {
    value.split(' ').next().unwrap_or("")
}

/// Outcomes keyed by study UID, in read order
///
/// A duplicate study UID replaces the earlier result text but keeps the
/// position where the UID was first read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutcomeTable {
    records: Vec<StudyRecord>,
    index: HashMap<String, usize>,
}

impl OutcomeTable {
    /// Creates an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an outcome, returning the result text it replaced, if any
    pub fn insert(
        &mut self,
        study_uid: impl Into<String>,
        result_text: impl Into<String>,
    ) -> Option<String> {
        let study_uid = study_uid.into();
        let result_text = result_text.into();
        match self.index.get(&study_uid) {
            Some(&pos) => Some(std::mem::replace(
                &mut self.records[pos].result_text,
                result_text,
            )),
            None => {
                self.index.insert(study_uid.clone(), self.records.len());
                self.records.push(StudyRecord::new(study_uid, result_text));
                None
            }
        }
    }

    pub fn get(&self, study_uid: &str) -> Option<&StudyRecord> {
        self.index.get(study_uid).map(|&pos| &self.records[pos])
    }

    pub fn contains(&self, study_uid: &str) -> bool {
        self.index.contains_key(study_uid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StudyRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OutcomeTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = OutcomeTable::new();
        for (uid, text) in iter {
            table.insert(uid, text);
        }
        table
    }
}

/// Diagnosis reference entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisCode {
    pub code: String,
    pub description: String,
}

impl DiagnosisCode {
    /// Builds an entry from a stored reference value, keyed by its leading token
    ///
    /// The description is the full stored value.
    pub fn from_stored_value(value: &str) -> Self {
        Self {
            code: leading_token(value).to_string(),
            description: value.to_string(),
        }
    }
}

/// Diagnosis descriptions keyed by code
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosisTable {
    entries: HashMap<String, String>,
}

impl DiagnosisTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: DiagnosisCode) {
        self.entries.insert(entry.code, entry.description);
    }

    pub fn description(&self, code: &str) -> Option<&str> {
        self.entries.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DiagnosisTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(code, description)| (code.into(), description.into()))
                .collect(),
        }
    }
}

/// One stored image path belonging to a study
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct ImageReference {
    pub study_uid: String,
    pub stored_path: String,
}

impl ImageReference {
    pub fn new(study_uid: impl Into<String>, stored_path: impl Into<String>) -> Self {
        Self {
            study_uid: study_uid.into(),
            stored_path: stored_path.into(),
        }
    }
}

/// Image references in read order, duplicates kept
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageReferences {
    references: Vec<ImageReference>,
}

impl ImageReferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, reference: ImageReference) {
        self.references.push(reference);
    }

    /// Stored paths of one study, in read order
    #[cfg(test)]
    pub(crate) fn paths_for(&self, study_uid: &str) -> Vec<&str> {
        self.references
            .iter()
            .filter(|r| r.study_uid == study_uid)
            .map(|r| r.stored_path.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageReference> {
        self.references.iter()
    }

    pub fn as_slice(&self) -> &[ImageReference] {
        &self.references
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

impl FromIterator<ImageReference> for ImageReferences {
    fn from_iter<I: IntoIterator<Item = ImageReference>>(iter: I) -> Self {
        Self {
            references: iter.into_iter().collect(),
        }
    }
}

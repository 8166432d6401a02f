//! The closed set of ASL signs the toolkit trains classifiers for.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every sign in canonical training order: letters first, then digits.
pub const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

/// Number of signs in [`ALPHABET`].
pub const LABEL_COUNT: usize = 36;

/// One ASL sign: a lowercase ASCII letter or a digit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Label(char);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not an ASL sign label (expected one of a-z or 0-9)")]
pub struct InvalidLabel(pub String);

impl Label {
    /// Build a label from a character, folding ASCII uppercase.
    pub fn new(c: char) -> Option<Self> {
        let c = c.to_ascii_lowercase();
        ALPHABET.contains(c).then_some(Self(c))
    }

    pub fn as_char(self) -> char {
        self.0
    }

    /// Name of the dataset subdirectory holding this label's images.
    pub fn dir_name(self) -> String {
        self.0.to_string()
    }

    /// File stem shared by the model artifact and its metadata sidecar.
    pub fn artifact_stem(self) -> String {
        format!("asl_model_{}", self.0)
    }

    /// Iterate every label in canonical order.
    pub fn all() -> impl Iterator<Item = Label> {
        ALPHABET.chars().map(Label)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Label {
    type Err = InvalidLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Label::new(c).ok_or_else(|| InvalidLabel(value.to_string())),
            _ => Err(InvalidLabel(value.to_string())),
        }
    }
}

impl TryFrom<String> for Label {
    type Error = InvalidLabel;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.0.to_string()
    }
}

/// Parse a compact label list such as `"abc"` or `"a,b,7"`, keeping canonical
/// order and dropping duplicates.
pub fn parse_label_list(value: &str) -> Result<Vec<Label>, InvalidLabel> {
    let mut labels = Vec::new();
    for c in value.chars().filter(|c| !c.is_whitespace() && *c != ',') {
        let label = Label::new(c).ok_or_else(|| InvalidLabel(c.to_string()))?;
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels.sort_by_key(|label| canonical_index(*label));
    Ok(labels)
}

fn canonical_index(label: Label) -> usize {
    ALPHABET.find(label.0).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabet_has_letters_then_digits() {
        let labels: Vec<Label> = Label::all().collect();
        assert_eq!(labels.len(), LABEL_COUNT);
        assert_eq!(labels.first().map(|l| l.as_char()), Some('a'));
        assert_eq!(labels[25].as_char(), 'z');
        assert_eq!(labels[26].as_char(), '0');
        assert_eq!(labels.last().map(|l| l.as_char()), Some('9'));
    }

    #[test]
    fn parse_folds_case_and_rejects_words() {
        assert_eq!("B".parse::<Label>().unwrap().as_char(), 'b');
        assert_eq!(" 7 ".parse::<Label>().unwrap().as_char(), '7');
        assert!("hello".parse::<Label>().is_err());
        assert!("".parse::<Label>().is_err());
        assert!("?".parse::<Label>().is_err());
    }

    #[test]
    fn label_list_is_canonical_and_deduplicated() {
        let labels = parse_label_list("3, c,a,a").unwrap();
        let chars: String = labels.iter().map(|l| l.as_char()).collect();
        assert_eq!(chars, "ac3");
        assert!(parse_label_list("a-b").is_err());
    }

    #[test]
    fn artifact_stem_encodes_label() {
        let label = Label::new('q').unwrap();
        assert_eq!(label.artifact_stem(), "asl_model_q");
        assert_eq!(label.dir_name(), "q");
    }

    #[test]
    fn serde_uses_plain_strings() {
        let label = Label::new('k').unwrap();
        let json = serde_json::to_string(&label).unwrap();
        assert_eq!(json, "\"k\"");
        let back: Label = serde_json::from_str(&json).unwrap();
        assert_eq!(back, label);
        assert!(serde_json::from_str::<Label>("\"kk\"").is_err());
    }
}

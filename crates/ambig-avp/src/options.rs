//! Container configuration.

use serde::{Deserialize, Serialize};

/// How free-text keys are case-folded before lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyFolding {
    /// Full Unicode lowercase.
    #[default]
    Unicode,
    /// ASCII letters only; other characters are kept as-is.
    Ascii,
}

/// Options controlling how a container keys free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerOptions {
    pub key_folding: KeyFolding,
    /// Strip surrounding whitespace from free-text keys.
    pub trim_keys: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            key_folding: KeyFolding::Unicode,
            trim_keys: false,
        }
    }
}

impl ContainerOptions {
    /// Free text as handed to the classifier: trimmed when `trim_keys` is set,
    /// otherwise untouched.
    pub fn classifier_text<'a>(&self, text: &'a str) -> &'a str {
        if self.trim_keys {
            text.trim()
        } else {
            text
        }
    }

    /// The key under which free text is stored and looked up.
    pub fn normalize_key(&self, text: &str) -> String {
        let text = self.classifier_text(text);
        match self.key_folding {
            KeyFolding::Unicode => text.to_lowercase(),
            KeyFolding::Ascii => text.to_ascii_lowercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_folds_unicode_without_trimming() {
        let options = ContainerOptions::default();
        assert_eq!(options.normalize_key("ÉTAT"), "état");
        assert_eq!(options.normalize_key(" Type "), " type ");
    }

    #[test]
    fn ascii_folding_and_trimming() {
        let options = ContainerOptions {
            key_folding: KeyFolding::Ascii,
            trim_keys: true,
        };
        assert_eq!(options.normalize_key("  ÉTAT Type\t"), "État type");
        assert_eq!(options.classifier_text("  ÉTAT Type\t"), "ÉTAT Type");
        assert_eq!(ContainerOptions::default().classifier_text(" Type "), " Type ");
    }
}

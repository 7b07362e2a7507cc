//! # Folder
//!
//! Module dedicated to folder naming across stores. Two stores may use
//! different hierarchy delimiters and different spellings for the
//! INBOX folder: the [`FolderNameTranslator`] maps a folder full name
//! from one store naming to the other.

use tracing::trace;

use crate::index::FolderIndex;

/// The name of the inbox folder, matched case-insensitively.
pub const INBOX: &str = "INBOX";

/// Replace every occurrence of the origin separator by the
/// destination separator.
///
/// Empty or identical separators leave the name untouched.
pub fn translate(name: &str, from_separator: &str, to_separator: &str) -> String {
    if from_separator.is_empty() || from_separator == to_separator {
        return name.to_owned();
    }

    name.replace(from_separator, to_separator)
}

/// The folder name translator.
///
/// Maps full names from the origin store naming to the destination
/// store naming, using what both [`FolderIndex`]es recorded.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FolderNameTranslator {
    from_separator: String,
    to_separator: String,
    to_inbox: Option<String>,
}

impl FolderNameTranslator {
    pub fn new(origin: &FolderIndex, destination: &FolderIndex) -> Self {
        Self {
            from_separator: origin.separator().unwrap_or_default().to_owned(),
            to_separator: destination.separator().unwrap_or_default().to_owned(),
            to_inbox: destination.inbox().map(ToOwned::to_owned),
        }
    }

    /// Translate the given origin folder full name.
    ///
    /// The origin INBOX becomes the destination INBOX verbatim, any
    /// other name gets its separators substituted.
    pub fn translate(&self, name: &str) -> String {
        let translated = match self.to_inbox.as_deref() {
            Some(inbox) if name.eq_ignore_ascii_case(INBOX) => inbox.to_owned(),
            _ => translate(name, &self.from_separator, &self.to_separator),
        };

        trace!(name, %translated, "translated folder name");
        translated
    }
}

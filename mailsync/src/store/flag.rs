//! Module dedicated to message flags.

use std::{
    collections::BTreeSet,
    fmt,
    ops::{Deref, DerefMut},
};

/// The message flag.
///
/// A flag is like a tag that can be attached to a message. Only the
/// system flags the engine needs are named, all the others are kept
/// as custom flags so that copies preserve them.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum Flag {
    /// Flag used when the message has been opened.
    Seen,

    /// Flag used when the message has been answered.
    Answered,

    /// Flag used as a bookmark.
    Flagged,

    /// Flag used when the message is marked for deletion.
    Deleted,

    /// Flag used when the message is a draft.
    Draft,

    /// Flag used for all other use cases.
    Custom(String),
}

impl Flag {
    /// Creates a custom flag.
    pub fn custom(flag: impl ToString) -> Self {
        Self::Custom(flag.to_string())
    }
}

/// Parse a flag from a string. If the string does not match any of
/// the existing variant, it is considered as custom.
impl From<&str> for Flag {
    fn from(s: &str) -> Self {
        match s.trim().trim_start_matches('\\') {
            seen if seen.eq_ignore_ascii_case("seen") => Flag::Seen,
            answered if answered.eq_ignore_ascii_case("answered") => Flag::Answered,
            flagged if flagged.eq_ignore_ascii_case("flagged") => Flag::Flagged,
            deleted if deleted.eq_ignore_ascii_case("deleted") => Flag::Deleted,
            draft if draft.eq_ignore_ascii_case("draft") => Flag::Draft,
            flag => Flag::Custom(flag.into()),
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flag::Seen => write!(f, "seen"),
            Flag::Answered => write!(f, "answered"),
            Flag::Flagged => write!(f, "flagged"),
            Flag::Deleted => write!(f, "deleted"),
            Flag::Draft => write!(f, "draft"),
            Flag::Custom(flag) => write!(f, "{flag}"),
        }
    }
}

/// The set of message flags.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct Flags(BTreeSet<Flag>);

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, flag) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{flag}")?;
        }
        Ok(())
    }
}

impl Deref for Flags {
    type Target = BTreeSet<Flag>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Flags {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<&str> for Flags {
    fn from(s: &str) -> Self {
        s.split_whitespace().map(Flag::from).collect()
    }
}

impl FromIterator<Flag> for Flags {
    fn from_iter<T: IntoIterator<Item = Flag>>(iter: T) -> Self {
        Self(BTreeSet::from_iter(iter))
    }
}

impl From<Flags> for Vec<Flag> {
    fn from(val: Flags) -> Self {
        val.0.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Flag, Flags};

    #[test]
    fn parse_flags_from_imap_like_string() {
        let flags = Flags::from("\\Seen \\Deleted $Forwarded");

        assert!(flags.contains(&Flag::Seen));
        assert!(flags.contains(&Flag::Deleted));
        assert!(flags.contains(&Flag::custom("$Forwarded")));
        assert_eq!(flags.len(), 3);
    }
}

//! # Message fingerprint
//!
//! Module dedicated to message identity. A [`Fingerprint`] is an
//! approximate identity computed from a few headers, stable across
//! servers that render headers differently. It is the key used to
//! decide whether a message is already present on the other side.

mod error;

use once_cell::sync::Lazy;
use regex::Regex;

#[doc(inline)]
pub use self::error::{Error, Result};
use crate::store::Message;

pub const MESSAGE_ID: &str = "Message-Id";
pub const SUBJECT: &str = "Subject";
pub const FROM: &str = "From";
pub const TO: &str = "To";

/// Matches upper-cased email addresses.
static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,4}").unwrap());

/// The message fingerprint.
///
/// Two fingerprints are equal when their four fields are equal.
/// Addresses are normalized and sorted, so that the order and the
/// display names used by a server do not matter.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Fingerprint {
    message_id: String,
    from: Vec<String>,
    to: Vec<String>,
    subject: String,
}

impl Fingerprint {
    /// Build the fingerprint of the given message.
    ///
    /// Fails with [`Error::MissingIdentityError`] if the message has
    /// neither a usable message id nor a usable subject.
    pub fn from_message(msg: &impl Message) -> Result<Self> {
        let header =
            |name: &'static str| msg.header(name).map_err(|err| Error::ReadHeaderError(err, name));

        Self::from_headers(
            &header(MESSAGE_ID)?,
            &header(FROM)?,
            &header(TO)?,
            &header(SUBJECT)?,
        )
    }

    /// Build a fingerprint from raw header values.
    pub fn from_headers(
        message_id: &[String],
        from: &[String],
        to: &[String],
        subject: &[String],
    ) -> Result<Self> {
        let message_id = message_id
            .first()
            .map(|id| sanitize(id.trim(), &['.', '-', '@']))
            .unwrap_or_default();

        let subject = subject
            .first()
            .map(|subject| sanitize(subject, &['.', '-']))
            .unwrap_or_default();

        if message_id.is_empty() && subject.is_empty() {
            return Err(Error::MissingIdentityError);
        }

        Ok(Self {
            message_id,
            from: parse_addresses(from),
            to: parse_addresses(to),
            subject,
        })
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn from_addresses(&self) -> &[String] {
        &self.from
    }

    pub fn to_addresses(&self) -> &[String] {
        &self.to
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Keep only ASCII alphanumerics and the given extra chars.
fn sanitize(value: &str, extra: &[char]) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || extra.contains(c))
        .collect()
}

/// Extract every email address found in the given header values,
/// upper-cased and sorted.
fn parse_addresses(values: &[String]) -> Vec<String> {
    let mut addresses: Vec<String> = values
        .iter()
        .flat_map(|value| {
            EMAIL
                .find_iter(&value.to_uppercase())
                .map(|addr| addr.as_str().to_owned())
                .collect::<Vec<_>>()
        })
        .collect();

    addresses.sort();
    addresses
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::{Error, Fingerprint};
    use crate::{
        store::{Flag, Message, RawMessage},
        AnyBoxedError, AnyResult,
    };

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset")]
    struct ConnectionReset;

    impl crate::AnyError for ConnectionReset {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[derive(Default)]
    struct TestMessage {
        headers: HashMap<&'static str, Vec<String>>,
        broken: bool,
    }

    impl TestMessage {
        fn with(mut self, name: &'static str, values: &[&str]) -> Self {
            let values = values.iter().map(ToString::to_string).collect();
            self.headers.insert(name, values);
            self
        }
    }

    #[async_trait]
    impl Message for TestMessage {
        fn header(&self, name: &str) -> AnyResult<Vec<String>> {
            if self.broken {
                let err: AnyBoxedError = Box::new(ConnectionReset);
                return Err(err);
            }

            Ok(self.headers.get(name).cloned().unwrap_or_default())
        }

        fn set_peek(&mut self, _peek: bool) {}

        async fn set_flag(&mut self, _flag: Flag, _set: bool) -> AnyResult<()> {
            Ok(())
        }

        fn to_raw(&self) -> AnyResult<RawMessage> {
            Ok(RawMessage::default())
        }
    }

    #[test]
    fn sanitize_fields() {
        let msg = TestMessage::default()
            .with("Message-Id", &["  <Id!\"·$%&/-1337@localhost> "])
            .with("From", &["\"Mr. Pink\" <mrpink@email.com>"])
            .with("Subject", &["Subje#ctNº1^*!·%"]);

        let fp = Fingerprint::from_message(&msg).unwrap();

        assert_eq!(fp.message_id(), "Id-1337@localhost");
        assert_eq!(fp.subject(), "SubjectN1");
        assert_eq!(fp.from_addresses(), ["MRPINK@EMAIL.COM"]);
        assert!(fp.to_addresses().is_empty());
    }

    #[test]
    fn equal_when_addresses_differ_in_order_and_format() {
        let a = TestMessage::default()
            .with("Message-Id", &["SAME ID FOR BOTH"])
            .with("To", &["Mr. Blonde <b@e.com>", "c@e.com"]);
        let b = TestMessage::default()
            .with("Message-Id", &["SAME ID FOR BOTH"])
            .with("To", &["c@e.com", "Mr. Blonde <b@e.com>"]);

        assert_eq!(
            Fingerprint::from_message(&a).unwrap(),
            Fingerprint::from_message(&b).unwrap()
        );
    }

    #[test]
    fn not_equal_when_one_address_differs() {
        let a = TestMessage::default()
            .with("Message-Id", &["SAME ID FOR BOTH"])
            .with("To", &["\"Mr. Blonde\" <blonde@e.com>", "blue@e.com"]);
        let b = TestMessage::default()
            .with("Message-Id", &["SAME ID FOR BOTH"])
            .with("To", &["blue2@e.com", "\"Mr. Blonde\" <blonde@e.com>"]);

        assert_ne!(
            Fingerprint::from_message(&a).unwrap(),
            Fingerprint::from_message(&b).unwrap()
        );
    }

    #[test]
    fn reject_message_without_identity() {
        let msg = TestMessage::default()
            .with("Message-Id", &["<>"])
            .with("Subject", &["!!!"])
            .with("From", &["a@e.com"]);

        let err = Fingerprint::from_message(&msg).unwrap_err();

        assert!(matches!(err, Error::MissingIdentityError));
        assert!(!err.is_protocol_failure());
    }

    #[test]
    fn store_failure_is_a_protocol_failure() {
        let msg = TestMessage {
            broken: true,
            ..Default::default()
        };

        let err = Fingerprint::from_message(&msg).unwrap_err();

        assert!(matches!(err, Error::ReadHeaderError(_, "Message-Id")));
        assert!(err.is_protocol_failure());
    }
}

//! Module dedicated to the store host configuration.

use std::fmt;

/// The host definition.
///
/// Everything a [`StoreBuilder`](super::StoreBuilder) needs to open
/// an authenticated session with a store.
#[derive(Clone, Default, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub struct HostDefinition {
    /// The server host name.
    pub host: String,

    /// The server host port.
    pub port: u16,

    /// The login of the mailbox owner.
    pub user: String,

    /// The password of the mailbox owner.
    pub password: String,

    /// Use an encrypted transport (SSL/TLS) to reach the server.
    #[cfg_attr(feature = "derive", serde(default))]
    pub ssl: bool,
}

impl HostDefinition {
    pub fn new(host: impl ToString, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, user: impl ToString, password: impl ToString) -> Self {
        self.user = user.to_string();
        self.password = password.to_string();
        self
    }

    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }
}

/// The password never leaks into logs.
impl fmt::Debug for HostDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostDefinition")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("ssl", &self.ssl)
            .finish()
    }
}

impl fmt::Display for HostDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.ssl { "imaps" } else { "imap" };
        write!(f, "{scheme}://{}@{}:{}", self.user, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::HostDefinition;

    #[test]
    fn debug_output_hides_password() {
        let host = HostDefinition::new("localhost", 993)
            .with_credentials("bob", "s3cr3t")
            .with_ssl(true);

        assert!(!format!("{host:?}").contains("s3cr3t"));
        assert_eq!(host.to_string(), "imaps://bob@localhost:993");
    }
}

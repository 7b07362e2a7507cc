//! # Store
//!
//! Module dedicated to the mail store abstraction the engine talks
//! to. A store is reached through a stateful, folder/message-oriented
//! protocol (typically IMAP): the engine never speaks that protocol
//! itself, it only drives implementations of the traits exposed
//! here:
//!
//! - [`StoreBuilder`] opens an authenticated [`Store`] session;
//! - [`Store`] gives access to its [`Folder`]s by full name;
//! - [`Folder`] lists children, opens, counts, fetches, appends;
//! - [`Message`] exposes header lookup and flag changes.
//!
//! Every fallible operation returns an [`AnyResult`], so that errors
//! of the underlying transport reach the engine untouched.
//!
//! An in-memory implementation lives in the [`memory`] module.

pub mod config;
pub mod flag;
#[cfg(feature = "memory")]
pub mod memory;

use std::{collections::BTreeSet, fmt, ops::BitOr};

use async_trait::async_trait;

#[doc(inline)]
pub use self::{
    config::HostDefinition,
    flag::{Flag, Flags},
};
use crate::AnyResult;

/// The store builder.
///
/// Establishes an authenticated session with a store. The
/// concurrency is the number of workers that will use the session
/// in parallel, implementations should size their connection pool
/// accordingly.
#[async_trait]
pub trait StoreBuilder: Clone + Send + Sync + 'static {
    /// The store built by this trait.
    type Store: Store;

    /// Open a store session for the given host.
    async fn build(&self, host: &HostDefinition, concurrency: usize) -> AnyResult<Self::Store>;
}

/// The store session.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// The folder handle type of the store.
    type Folder: Folder;

    /// Get the root folder of the store.
    ///
    /// The root folder has an empty full name and is only used as an
    /// entry point to walk the folder tree.
    async fn default_folder(&self) -> AnyResult<Self::Folder>;

    /// Get a folder handle from its full name.
    ///
    /// The folder does not need to exist: the returned handle can be
    /// used to create it.
    async fn folder(&self, full_name: &str) -> AnyResult<Self::Folder>;

    /// Close the store session.
    async fn close(&self) -> AnyResult<()>;
}

/// The folder handle.
///
/// A handle is owned by a single worker: it must not be shared
/// between concurrent tasks.
#[async_trait]
pub trait Folder: Sized + Send + Sync + 'static {
    /// The message handle type of the folder.
    type Message: Message;

    /// The full name of the folder, including its parents.
    fn full_name(&self) -> &str;

    /// The hierarchy delimiter of the store.
    fn separator(&self) -> &str;

    /// The folder type.
    fn kind(&self) -> FolderType;

    /// List the direct children of the folder.
    async fn list(&self) -> AnyResult<Vec<Self>>;

    async fn open(&mut self, mode: OpenMode) -> AnyResult<()>;

    /// Close the folder, permanently removing messages flagged as
    /// deleted if `expunge` is `true`.
    async fn close(&mut self, expunge: bool) -> AnyResult<()>;

    async fn message_count(&self) -> AnyResult<usize>;

    /// Get the messages between positions `start` and `end`, both
    /// inclusive and starting from 1. The folder must be open.
    async fn messages(&self, start: usize, end: usize) -> AnyResult<Vec<Self::Message>>;

    /// Prefetch the items of the given profile for all messages in
    /// bulk.
    async fn fetch(&self, messages: &mut [Self::Message], profile: &FetchProfile)
        -> AnyResult<()>;

    /// Create the folder. Returns `false` if it already existed.
    async fn create(&self, kind: FolderType) -> AnyResult<bool>;

    /// Delete the folder. Returns `false` if it did not exist.
    async fn delete(&self, recursive: bool) -> AnyResult<bool>;

    async fn append_messages(&self, messages: &[RawMessage]) -> AnyResult<()>;
}

/// The message handle.
#[async_trait]
pub trait Message: Send + Sync + 'static {
    /// Get all the values of the header matching the given name
    /// (case-insensitive).
    fn header(&self, name: &str) -> AnyResult<Vec<String>>;

    /// When set, fetching the content of the message does not mark
    /// it as seen.
    fn set_peek(&mut self, peek: bool);

    async fn set_flag(&mut self, flag: Flag, set: bool) -> AnyResult<()>;

    /// Extract the full content and flags of the message, as fetched
    /// by a [`FetchProfile::full`] fetch.
    fn to_raw(&self) -> AnyResult<RawMessage>;
}

/// The folder type.
///
/// Bit set telling whether a folder can hold messages, sub-folders,
/// or both.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct FolderType(u8);

impl FolderType {
    pub const HOLDS_MESSAGES: Self = Self(1);
    pub const HOLDS_FOLDERS: Self = Self(1 << 1);

    pub fn holds_messages(&self) -> bool {
        self.contains(Self::HOLDS_MESSAGES)
    }

    pub fn holds_folders(&self) -> bool {
        self.contains(Self::HOLDS_FOLDERS)
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FolderType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for FolderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.holds_messages(), self.holds_folders()) {
            (true, true) => write!(f, "messages and folders"),
            (true, false) => write!(f, "messages"),
            (false, true) => write!(f, "folders"),
            (false, false) => write!(f, "nothing"),
        }
    }
}

/// The folder open mode.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// The item of a fetch profile.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum FetchItem {
    Envelope,
    Headers,
    ContentInfo,
    Flags,
    Size,
    Content,
}

/// The set of items to prefetch for a batch of messages.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FetchProfile(BTreeSet<FetchItem>);

impl FetchProfile {
    /// Profile fetching only what is needed to compute a message
    /// fingerprint.
    pub fn fingerprint() -> Self {
        Self::from_iter([FetchItem::Envelope, FetchItem::Headers])
    }

    /// Profile fetching everything needed to append a copy of the
    /// message to another store.
    pub fn full() -> Self {
        Self::from_iter([
            FetchItem::Envelope,
            FetchItem::Headers,
            FetchItem::ContentInfo,
            FetchItem::Flags,
            FetchItem::Size,
            FetchItem::Content,
        ])
    }

    pub fn contains(&self, item: FetchItem) -> bool {
        self.0.contains(&item)
    }
}

impl FromIterator<FetchItem> for FetchProfile {
    fn from_iter<T: IntoIterator<Item = FetchItem>>(iter: T) -> Self {
        Self(BTreeSet::from_iter(iter))
    }
}

/// A message in transit between two stores.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RawMessage {
    /// The full RFC 5322 content of the message.
    pub raw: Vec<u8>,

    /// The flags to apply to the appended message.
    pub flags: Flags,
}

impl RawMessage {
    pub fn new(raw: impl Into<Vec<u8>>, flags: impl Into<Flags>) -> Self {
        Self {
            raw: raw.into(),
            flags: flags.into(),
        }
    }
}

//! # Memory store
//!
//! Module dedicated to the in-memory store. The store keeps a folder
//! tree behind a shared mutex: every clone of a [`MemoryStore`], and
//! every session built from a [`MemoryStoreBuilder`], sees the same
//! folders and messages, like connections to the same server would.
//!
//! Messages are kept as raw RFC 5322 bytes; headers are parsed on
//! demand with [`mail_parser`]. Positional numbering follows the
//! usual protocol rules: positions start from 1 and expunging
//! flagged messages shifts the positions of the following ones.
//!
//! Any operation can be refused on purpose for a given folder with
//! [`MemoryStore::fail`], which is how the test suite simulates
//! transport failures.

mod error;

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use mail_parser::MessageParser;
use tracing::{debug, trace};

#[doc(inline)]
pub use self::error::{Error, Result};
use super::{
    FetchItem, FetchProfile, Flag, Flags, Folder, FolderType, HostDefinition, Message, OpenMode,
    RawMessage, Store, StoreBuilder,
};
use crate::AnyResult;

/// The store operation, used to simulate failures.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operation {
    Connect,
    List,
    Open,
    Close,
    Fetch,
    ReadHeader,
    Flag,
    Create,
    Delete,
    Append,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect to"),
            Self::List => write!(f, "list"),
            Self::Open => write!(f, "open"),
            Self::Close => write!(f, "close"),
            Self::Fetch => write!(f, "fetch messages of"),
            Self::ReadHeader => write!(f, "read headers of"),
            Self::Flag => write!(f, "flag messages of"),
            Self::Create => write!(f, "create"),
            Self::Delete => write!(f, "delete"),
            Self::Append => write!(f, "append messages to"),
        }
    }
}

/// A folder close, as recorded by the store.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FolderClose {
    pub folder: String,
    pub expunge: bool,
}

#[derive(Debug)]
struct FolderEntry {
    kind: FolderType,
    messages: Vec<MessageEntry>,
}

#[derive(Clone, Debug)]
struct MessageEntry {
    uid: u64,
    raw: Arc<Vec<u8>>,
    flags: Flags,
}

#[derive(Debug)]
struct MemoryState {
    separator: String,
    folders: BTreeMap<String, FolderEntry>,
    next_uid: u64,
    credentials: Option<(String, String)>,
    failures: HashSet<(Operation, String)>,
    message_failures: HashSet<(Operation, String, u64)>,
    closes: Vec<FolderClose>,
    sessions: usize,
}

impl MemoryState {
    fn check(&self, op: Operation, folder: &str) -> Result<()> {
        if self.failures.contains(&(op, folder.to_owned())) {
            Err(Error::RefusedOperationError(folder.to_owned(), op))
        } else {
            Ok(())
        }
    }

    fn check_message(&self, op: Operation, folder: &str, uid: u64) -> Result<()> {
        self.check(op, folder)?;

        if self.message_failures.contains(&(op, folder.to_owned(), uid)) {
            Err(Error::RefusedMessageOperationError(folder.to_owned(), uid, op))
        } else {
            Ok(())
        }
    }

    fn folder(&self, name: &str) -> Result<&FolderEntry> {
        self.folders
            .get(name)
            .ok_or_else(|| Error::FolderNotFoundError(name.to_owned()))
    }

    fn folder_mut(&mut self, name: &str) -> Result<&mut FolderEntry> {
        self.folders
            .get_mut(name)
            .ok_or_else(|| Error::FolderNotFoundError(name.to_owned()))
    }

    fn message(&self, folder: &str, uid: u64) -> Result<&MessageEntry> {
        self.folder(folder)?
            .messages
            .iter()
            .find(|msg| msg.uid == uid)
            .ok_or_else(|| Error::MessageNotFoundError(folder.to_owned(), uid))
    }

    fn message_mut(&mut self, folder: &str, uid: u64) -> Result<&mut MessageEntry> {
        self.folder_mut(folder)?
            .messages
            .iter_mut()
            .find(|msg| msg.uid == uid)
            .ok_or_else(|| Error::MessageNotFoundError(folder.to_owned(), uid))
    }

    fn is_child(&self, parent: &str, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }

        if self.separator.is_empty() {
            return parent.is_empty();
        }

        let rest = if parent.is_empty() {
            Some(name)
        } else {
            name.strip_prefix(parent)
                .and_then(|rest| rest.strip_prefix(self.separator.as_str()))
        };

        match rest {
            Some(rest) => !rest.is_empty() && !rest.contains(self.separator.as_str()),
            None => false,
        }
    }

    fn is_descendant(&self, parent: &str, name: &str) -> bool {
        !self.separator.is_empty()
            && name
                .strip_prefix(parent)
                .map(|rest| rest.starts_with(self.separator.as_str()))
                .unwrap_or_default()
    }
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The in-memory store.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Create a new store containing only its root folder, using the
    /// given hierarchy delimiter.
    pub fn new(separator: impl ToString) -> Self {
        let root = FolderEntry {
            kind: FolderType::HOLDS_FOLDERS,
            messages: Vec::new(),
        };

        let state = MemoryState {
            separator: separator.to_string(),
            folders: BTreeMap::from_iter([(String::new(), root)]),
            next_uid: 1,
            credentials: None,
            failures: HashSet::new(),
            message_failures: HashSet::new(),
            closes: Vec::new(),
            sessions: 0,
        };

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        lock(&self.state)
    }

    /// Only accept sessions opened with the given credentials.
    pub fn set_credentials(&self, user: impl ToString, password: impl ToString) {
        self.lock().credentials = Some((user.to_string(), password.to_string()));
    }

    /// Add a folder, replacing its type if it already exists.
    pub fn add_folder(&self, name: impl ToString, kind: FolderType) {
        self.lock()
            .folders
            .entry(name.to_string())
            .and_modify(|entry| entry.kind = kind)
            .or_insert_with(|| FolderEntry {
                kind,
                messages: Vec::new(),
            });
    }

    /// Add a message at the end of the given folder, returning its
    /// uid.
    pub fn add_message(
        &self,
        folder: &str,
        raw: impl Into<Vec<u8>>,
        flags: impl Into<Flags>,
    ) -> Result<u64> {
        let mut state = self.lock();
        let uid = state.next_uid;
        state.folder_mut(folder)?.messages.push(MessageEntry {
            uid,
            raw: Arc::new(raw.into()),
            flags: flags.into(),
        });
        state.next_uid += 1;
        Ok(uid)
    }

    pub fn has_folder(&self, name: &str) -> bool {
        self.lock().folders.contains_key(name)
    }

    pub fn folder_kind(&self, name: &str) -> Option<FolderType> {
        self.lock().folders.get(name).map(|entry| entry.kind)
    }

    /// List the full names of all folders, root excluded.
    pub fn folder_names(&self) -> Vec<String> {
        self.lock()
            .folders
            .keys()
            .filter(|name| !name.is_empty())
            .cloned()
            .collect()
    }

    /// Get a copy of all the messages of the given folder, in
    /// positional order.
    pub fn messages(&self, folder: &str) -> Vec<RawMessage> {
        self.lock()
            .folders
            .get(folder)
            .map(|entry| {
                entry
                    .messages
                    .iter()
                    .map(|msg| RawMessage::new(msg.raw.to_vec(), msg.flags.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn message_count(&self, folder: &str) -> usize {
        self.lock()
            .folders
            .get(folder)
            .map(|entry| entry.messages.len())
            .unwrap_or_default()
    }

    /// Make the given operation fail for the given folder.
    pub fn fail(&self, op: Operation, folder: impl ToString) {
        self.lock().failures.insert((op, folder.to_string()));
    }

    /// Make new sessions fail.
    pub fn fail_connect(&self) {
        self.fail(Operation::Connect, "");
    }

    /// Make the given operation fail for the given message only.
    pub fn fail_message(&self, op: Operation, folder: impl ToString, uid: u64) {
        self.lock()
            .message_failures
            .insert((op, folder.to_string(), uid));
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failures.clear();
        state.message_failures.clear();
    }

    /// Get the folder closes recorded so far, in chronological order.
    pub fn closes(&self) -> Vec<FolderClose> {
        self.lock().closes.clone()
    }

    /// Get the number of sessions opened so far.
    pub fn sessions(&self) -> usize {
        self.lock().sessions
    }

    fn folder_handle(&self, name: &str) -> MemoryFolder {
        let state = self.lock();
        MemoryFolder {
            state: self.state.clone(),
            name: name.to_owned(),
            separator: state.separator.clone(),
            kind: state
                .folders
                .get(name)
                .map(|entry| entry.kind)
                .unwrap_or_default(),
            mode: None,
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Folder = MemoryFolder;

    async fn default_folder(&self) -> AnyResult<Self::Folder> {
        Ok(self.folder_handle(""))
    }

    async fn folder(&self, full_name: &str) -> AnyResult<Self::Folder> {
        Ok(self.folder_handle(full_name))
    }

    async fn close(&self) -> AnyResult<()> {
        debug!("closing memory store session");
        Ok(())
    }
}

/// The in-memory store builder.
///
/// Every session built shares the state of the wrapped store.
#[derive(Clone)]
pub struct MemoryStoreBuilder {
    store: MemoryStore,
}

impl MemoryStoreBuilder {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

impl From<MemoryStore> for MemoryStoreBuilder {
    fn from(store: MemoryStore) -> Self {
        Self::new(store)
    }
}

#[async_trait]
impl StoreBuilder for MemoryStoreBuilder {
    type Store = MemoryStore;

    async fn build(&self, host: &HostDefinition, concurrency: usize) -> AnyResult<Self::Store> {
        debug!(%host, concurrency, "opening memory store session");

        let mut state = self.store.lock();
        state.check(Operation::Connect, "")?;

        if let Some((user, password)) = state.credentials.as_ref() {
            if *user != host.user || *password != host.password {
                return Err(Error::AuthenticateError(host.user.clone()).into());
            }
        }

        state.sessions += 1;
        drop(state);

        Ok(self.store.clone())
    }
}

/// The in-memory folder handle.
pub struct MemoryFolder {
    state: Arc<Mutex<MemoryState>>,
    name: String,
    separator: String,
    kind: FolderType,
    mode: Option<OpenMode>,
}

impl MemoryFolder {
    fn mode(&self) -> Result<OpenMode> {
        self.mode
            .ok_or_else(|| Error::FolderNotOpenError(self.name.clone()))
    }
}

#[async_trait]
impl Folder for MemoryFolder {
    type Message = MemoryMessage;

    fn full_name(&self) -> &str {
        &self.name
    }

    fn separator(&self) -> &str {
        &self.separator
    }

    fn kind(&self) -> FolderType {
        self.kind
    }

    async fn list(&self) -> AnyResult<Vec<Self>> {
        let state = lock(&self.state);
        state.check(Operation::List, &self.name)?;
        state.folder(&self.name)?;

        let children = state
            .folders
            .iter()
            .filter(|(name, _)| state.is_child(&self.name, name))
            .map(|(name, entry)| MemoryFolder {
                state: self.state.clone(),
                name: name.clone(),
                separator: state.separator.clone(),
                kind: entry.kind,
                mode: None,
            })
            .collect();

        Ok(children)
    }

    async fn open(&mut self, mode: OpenMode) -> AnyResult<()> {
        {
            let state = lock(&self.state);
            state.check(Operation::Open, &self.name)?;
            state.folder(&self.name)?;
        }

        trace!(folder = %self.name, ?mode, "opening memory folder");
        self.mode = Some(mode);
        Ok(())
    }

    async fn close(&mut self, expunge: bool) -> AnyResult<()> {
        let mode = self.mode()?;
        let mut state = lock(&self.state);
        state.check(Operation::Close, &self.name)?;

        if expunge && mode == OpenMode::ReadWrite {
            let entry = state.folder_mut(&self.name)?;
            entry
                .messages
                .retain(|msg| !msg.flags.contains(&Flag::Deleted));
        }

        state.closes.push(FolderClose {
            folder: self.name.clone(),
            expunge,
        });

        self.mode = None;
        Ok(())
    }

    async fn message_count(&self) -> AnyResult<usize> {
        let state = lock(&self.state);
        Ok(state.folder(&self.name)?.messages.len())
    }

    async fn messages(&self, start: usize, end: usize) -> AnyResult<Vec<Self::Message>> {
        self.mode()?;
        let state = lock(&self.state);
        let entry = state.folder(&self.name)?;
        let count = entry.messages.len();

        if start < 1 || end < start || end > count {
            let err = Error::MessagesOutOfRangeError(self.name.clone(), start, end, count);
            return Err(err.into());
        }

        let messages = entry.messages[start - 1..end]
            .iter()
            .map(|msg| MemoryMessage {
                state: self.state.clone(),
                folder: self.name.clone(),
                uid: msg.uid,
                peek: false,
                fetched: None,
            })
            .collect();

        Ok(messages)
    }

    async fn fetch(
        &self,
        messages: &mut [Self::Message],
        profile: &FetchProfile,
    ) -> AnyResult<()> {
        let mode = self.mode()?;
        let mut state = lock(&self.state);
        state.check(Operation::Fetch, &self.name)?;

        if !profile.contains(FetchItem::Content) {
            return Ok(());
        }

        for msg in messages.iter_mut() {
            let entry = state.message_mut(&self.name, msg.uid)?;
            msg.fetched = Some(RawMessage::new(entry.raw.to_vec(), entry.flags.clone()));

            if !msg.peek && mode == OpenMode::ReadWrite {
                entry.flags.insert(Flag::Seen);
            }
        }

        Ok(())
    }

    async fn create(&self, kind: FolderType) -> AnyResult<bool> {
        let mut state = lock(&self.state);
        state.check(Operation::Create, &self.name)?;

        if state.folders.contains_key(&self.name) {
            return Ok(false);
        }

        state.folders.insert(
            self.name.clone(),
            FolderEntry {
                kind,
                messages: Vec::new(),
            },
        );

        Ok(true)
    }

    async fn delete(&self, recursive: bool) -> AnyResult<bool> {
        let mut state = lock(&self.state);
        state.check(Operation::Delete, &self.name)?;

        if self.name.is_empty() || !state.folders.contains_key(&self.name) {
            return Ok(false);
        }

        let has_children = state
            .folders
            .keys()
            .any(|name| state.is_descendant(&self.name, name));

        if has_children && !recursive {
            return Err(Error::DeleteNonEmptyFolderError(self.name.clone()).into());
        }

        let descendants: Vec<String> = state
            .folders
            .keys()
            .filter(|name| *name == &self.name || state.is_descendant(&self.name, name))
            .cloned()
            .collect();

        for name in descendants {
            state.folders.remove(&name);
        }

        Ok(true)
    }

    async fn append_messages(&self, messages: &[RawMessage]) -> AnyResult<()> {
        let mut state = lock(&self.state);
        state.check(Operation::Append, &self.name)?;
        state.folder(&self.name)?;

        for msg in messages {
            let uid = state.next_uid;
            state.next_uid += 1;
            state.folder_mut(&self.name)?.messages.push(MessageEntry {
                uid,
                raw: Arc::new(msg.raw.clone()),
                flags: msg.flags.clone(),
            });
        }

        Ok(())
    }
}

/// The in-memory message handle.
///
/// The handle points to a message by uid, so it survives expunges of
/// other messages.
pub struct MemoryMessage {
    state: Arc<Mutex<MemoryState>>,
    folder: String,
    uid: u64,
    peek: bool,
    fetched: Option<RawMessage>,
}

#[async_trait]
impl Message for MemoryMessage {
    fn header(&self, name: &str) -> AnyResult<Vec<String>> {
        let raw = {
            let state = lock(&self.state);
            state.check_message(Operation::ReadHeader, &self.folder, self.uid)?;
            state.message(&self.folder, self.uid)?.raw.clone()
        };

        Ok(parse_header(&raw, name))
    }

    fn set_peek(&mut self, peek: bool) {
        self.peek = peek;
    }

    async fn set_flag(&mut self, flag: Flag, set: bool) -> AnyResult<()> {
        let mut state = lock(&self.state);
        state.check_message(Operation::Flag, &self.folder, self.uid)?;

        let entry = state.message_mut(&self.folder, self.uid)?;
        if set {
            entry.flags.insert(flag);
        } else {
            entry.flags.remove(&flag);
        }

        Ok(())
    }

    fn to_raw(&self) -> AnyResult<RawMessage> {
        let msg = self
            .fetched
            .clone()
            .ok_or_else(|| Error::ContentNotFetchedError(self.folder.clone(), self.uid))?;
        Ok(msg)
    }
}

/// Extract the unfolded raw values of all headers matching the given
/// name.
fn parse_header(raw: &[u8], name: &str) -> Vec<String> {
    let Some(msg) = MessageParser::new().parse(raw) else {
        return Vec::new();
    };

    msg.headers()
        .iter()
        .filter(|header| header.name().eq_ignore_ascii_case(name))
        .filter_map(|header| raw.get(header.offset_start as usize..header.offset_end as usize))
        .map(|value| {
            String::from_utf8_lossy(value)
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

//! Rust library to mirror the mailboxes of a mail store onto another
//! one.
//!
//! The main purpose of this library is to replicate the folder
//! hierarchy and the messages of a source store onto a target store,
//! without duplicating messages already present on the target, and
//! optionally to remove from the target what no longer exists on the
//! source. It is built for large accounts: folders are split into
//! batches of messages processed concurrently by a pool of workers.
//!
//! The engine never speaks a wire protocol by itself. It drives any
//! implementation of the [`store`] traits ([`StoreBuilder`],
//! [`Store`], [`Folder`], [`Message`]). An in-memory implementation is
//! shipped in [`store::memory`].
//!
//! A synchronization run goes through three phases:
//!
//! 1. the target store is crawled by the [`crawl::StoreCrawler`],
//!    which fills a [`FolderIndex`] with the fingerprints of every
//!    target message;
//!
//! 2. the source store is copied by the [`copy::StoreCopier`], which
//!    creates missing folders then appends messages whose
//!    [`Fingerprint`] is unknown to the target;
//!
//! 3. if asked for, and only if the copy went through without any
//!    error, the [`delete::StoreDeleter`] removes target folders and
//!    messages that have no counterpart on the source.
//!
//! The whole run is configured and started from a
//! [`sync::SyncBuilder`].
//!
//! [`StoreBuilder`]: crate::store::StoreBuilder
//! [`Store`]: crate::store::Store
//! [`Folder`]: crate::store::Folder
//! [`Message`]: crate::store::Message
//! [`FolderIndex`]: crate::index::FolderIndex
//! [`Fingerprint`]: crate::fingerprint::Fingerprint

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod batch;
pub mod copy;
pub mod crawl;
pub mod delete;
mod error;
pub mod fingerprint;
pub mod folder;
pub mod index;
pub mod store;
pub mod sync;
pub mod thread_pool;

#[doc(inline)]
pub use self::error::{AnyBoxedError, AnyError, AnyResult, Error, Result};

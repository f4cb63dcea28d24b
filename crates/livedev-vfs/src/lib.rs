//! Virtual web server for live preview.
//!
//! Requests under a configured route are answered from an in-memory
//! [`VirtualFileStore`] rather than the disk. HTML entry points can be
//! rewritten by an [`HtmlInstrumenter`] on the way out, and rendered bodies
//! are cached per [`CacheCategory`] until the file is written again.

pub mod cache;
pub mod http;
pub mod mime;
pub mod path;
pub mod server;
pub mod store;
pub mod watch;

pub use cache::{CacheCategory, CachePolicy, ResponseCache};
pub use path::PathError;
pub use server::{HtmlInstrumenter, ServeError, ServerConfig, VirtualResponse, VirtualServer};
pub use store::{FileEntry, VirtualFileStore};
pub use watch::{ChangeKind, ProjectChange, ProjectWatcher, WatchError, load_dir};

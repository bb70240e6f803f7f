//! Shell integration core for a tabbed Windows file manager.
//!
//! Icons for bookmarks and other UI surfaces are resolved through a shared
//! [`icon_cache::IconCache`] and, on a miss, an [`icon_fetcher::IconFetcher`]
//! that works off the UI thread but always reports back on it. Native context
//! menus go through [`context_menu::ContextMenuLayer`]. Everything that talks
//! to the real shell lives in `win32`; the rest is platform neutral.

pub mod bookmark_icons;
pub mod bookmarks;
pub mod config;
pub mod context;
pub mod context_menu;
pub mod error;
pub mod icon_cache;
pub mod icon_fetcher;
pub mod ids;
pub mod image_list;
pub mod logging;

#[cfg(windows)]
pub mod win32;

#[cfg(test)]
mod test_support;

pub use error::{Result, ShellError};

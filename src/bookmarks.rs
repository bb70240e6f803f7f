use serde::{Deserialize, Serialize};

/// A node in the bookmark tree.
///
/// Bookmarks carry no icon of their own; what they show is derived from their
/// location when they are drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BookmarkItem {
    Folder {
        name: String,
        #[serde(default)]
        children: Vec<BookmarkItem>,
    },
    Bookmark {
        name: String,
        location: String,
    },
}

impl BookmarkItem {
    pub fn folder(name: impl Into<String>, children: Vec<BookmarkItem>) -> Self {
        BookmarkItem::Folder {
            name: name.into(),
            children,
        }
    }

    pub fn bookmark(name: impl Into<String>, location: impl Into<String>) -> Self {
        BookmarkItem::Bookmark {
            name: name.into(),
            location: location.into(),
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, BookmarkItem::Folder { .. })
    }

    pub fn name(&self) -> &str {
        match self {
            BookmarkItem::Folder { name, .. } | BookmarkItem::Bookmark { name, .. } => name,
        }
    }

    /// `None` for folders.
    pub fn location(&self) -> Option<&str> {
        match self {
            BookmarkItem::Folder { .. } => None,
            BookmarkItem::Bookmark { location, .. } => Some(location),
        }
    }

    pub fn children(&self) -> &[BookmarkItem] {
        match self {
            BookmarkItem::Folder { children, .. } => children,
            BookmarkItem::Bookmark { .. } => &[],
        }
    }

    /// Depth-first walk over this item and everything below it.
    pub fn walk(&self) -> Vec<&BookmarkItem> {
        let mut items = vec![self];
        for child in self.children() {
            items.extend(child.walk());
        }
        items
    }
}

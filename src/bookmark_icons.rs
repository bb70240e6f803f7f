use crate::bookmarks::BookmarkItem;
use crate::error::Result;
use crate::icon_cache::SharedIconCache;
use crate::icon_fetcher::IconFetcher;
use crate::ids::{IconSize, PrivateIconIndex, SystemIconIndex};
use crate::image_list::{IconRepository, ImageListHandle, PrivateImageList};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Called with a better icon once one has been fetched for a bookmark.
pub type IconAvailableCallback = Box<dyn FnOnce(PrivateIconIndex)>;

/// Everything a late fetch result may touch. Queued tasks only hold a weak
/// reference to it, so once the manager is dropped they cannot reach it.
struct IconListState<R: IconRepository> {
    repository: Rc<R>,
    list: R::List,
    folder_icon_index: PrivateIconIndex,
    default_icon_index: PrivateIconIndex,
    default_folder_system_index: SystemIconIndex,
}

impl<R: IconRepository> IconListState<R> {
    fn add_system_icon(&mut self, system_index: SystemIconIndex) -> PrivateIconIndex {
        // Other repeated icons are copied again. Tracking them would need use
        // counts, and most bookmarks end up with the default folder anyway.
        if system_index == self.default_folder_system_index {
            return self.default_icon_index;
        }

        match self.repository.copy_icon(&mut self.list, system_index) {
            Ok(index) => index,
            Err(e) => {
                tracing::debug!(target: "bookmark_icons", "Could not copy system icon {}: {}", system_index.0, e);
                self.default_icon_index
            }
        }
    }
}

/// Owns the image list used by the bookmark tree and toolbar, and maps
/// bookmark items to indices in it.
pub struct BookmarkIconManager<R: IconRepository> {
    state: Rc<RefCell<IconListState<R>>>,
    cache: SharedIconCache,
    fetcher: Rc<IconFetcher>,
}

impl<R> BookmarkIconManager<R>
where
    R: IconRepository + 'static,
    R::List: 'static,
{
    pub fn new(
        repository: Rc<R>,
        cache: SharedIconCache,
        fetcher: Rc<IconFetcher>,
        icon_size: IconSize,
    ) -> Result<Self> {
        let default_folder_system_index = repository.default_folder_index()?;
        let mut list = repository.create_list(icon_size)?;
        let folder_icon_index = repository.add_folder_glyph(&mut list)?;
        let default_icon_index = repository.copy_icon(&mut list, default_folder_system_index)?;

        tracing::debug!(
            target: "bookmark_icons",
            "Created bookmark image list ({}x{}), folder glyph {}, default icon {}",
            icon_size.width,
            icon_size.height,
            folder_icon_index.0,
            default_icon_index.0
        );

        Ok(Self {
            state: Rc::new(RefCell::new(IconListState {
                repository,
                list,
                folder_icon_index,
                default_icon_index,
                default_folder_system_index,
            })),
            cache,
            fetcher,
        })
    }

    pub fn image_list(&self) -> ImageListHandle {
        self.state.borrow().list.handle()
    }

    pub fn icon_count(&self) -> usize {
        self.state.borrow().list.len()
    }

    pub fn folder_icon_index(&self) -> PrivateIconIndex {
        self.state.borrow().folder_icon_index
    }

    pub fn default_icon_index(&self) -> PrivateIconIndex {
        self.state.borrow().default_icon_index
    }

    /// Returns an index that can be drawn right away.
    ///
    /// For a bookmark whose icon is not cached yet this is the default folder
    /// icon, and `on_resolved` is called later if a different icon turns up.
    pub fn get_bookmark_item_icon_index(
        &self,
        item: &BookmarkItem,
        on_resolved: Option<IconAvailableCallback>,
    ) -> PrivateIconIndex {
        match item {
            BookmarkItem::Folder { .. } => self.folder_icon_index(),
            BookmarkItem::Bookmark { location, .. } => self.icon_for_bookmark(location, on_resolved),
        }
    }

    /// Copies a system icon into the private list, reusing the default entry
    /// for the default folder icon.
    pub fn add_system_icon_to_image_list(&self, system_index: SystemIconIndex) -> PrivateIconIndex {
        self.state.borrow_mut().add_system_icon(system_index)
    }

    fn icon_for_bookmark(
        &self,
        location: &str,
        on_resolved: Option<IconAvailableCallback>,
    ) -> PrivateIconIndex {
        let cached = self.cache.borrow().find_by_path(location);
        if let Some(system_index) = cached {
            return self.add_system_icon_to_image_list(system_index);
        }

        let state: Weak<RefCell<IconListState<R>>> = Rc::downgrade(&self.state);
        self.fetcher.queue_icon_task(location, move |system_index| {
            let Some(state) = state.upgrade() else {
                return;
            };
            let Some(on_resolved) = on_resolved else {
                return;
            };

            let icon_index = {
                let mut state = state.borrow_mut();

                // Already showing the default folder icon
                if system_index == state.default_folder_system_index {
                    return;
                }

                state.add_system_icon(system_index)
            };

            on_resolved(icon_index);
        });

        self.default_icon_index()
    }
}

impl<R: IconRepository> Drop for BookmarkIconManager<R> {
    fn drop(&mut self) {
        tracing::trace!(target: "bookmark_icons", "Bookmark icon manager destroyed");
    }
}

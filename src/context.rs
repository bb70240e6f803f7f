use crate::bookmark_icons::BookmarkIconManager;
use crate::config::AppConfig;
use crate::error::Result;
use crate::icon_cache::{IconCache, SharedIconCache};
use crate::icon_fetcher::{IconFetcher, IconResolver, UiWaker};
use crate::ids::IconSize;
use crate::image_list::IconRepository;
use std::rc::Rc;
use std::sync::Arc;

/// The process-wide pieces every UI surface shares: the icon cache, the
/// fetcher and the system icon repository.
pub struct ShellContext<R: IconRepository> {
    pub icon_cache: SharedIconCache,
    pub icon_fetcher: Rc<IconFetcher>,
    pub icon_repository: Rc<R>,
}

impl<R> ShellContext<R>
where
    R: IconRepository + 'static,
    R::List: 'static,
{
    pub fn new(
        repository: R,
        resolver: Arc<dyn IconResolver>,
        waker: Arc<dyn UiWaker>,
        config: &AppConfig,
    ) -> Result<Self> {
        let icon_cache = IconCache::shared(config.icon_cache_capacity);
        let default_folder_index = repository.default_folder_index()?;
        let icon_fetcher = IconFetcher::new(
            resolver,
            waker,
            icon_cache.clone(),
            default_folder_index,
            config.fetcher_threads,
        )?;

        tracing::debug!(
            target: "main",
            "Shell context ready, default folder icon {}, {} fetcher threads",
            default_folder_index.0,
            config.fetcher_threads
        );

        Ok(Self {
            icon_cache,
            icon_fetcher: Rc::new(icon_fetcher),
            icon_repository: Rc::new(repository),
        })
    }

    pub fn bookmark_icon_manager(&self, icon_size: IconSize) -> Result<BookmarkIconManager<R>> {
        BookmarkIconManager::new(
            self.icon_repository.clone(),
            self.icon_cache.clone(),
            self.icon_fetcher.clone(),
            icon_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::BookmarkItem;
    use crate::ids::{PrivateIconIndex, SystemIconIndex};
    use crate::test_support::{CountingWaker, FakeRepository, GatedResolver};
    use std::cell::RefCell;
    use std::time::Duration;

    #[test]
    fn test_managers_share_cache_and_fetcher() {
        let resolver = Arc::new(GatedResolver::new());
        let context = ShellContext::new(
            FakeRepository::new(SystemIconIndex(3)),
            resolver.clone(),
            Arc::new(CountingWaker::default()),
            &AppConfig::default(),
        )
        .unwrap();

        let tree = context.bookmark_icon_manager(IconSize::default()).unwrap();
        let toolbar = context
            .bookmark_icon_manager(IconSize {
                width: 32,
                height: 32,
            })
            .unwrap();
        let bookmark = BookmarkItem::bookmark("Shared", "C:\\Shared");

        let resolved = std::rc::Rc::new(RefCell::new(Vec::new()));
        let sink = resolved.clone();
        tree.get_bookmark_item_icon_index(&bookmark, Some(Box::new(move |index| sink.borrow_mut().push(index))));
        resolver.release("C:\\Shared", Ok(SystemIconIndex(42)));
        assert_eq!(context.icon_fetcher.wait_for_completions(Duration::from_secs(5)), 1);
        assert_eq!(*resolved.borrow(), vec![PrivateIconIndex(2)]);

        // The second surface now hits the shared cache
        assert_eq!(toolbar.get_bookmark_item_icon_index(&bookmark, None), PrivateIconIndex(2));
        assert_eq!(context.icon_fetcher.pending_count(), 0);
        assert_eq!(resolver.total_requests(), 1);
    }
}

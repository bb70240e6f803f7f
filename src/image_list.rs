use crate::error::Result;
use crate::ids::{IconSize, PrivateIconIndex, SystemIconIndex};

/// Opaque handle the UI binds as its row icon source (an `HIMAGELIST` on
/// Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageListHandle(pub isize);

/// Append-only image list owned by a single UI surface.
pub trait PrivateImageList {
    fn handle(&self) -> ImageListHandle;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Access to the shared system icon list and to the operations that populate
/// private lists from it.
pub trait IconRepository {
    type List: PrivateImageList;

    fn create_list(&self, size: IconSize) -> Result<Self::List>;

    /// System index of the generic closed-folder icon.
    fn default_folder_index(&self) -> Result<SystemIconIndex>;

    /// Appends the application's own folder glyph, scaled to the list size.
    fn add_folder_glyph(&self, list: &mut Self::List) -> Result<PrivateIconIndex>;

    /// Appends a copy of a system icon to `list`.
    fn copy_icon(&self, list: &mut Self::List, index: SystemIconIndex) -> Result<PrivateIconIndex>;
}

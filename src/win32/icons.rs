use super::to_wide;
use crate::error::{Result, ShellError};
use crate::icon_fetcher::IconResolver;
use crate::ids::{IconSize, PrivateIconIndex, SystemIconIndex};
use crate::image_list::{IconRepository, ImageListHandle, PrivateImageList};
use windows::{
    core::*,
    Win32::{
        Storage::FileSystem::*,
        System::Com::*,
        UI::{Controls::*, Shell::*, WindowsAndMessaging::*},
    },
};

/// Resolves display icons with `SHGetFileInfoW` on the fetcher's workers.
pub struct ShellIconResolver;

impl IconResolver for ShellIconResolver {
    fn resolve_display_icon(&self, path: &str) -> Result<SystemIconIndex> {
        let path_wide = to_wide(path);
        let mut file_info = SHFILEINFOW::default();

        let result = unsafe {
            SHGetFileInfoW(
                PCWSTR::from_raw(path_wide.as_ptr()),
                FILE_FLAGS_AND_ATTRIBUTES(0),
                Some(&mut file_info),
                std::mem::size_of::<SHFILEINFOW>() as u32,
                SHGFI_SYSICONINDEX | SHGFI_SMALLICON,
            )
        };

        if result == 0 {
            return Err(ShellError::UnresolvedIcon {
                path: path.to_string(),
            });
        }
        Ok(SystemIconIndex(file_info.iIcon))
    }

    // Some icon handlers are COM objects that need an apartment
    fn on_worker_start(&self) {
        if let Err(e) = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) } {
            tracing::warn!(target: "win32", "COM init failed on icon worker: {}", e);
        }
    }

    fn on_worker_exit(&self) {
        unsafe { CoUninitialize() };
    }
}

/// The small-icon system image list.
pub struct SystemIconRepository {
    system_list: HIMAGELIST,
}

impl SystemIconRepository {
    pub fn new() -> Result<Self> {
        let (system_list, _) = query_default_folder()?;
        Ok(Self { system_list })
    }
}

/// Asking for a directory's index also hands back the system list itself.
fn query_default_folder() -> Result<(HIMAGELIST, SystemIconIndex)> {
    let mut file_info = SHFILEINFOW::default();
    let result = unsafe {
        SHGetFileInfoW(
            w!("dummy"),
            FILE_ATTRIBUTE_DIRECTORY,
            Some(&mut file_info),
            std::mem::size_of::<SHFILEINFOW>() as u32,
            SHGFI_SYSICONINDEX | SHGFI_SMALLICON | SHGFI_USEFILEATTRIBUTES,
        )
    };

    if result == 0 {
        return Err(ShellError::binding("system image list", "SHGetFileInfoW returned no list"));
    }
    Ok((HIMAGELIST(result as isize), SystemIconIndex(file_info.iIcon)))
}

impl IconRepository for SystemIconRepository {
    type List = Win32ImageList;

    fn create_list(&self, size: IconSize) -> Result<Win32ImageList> {
        let list = unsafe { ImageList_Create(size.width, size.height, ILC_COLOR32 | ILC_MASK, 0, 16) };
        if list.is_invalid() {
            return Err(Error::from_win32().into());
        }
        Ok(Win32ImageList { list, size, count: 0 })
    }

    fn default_folder_index(&self) -> Result<SystemIconIndex> {
        query_default_folder().map(|(_, index)| index)
    }

    fn add_folder_glyph(&self, list: &mut Win32ImageList) -> Result<PrivateIconIndex> {
        let size_flag = if list.size.width > 16 { SHGSI_LARGEICON } else { SHGSI_SMALLICON };
        let mut info = SHSTOCKICONINFO {
            cbSize: std::mem::size_of::<SHSTOCKICONINFO>() as u32,
            ..Default::default()
        };
        unsafe { SHGetStockIconInfo(SIID_FOLDER, SHGSI_ICON | size_flag, &mut info)? };

        let added = list.append_icon(info.hIcon);
        unsafe {
            let _ = DestroyIcon(info.hIcon);
        }
        added
    }

    fn copy_icon(&self, list: &mut Win32ImageList, index: SystemIconIndex) -> Result<PrivateIconIndex> {
        let icon = unsafe { ImageList_GetIcon(self.system_list, index.0, ILD_NORMAL) };
        if icon.is_invalid() {
            return Err(ShellError::binding("copy icon", format!("system icon {} unavailable", index.0)));
        }

        let added = list.append_icon(icon);
        unsafe {
            let _ = DestroyIcon(icon);
        }
        added
    }
}

/// A private `HIMAGELIST`, destroyed with its owner.
pub struct Win32ImageList {
    list: HIMAGELIST,
    size: IconSize,
    count: usize,
}

impl Win32ImageList {
    /// The list keeps its own copy of `icon`.
    fn append_icon(&mut self, icon: HICON) -> Result<PrivateIconIndex> {
        let index = unsafe { ImageList_ReplaceIcon(self.list, -1, icon) };
        if index < 0 {
            return Err(Error::from_win32().into());
        }
        self.count += 1;
        Ok(PrivateIconIndex(index))
    }
}

impl PrivateImageList for Win32ImageList {
    fn handle(&self) -> ImageListHandle {
        ImageListHandle(self.list.0)
    }

    fn len(&self) -> usize {
        self.count
    }
}

impl Drop for Win32ImageList {
    fn drop(&mut self) {
        unsafe {
            let _ = ImageList_Destroy(self.list);
        }
    }
}

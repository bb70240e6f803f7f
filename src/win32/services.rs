use super::namespace::enumerate_folder;
use crate::ids::ShellItemId;
use std::cell::OnceCell;
use std::ffi::c_void;
use windows::{
    core::*,
    Win32::{
        Foundation::*,
        System::Com::*,
        UI::Shell::{Common::ITEMIDLIST, *},
    },
};

/// Site handed to context menus and their extensions. Answers `QueryService`
/// for whatever it was built with and nothing else.
#[implement(IServiceProvider)]
pub struct ServiceProvider {
    services: Vec<(GUID, IUnknown)>,
}

impl ServiceProvider {
    pub fn new(services: Vec<(GUID, IUnknown)>) -> Self {
        Self { services }
    }
}

impl IServiceProvider_Impl for ServiceProvider {
    fn QueryService(&self, service: *const GUID, iid: *const GUID, result: *mut *mut c_void) -> Result<()> {
        if service.is_null() || result.is_null() {
            return Err(Error::from(E_POINTER));
        }

        let requested = unsafe { *service };
        match self.services.iter().find(|(guid, _)| *guid == requested) {
            Some((_, object)) => unsafe { object.query(iid, result).ok() },
            None => {
                unsafe { result.write(std::ptr::null_mut()) };
                Err(Error::from(E_NOINTERFACE))
            }
        }
    }
}

/// Lets the "New" submenu offer both files and folders.
#[implement(INewMenuClient)]
pub struct NewMenuClient;

impl INewMenuClient_Impl for NewMenuClient {
    fn IncludeItems(&self) -> Result<i32> {
        Ok(NMCII_ITEMS.0 | NMCII_FOLDERS.0)
    }

    fn SelectAndEditItem(&self, item: *const ITEMIDLIST, flags: i32) -> Result<()> {
        // Selection is left to the hosting view, which sees the new item
        // through its own directory monitoring
        tracing::trace!(target: "win32", "New menu created an item (flags {:#x}, null: {})", flags, item.is_null());
        Ok(())
    }
}

/// Minimal folder view over one directory. Extensions mostly use it to find
/// the folder and its items; layout queries are not supported.
///
/// The directory is listed the first time an extension asks about its items.
#[implement(IFolderView)]
pub struct FolderView {
    folder: IShellFolder,
    directory: ShellItemId,
    owner: HWND,
    children: OnceCell<Vec<ShellItemId>>,
}

impl FolderView {
    pub fn new(folder: IShellFolder, directory: ShellItemId, owner: HWND) -> Self {
        Self {
            folder,
            directory,
            owner,
            children: OnceCell::new(),
        }
    }

    fn children(&self) -> &[ShellItemId] {
        self.children.get_or_init(|| {
            enumerate_folder(&self.folder, self.owner).unwrap_or_else(|e| {
                tracing::debug!(target: "win32", "Folder view of {:?} has no items: {}", self.directory, e);
                Vec::new()
            })
        })
    }
}

impl IFolderView_Impl for FolderView {
    fn GetCurrentViewMode(&self) -> Result<u32> {
        Ok(FVM_DETAILS.0 as u32)
    }

    fn SetCurrentViewMode(&self, _view_mode: u32) -> Result<()> {
        Err(Error::from(E_NOTIMPL))
    }

    fn GetFolder(&self, iid: *const GUID, result: *mut *mut c_void) -> Result<()> {
        unsafe { self.folder.query(iid, result).ok() }
    }

    fn Item(&self, index: i32) -> Result<*mut ITEMIDLIST> {
        let child = usize::try_from(index)
            .ok()
            .and_then(|index| self.children().get(index))
            .ok_or_else(|| Error::from(E_INVALIDARG))?;
        let copy = unsafe { ILClone(child.as_bytes().as_ptr() as *const ITEMIDLIST) };
        if copy.is_null() {
            return Err(Error::from(E_OUTOFMEMORY));
        }
        Ok(copy)
    }

    fn ItemCount(&self, flags: _SVGIO) -> Result<i32> {
        // Nothing in this view is ever selected
        if (flags.0 & SVGIO_TYPE_MASK.0) == SVGIO_SELECTION.0 {
            return Ok(0);
        }
        Ok(self.children().len() as i32)
    }

    fn Items(&self, _flags: _SVGIO, _iid: *const GUID, _result: *mut *mut c_void) -> Result<()> {
        Err(Error::from(E_NOTIMPL))
    }

    fn GetSelectionMarkedItem(&self) -> Result<i32> {
        Ok(-1)
    }

    fn GetFocusedItem(&self) -> Result<i32> {
        Ok(-1)
    }

    fn GetItemPosition(&self, _item: *const ITEMIDLIST) -> Result<POINT> {
        Err(Error::from(E_NOTIMPL))
    }

    fn GetSpacing(&self, _point: *mut POINT) -> Result<()> {
        Err(Error::from(E_NOTIMPL))
    }

    fn GetDefaultSpacing(&self, _point: *mut POINT) -> Result<()> {
        Err(Error::from(E_NOTIMPL))
    }

    fn GetAutoArrange(&self) -> Result<()> {
        Err(Error::from(E_NOTIMPL))
    }

    fn SelectItem(&self, index: i32, _flags: u32) -> Result<()> {
        tracing::trace!(target: "win32", "Folder view of {:?} asked to select item {}", self.directory, index);
        Ok(())
    }

    fn SelectAndPositionItems(
        &self,
        _count: u32,
        _items: *const *const ITEMIDLIST,
        _points: *const POINT,
        _flags: u32,
    ) -> Result<()> {
        Err(Error::from(E_NOTIMPL))
    }
}

use super::services::{FolderView, NewMenuClient, ServiceProvider};
use super::to_wide;
use crate::context_menu::{MenuOptions, NativeMenu, ServiceSet, ShellNamespace, ShellService};
use crate::error::{Result, ShellError};
use crate::ids::{Clsid, ScreenPoint, ShellItemId};
use std::cell::RefCell;
use std::ffi::c_void;
use std::mem::ManuallyDrop;
use windows::{
    core::*,
    Win32::{
        Foundation::*,
        System::{Com::*, Ole::IObjectWithSite, Registry::*},
        UI::{
            Shell::{Common::ITEMIDLIST, *},
            WindowsAndMessaging::*,
        },
    },
};

/// Command identifiers reserved for the shell's own menu.
const BASE_MENU_FIRST_ID: u32 = 1;
const BASE_MENU_LAST_ID: u32 = 0x3FFF;
/// Every extension gets a block of this many identifiers after the base range.
const EXTENSION_ID_BLOCK: u32 = 0x100;
const LAST_MENU_ID: u32 = 0xFFFF;

const BACKGROUND_HANDLERS_KEY: &str = "Directory\\Background\\shellex\\ContextMenuHandlers";

thread_local! {
    // Menus of the popup currently being tracked, for owner-draw forwarding
    static ACTIVE_MENUS: RefCell<Vec<IContextMenu>> = RefCell::new(Vec::new());
}

fn as_pidl(id: &ShellItemId) -> *const ITEMIDLIST {
    id.as_bytes().as_ptr() as *const ITEMIDLIST
}

/// Copies a shell-allocated identifier list and frees the original.
unsafe fn take_pidl(pidl: *mut ITEMIDLIST) -> Result<ShellItemId> {
    if pidl.is_null() {
        return Err(ShellError::MalformedItemId("null identifier list".to_string()));
    }
    let size = ILGetSize(Some(pidl)) as usize;
    let bytes = std::slice::from_raw_parts(pidl as *const u8, size);
    let id = ShellItemId::from_bytes(bytes);
    CoTaskMemFree(Some(pidl as *const c_void));
    id
}

/// Absolute identifier for a parsing name such as `C:\Windows`.
pub fn item_id_from_path(path: &str) -> Result<ShellItemId> {
    let path_wide = to_wide(path);
    let mut pidl: *mut ITEMIDLIST = std::ptr::null_mut();
    unsafe {
        SHParseDisplayName(PCWSTR::from_raw(path_wide.as_ptr()), None, &mut pidl, 0, None)?;
        take_pidl(pidl)
    }
}

/// Lets owner-drawn submenus of the menu being tracked handle their messages.
pub fn forward_menu_message(message: u32, wparam: WPARAM, lparam: LPARAM) -> Option<LRESULT> {
    if !matches!(message, WM_INITMENUPOPUP | WM_DRAWITEM | WM_MEASUREITEM | WM_MENUCHAR) {
        return None;
    }

    // Handlers may pump messages, so do not hold the borrow across the calls
    let menus = ACTIVE_MENUS.with(|active| active.borrow().clone());
    for menu in menus {
        unsafe {
            if let Ok(menu3) = menu.cast::<IContextMenu3>() {
                let mut result = LRESULT(0);
                if menu3.HandleMenuMsg2(message, wparam, lparam, Some(&mut result)).is_ok() {
                    return Some(result);
                }
            } else if let Ok(menu2) = menu.cast::<IContextMenu2>() {
                if menu2.HandleMenuMsg(message, wparam, lparam).is_ok() {
                    return Some(LRESULT(0));
                }
            }
        }
    }
    None
}

/// The desktop namespace, with `owner` as the window for any UI the shell
/// shows.
pub struct Win32Namespace {
    owner: HWND,
}

impl Win32Namespace {
    pub fn new(owner: HWND) -> Self {
        Self { owner }
    }

    fn bind_folder(&self, item: &ShellItemId) -> Result<IShellFolder> {
        unsafe {
            let desktop = SHGetDesktopFolder()?;
            if item.is_root() {
                return Ok(desktop);
            }
            Ok(desktop.BindToObject::<_, IShellFolder>(as_pidl(item), None)?)
        }
    }

    fn site_for(&self, services: &ServiceSet) -> Result<IServiceProvider> {
        let mut offered: Vec<(GUID, IUnknown)> = Vec::new();
        for service in services.iter() {
            match service {
                ShellService::NewMenuClient => {
                    offered.push((INewMenuClient::IID, NewMenuClient.into()));
                }
                ShellService::FolderView(directory) => {
                    let folder = self.bind_folder(directory)?;
                    let view = FolderView::new(folder, directory.clone(), self.owner);
                    offered.push((IFolderView::IID, view.into()));
                }
            }
        }
        Ok(ServiceProvider::new(offered).into())
    }
}

impl ShellNamespace for Win32Namespace {
    type Folder = IShellFolder;
    type DataObject = IDataObject;
    type Menu = Win32Menu;

    fn bind_to_parent_folder(&self, item: &ShellItemId) -> Result<IShellFolder> {
        let mut folder: *mut c_void = std::ptr::null_mut();
        unsafe {
            SHBindToParent(as_pidl(item), &IShellFolder::IID, &mut folder, None)?;
            Ok(IShellFolder::from_raw(folder))
        }
    }

    fn data_object_for_children(&self, folder: &IShellFolder, children: &[ShellItemId]) -> Result<IDataObject> {
        let items: Vec<*const ITEMIDLIST> = children.iter().map(as_pidl).collect();
        let mut data: *mut c_void = std::ptr::null_mut();
        unsafe {
            folder.GetUIObjectOf(self.owner, &items, &IDataObject::IID, None, &mut data)?;
            Ok(IDataObject::from_raw(data))
        }
    }

    fn enumerate_children(&self, item: &ShellItemId) -> Result<Vec<ShellItemId>> {
        enumerate_folder(&self.bind_folder(item)?, self.owner)
    }

    fn background_handlers(&self) -> Result<Vec<Clsid>> {
        let Some(key) = RegistryKey::open(HKEY_CLASSES_ROOT, BACKGROUND_HANDLERS_KEY) else {
            return Ok(Vec::new());
        };

        let mut handlers: Vec<Clsid> = Vec::new();
        for name in key.subkey_names() {
            // Entries are either named by their CLSID or carry it as default value
            let clsid = name
                .parse::<Clsid>()
                .ok()
                .or_else(|| key.default_value(&name).and_then(|value| value.parse().ok()));
            match clsid {
                Some(clsid) if !handlers.contains(&clsid) => handlers.push(clsid),
                Some(_) => {}
                None => tracing::trace!(target: "win32", "Handler entry {} has no CLSID", name),
            }
        }
        Ok(handlers)
    }

    fn default_menu(&self, directory: &ShellItemId, services: &ServiceSet) -> Result<Win32Menu> {
        let folder = self.bind_folder(directory)?;

        let mut definition = DEFCONTEXTMENU {
            hwnd: self.owner,
            pcmcb: ManuallyDrop::new(None),
            pidlFolder: as_pidl(directory) as *mut ITEMIDLIST,
            psf: ManuallyDrop::new(Some(folder)),
            cidl: 0,
            apidl: std::ptr::null_mut(),
            punkAssociationInfo: ManuallyDrop::new(None),
            // No registry keys, so background extensions are left to the caller
            cKeys: 0,
            aKeys: std::ptr::null(),
        };
        let created = unsafe { SHCreateDefaultContextMenu::<IContextMenu>(&definition) };
        unsafe { ManuallyDrop::drop(&mut definition.psf) };
        let base = created?;

        let site = self.site_for(services)?;
        set_site(&base, &site);
        Ok(Win32Menu::new(self.owner, directory.clone(), Some(base), None, Some(site)))
    }

    fn manual_menu(&self, directory: &ShellItemId, data: IDataObject, services: &ServiceSet) -> Result<Win32Menu> {
        let site = self.site_for(services)?;
        Ok(Win32Menu::new(self.owner, directory.clone(), None, Some(data), Some(site)))
    }

    fn item_menu(
        &self,
        directory: &ShellItemId,
        folder: &IShellFolder,
        selection: &[ShellItemId],
        services: &ServiceSet,
    ) -> Result<Win32Menu> {
        let items: Vec<*const ITEMIDLIST> = selection.iter().map(as_pidl).collect();
        let mut raw: *mut c_void = std::ptr::null_mut();
        let base = unsafe {
            folder.GetUIObjectOf(self.owner, &items, &IContextMenu::IID, None, &mut raw)?;
            IContextMenu::from_raw(raw)
        };

        let site = if services.is_empty() {
            None
        } else {
            let site = self.site_for(services)?;
            set_site(&base, &site);
            Some(site)
        };
        Ok(Win32Menu::new(self.owner, directory.clone(), Some(base), None, site))
    }
}

/// Single-level identifiers of everything in `folder`, hidden items included.
pub(super) fn enumerate_folder(folder: &IShellFolder, owner: HWND) -> Result<Vec<ShellItemId>> {
    let flags = (SHCONTF_FOLDERS.0 | SHCONTF_NONFOLDERS.0 | SHCONTF_INCLUDEHIDDEN.0) as u32;

    let mut enumerator: Option<IEnumIDList> = None;
    unsafe { folder.EnumObjects(owner, flags, &mut enumerator).ok()? };
    // S_FALSE with no enumerator means an empty folder
    let Some(enumerator) = enumerator else {
        return Ok(Vec::new());
    };

    let mut children = Vec::new();
    loop {
        let mut batch = [std::ptr::null_mut::<ITEMIDLIST>(); 1];
        let mut fetched = 0u32;
        let hr = unsafe { enumerator.Next(&mut batch, Some(&mut fetched)) };
        if hr != S_OK || fetched == 0 {
            break;
        }
        match unsafe { take_pidl(batch[0]) } {
            Ok(child) => children.push(child),
            Err(e) => tracing::debug!(target: "win32", "Skipping child: {}", e),
        }
    }
    Ok(children)
}

fn set_site(menu: &IContextMenu, site: &IServiceProvider) {
    if let Ok(with_site) = menu.cast::<IObjectWithSite>() {
        if let Err(e) = unsafe { with_site.SetSite(site) } {
            tracing::debug!(target: "win32", "Menu rejected its site: {}", e);
        }
    }
}

struct CommandRange {
    first: u32,
    last: u32,
    menu: IContextMenu,
}

/// A popup menu made of the shell's own menu (if any) followed by the
/// extensions loaded into it.
pub struct Win32Menu {
    owner: HWND,
    directory: ShellItemId,
    base: Option<IContextMenu>,
    data: Option<IDataObject>,
    site: Option<IServiceProvider>,
    extensions: Vec<IContextMenu>,
    commands: Vec<CommandRange>,
    popup: Option<HMENU>,
}

impl Win32Menu {
    fn new(
        owner: HWND,
        directory: ShellItemId,
        base: Option<IContextMenu>,
        data: Option<IDataObject>,
        site: Option<IServiceProvider>,
    ) -> Self {
        Self {
            owner,
            directory,
            base,
            data,
            site,
            extensions: Vec::new(),
            commands: Vec::new(),
            popup: None,
        }
    }

    fn destroy_popup(&mut self) {
        if let Some(popup) = self.popup.take() {
            unsafe {
                let _ = DestroyMenu(popup);
            }
        }
    }

    /// Lets every menu add its items, each in its own identifier range.
    fn populate(&mut self, popup: HMENU, flags: u32) {
        self.commands.clear();
        let menus = self.base.iter().map(|menu| (menu, BASE_MENU_FIRST_ID, BASE_MENU_LAST_ID)).chain(
            self.extensions.iter().enumerate().filter_map(|(i, menu)| {
                let first = BASE_MENU_LAST_ID + 1 + i as u32 * EXTENSION_ID_BLOCK;
                let last = first + EXTENSION_ID_BLOCK - 1;
                (last <= LAST_MENU_ID).then_some((menu, first, last))
            }),
        );

        for (menu, first, last) in menus {
            let position = unsafe { GetMenuItemCount(popup) }.max(0) as u32;
            if unsafe { menu.QueryContextMenu(popup, position, first, last, flags) }.is_err() {
                tracing::debug!(target: "win32", "Menu handler failed to add its items, skipping");
                continue;
            }
            self.commands.push(CommandRange {
                first,
                last,
                menu: menu.clone(),
            });
        }
    }
}

impl NativeMenu for Win32Menu {
    fn add_extension(&mut self, handler: &Clsid) -> Result<()> {
        let clsid = GUID::from_u128(handler.as_u128());
        let menu = unsafe {
            let init: IShellExtInit = CoCreateInstance(&clsid, None, CLSCTX_INPROC_SERVER)?;
            init.Initialize(Some(as_pidl(&self.directory)), self.data.as_ref(), HKEY::default())?;
            init.cast::<IContextMenu>()?
        };
        if let Some(site) = &self.site {
            set_site(&menu, site);
        }
        self.extensions.push(menu);
        tracing::trace!(target: "win32", "Loaded menu extension {}", handler);
        Ok(())
    }

    fn track(&mut self, anchor: ScreenPoint, options: MenuOptions) -> Result<Option<u32>> {
        self.destroy_popup();
        let popup = unsafe { CreatePopupMenu()? };
        self.popup = Some(popup);

        let mut flags = CMF_NORMAL;
        if options.extended_verbs {
            flags |= CMF_EXTENDEDVERBS;
        }
        self.populate(popup, flags);

        let tracked: Vec<IContextMenu> = self.commands.iter().map(|range| range.menu.clone()).collect();
        ACTIVE_MENUS.with(|active| *active.borrow_mut() = tracked);

        let command = unsafe {
            // The popup only closes on outside clicks when its owner is in front
            let _ = SetForegroundWindow(self.owner);
            let command = TrackPopupMenuEx(
                popup,
                (TPM_LEFTALIGN | TPM_RETURNCMD | TPM_RIGHTBUTTON).0,
                anchor.x,
                anchor.y,
                self.owner,
                None,
            );
            let _ = PostMessageW(self.owner, WM_NULL, WPARAM(0), LPARAM(0));
            command
        };

        ACTIVE_MENUS.with(|active| active.borrow_mut().clear());

        Ok(match command.0 {
            0 => None,
            id => Some(id as u32),
        })
    }

    fn invoke(&mut self, command: u32) -> Result<()> {
        let range = self
            .commands
            .iter()
            .find(|range| (range.first..=range.last).contains(&command))
            .ok_or_else(|| ShellError::binding("invoke command", format!("no menu owns command {}", command)))?;

        // The verb is the offset inside the handler's range, passed as an integer resource
        let offset = (command - range.first) as usize;
        let info = CMINVOKECOMMANDINFO {
            cbSize: std::mem::size_of::<CMINVOKECOMMANDINFO>() as u32,
            hwnd: self.owner,
            lpVerb: PCSTR(offset as *const u8),
            nShow: SW_SHOWNORMAL.0,
            ..Default::default()
        };
        unsafe { range.menu.InvokeCommand(&info)? };
        tracing::debug!(target: "win32", "Invoked menu command {}", command);
        Ok(())
    }
}

impl Drop for Win32Menu {
    fn drop(&mut self) {
        self.destroy_popup();
        for menu in self.base.iter().chain(self.extensions.iter()) {
            if let Ok(with_site) = menu.cast::<IObjectWithSite>() {
                let _ = unsafe { with_site.SetSite(None) };
            }
        }
    }
}

/// An open `HKEY_CLASSES_ROOT` subkey.
struct RegistryKey(HKEY);

impl RegistryKey {
    fn open(root: HKEY, path: &str) -> Option<Self> {
        let path_wide = to_wide(path);
        let mut key = HKEY::default();
        let status = unsafe { RegOpenKeyExW(root, PCWSTR::from_raw(path_wide.as_ptr()), 0, KEY_READ, &mut key) };
        (status == ERROR_SUCCESS).then_some(RegistryKey(key))
    }

    fn subkey_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut buffer = [0u16; 256];
        for index in 0.. {
            let mut len = buffer.len() as u32;
            let status = unsafe {
                RegEnumKeyExW(
                    self.0,
                    index,
                    PWSTR(buffer.as_mut_ptr()),
                    &mut len,
                    None,
                    PWSTR::null(),
                    None,
                    None,
                )
            };
            if status != ERROR_SUCCESS {
                break;
            }
            names.push(String::from_utf16_lossy(&buffer[..len as usize]));
        }
        names
    }

    fn default_value(&self, subkey: &str) -> Option<String> {
        let subkey_wide = to_wide(subkey);
        let mut buffer = [0u16; 128];
        let mut size = std::mem::size_of_val(&buffer) as u32;
        let status = unsafe {
            RegGetValueW(
                self.0,
                PCWSTR::from_raw(subkey_wide.as_ptr()),
                PCWSTR::null(),
                RRF_RT_REG_SZ,
                None,
                Some(buffer.as_mut_ptr() as *mut c_void),
                Some(&mut size),
            )
        };
        if status != ERROR_SUCCESS {
            return None;
        }
        let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
        Some(String::from_utf16_lossy(&buffer[..len]))
    }
}

impl Drop for RegistryKey {
    fn drop(&mut self) {
        unsafe {
            let _ = RegCloseKey(self.0);
        }
    }
}

//! The real shell behind the collaborator traits.

mod icons;
mod namespace;
mod services;
mod window;

pub use icons::{ShellIconResolver, SystemIconRepository, Win32ImageList};
pub use namespace::{forward_menu_message, item_id_from_path, Win32Menu, Win32Namespace};
pub use services::{FolderView, NewMenuClient, ServiceProvider};
pub use window::{HostWindow, WindowWaker, WM_ICON_FETCHED};

use crate::context_menu::OsCapability;
use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_APARTMENTTHREADED};
use windows::Win32::System::SystemInformation::{
    VerSetConditionMask, VerifyVersionInfoW, OSVERSIONINFOEXW, VER_MAJORVERSION, VER_MINORVERSION,
    VER_SERVICEPACKMAJOR,
};
use windows::Win32::System::SystemServices::VER_GREATER_EQUAL;
use windows::Win32::UI::Input::KeyboardAndMouse::{GetKeyState, VK_SHIFT};

/// Keeps COM initialised (single-threaded apartment) on the current thread.
pub struct ComGuard;

impl ComGuard {
    pub fn new() -> crate::Result<Self> {
        unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED)? };
        Ok(ComGuard)
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        unsafe { CoUninitialize() };
    }
}

/// Windows 8 and later get the default-menu path.
pub fn detect_os_capability() -> OsCapability {
    if is_windows8_or_greater() {
        OsCapability::Modern
    } else {
        OsCapability::Legacy
    }
}

fn is_windows8_or_greater() -> bool {
    unsafe {
        let mut info = OSVERSIONINFOEXW {
            dwOSVersionInfoSize: std::mem::size_of::<OSVERSIONINFOEXW>() as u32,
            dwMajorVersion: 6,
            dwMinorVersion: 2,
            ..Default::default()
        };
        let condition = VER_GREATER_EQUAL as u8;
        let mask = VerSetConditionMask(
            VerSetConditionMask(VerSetConditionMask(0, VER_MAJORVERSION, condition), VER_MINORVERSION, condition),
            VER_SERVICEPACKMAJOR,
            condition,
        );
        VerifyVersionInfoW(&mut info, VER_MAJORVERSION | VER_MINORVERSION | VER_SERVICEPACKMAJOR, mask).is_ok()
    }
}

pub fn is_shift_down() -> bool {
    unsafe { GetKeyState(VK_SHIFT.0 as i32) < 0 }
}

/// Null-terminated UTF-16 copy of `s`.
pub fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

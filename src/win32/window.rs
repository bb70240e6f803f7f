use super::namespace::forward_menu_message;
use crate::error::Result;
use crate::icon_fetcher::{IconFetcher, UiWaker};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use windows::{
    core::*,
    Win32::{Foundation::*, System::LibraryLoader::GetModuleHandleW, UI::WindowsAndMessaging::*},
};

/// Posted by the icon fetcher whenever a result is waiting.
pub const WM_ICON_FETCHED: u32 = WM_APP + 1;

const HOST_WINDOW_CLASS: PCWSTR = w!("ShellBridgeHostWindow");

thread_local! {
    static FETCHER: RefCell<Weak<IconFetcher>> = RefCell::new(Weak::new());
}

/// Hidden window on the UI thread. Owns popup menus and drains fetcher
/// results when woken.
pub struct HostWindow {
    hwnd: HWND,
}

impl HostWindow {
    pub fn create() -> Result<Self> {
        unsafe {
            let instance = GetModuleHandleW(None)?;

            let window_class = WNDCLASSEXW {
                cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
                lpfnWndProc: Some(host_window_proc),
                hInstance: instance.into(),
                lpszClassName: HOST_WINDOW_CLASS,
                ..Default::default()
            };
            // A second window on the same thread finds the class already there
            if RegisterClassExW(&window_class) == 0 && GetLastError() != ERROR_CLASS_ALREADY_EXISTS {
                return Err(Error::from_win32().into());
            }

            let hwnd = CreateWindowExW(
                WS_EX_TOOLWINDOW,
                HOST_WINDOW_CLASS,
                w!("ShellBridge"),
                WS_POPUP,
                0,
                0,
                0,
                0,
                None,
                None,
                instance,
                None,
            );
            if hwnd.0 == 0 {
                return Err(Error::from_win32().into());
            }

            tracing::debug!(target: "win32", "Host window created: {:?}", hwnd);
            Ok(Self { hwnd })
        }
    }

    pub fn hwnd(&self) -> HWND {
        self.hwnd
    }

    pub fn waker(&self) -> WindowWaker {
        WindowWaker { hwnd: self.hwnd }
    }

    /// Routes [`WM_ICON_FETCHED`] on this thread to `fetcher`.
    pub fn attach_fetcher(&self, fetcher: &Rc<IconFetcher>) {
        FETCHER.with(|slot| *slot.borrow_mut() = Rc::downgrade(fetcher));
    }

    /// Pumps messages until `done` holds after a dispatch, or the queue quits.
    pub fn run_until(&self, mut done: impl FnMut() -> bool) {
        if done() {
            return;
        }

        unsafe {
            let mut message = MSG::default();
            while GetMessageW(&mut message, None, 0, 0).into() {
                TranslateMessage(&message);
                DispatchMessageW(&message);
                if done() {
                    break;
                }
            }
        }
    }
}

impl Drop for HostWindow {
    fn drop(&mut self) {
        unsafe {
            let _ = DestroyWindow(self.hwnd);
        }
    }
}

/// Wakes the host window from an icon worker.
pub struct WindowWaker {
    hwnd: HWND,
}

impl UiWaker for WindowWaker {
    fn wake(&self) {
        unsafe {
            let _ = PostMessageW(self.hwnd, WM_ICON_FETCHED, WPARAM(0), LPARAM(0));
        }
    }
}

extern "system" fn host_window_proc(window: HWND, message: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if message == WM_ICON_FETCHED {
        let fetcher = FETCHER.with(|slot| slot.borrow().upgrade());
        if let Some(fetcher) = fetcher {
            let delivered = fetcher.process_completions();
            tracing::trace!(target: "win32", "Delivered {} icon results", delivered);
        }
        return LRESULT(0);
    }

    // Owner-drawn submenus (Open With, Send To) need the active menu to see these
    if let Some(result) = forward_menu_message(message, wparam, lparam) {
        return result;
    }

    unsafe { DefWindowProcW(window, message, wparam, lparam) }
}

//! Deterministic stand-ins for the shell collaborators.

use crate::context_menu::{MenuOptions, NativeMenu, ServiceSet, ShellNamespace};
use crate::error::{Result, ShellError};
use crate::icon_fetcher::{IconResolver, UiWaker};
use crate::ids::{Clsid, IconSize, PrivateIconIndex, ScreenPoint, ShellItemId, SystemIconIndex};
use crate::image_list::{IconRepository, ImageListHandle, PrivateImageList};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Resolver whose answers are handed out by the test, per path, in whatever
/// order the test chooses. Workers block until their path is released.
#[derive(Default)]
pub struct GatedResolver {
    answers: Mutex<HashMap<String, VecDeque<Result<SystemIconIndex>>>>,
    released: Condvar,
    requests: Mutex<Vec<String>>,
}

impl GatedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn release(&self, path: &str, answer: Result<SystemIconIndex>) {
        self.answers
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(answer);
        self.released.notify_all();
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|p| *p == path).count()
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl IconResolver for GatedResolver {
    fn resolve_display_icon(&self, path: &str) -> Result<SystemIconIndex> {
        self.requests.lock().unwrap().push(path.to_string());
        let mut answers = self.answers.lock().unwrap();
        loop {
            if let Some(answer) = answers.get_mut(path).and_then(|queue| queue.pop_front()) {
                return answer;
            }
            answers = self.released.wait(answers).unwrap();
        }
    }
}

#[derive(Default)]
pub struct CountingWaker {
    wakes: AtomicUsize,
}

impl CountingWaker {
    pub fn count(&self) -> usize {
        self.wakes.load(Ordering::SeqCst)
    }

    /// Spins until `expected` wakes have been seen.
    pub fn wait_for(&self, expected: usize, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while self.count() < expected {
            assert!(Instant::now() < deadline, "timed out waiting for {} wakes", expected);
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

impl UiWaker for CountingWaker {
    fn wake(&self) {
        self.wakes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeEntry {
    FolderGlyph,
    System(SystemIconIndex),
}

pub struct FakeImageList {
    pub size: IconSize,
    pub entries: Vec<FakeEntry>,
}

impl PrivateImageList for FakeImageList {
    fn handle(&self) -> ImageListHandle {
        ImageListHandle(0x1000)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Image repository that records every copy it performs.
pub struct FakeRepository {
    pub default_folder: SystemIconIndex,
    pub broken_icons: Vec<SystemIconIndex>,
    copies: Cell<usize>,
}

impl FakeRepository {
    pub fn new(default_folder: SystemIconIndex) -> Self {
        Self {
            default_folder,
            broken_icons: Vec::new(),
            copies: Cell::new(0),
        }
    }

    pub fn copies(&self) -> usize {
        self.copies.get()
    }
}

impl IconRepository for FakeRepository {
    type List = FakeImageList;

    fn create_list(&self, size: IconSize) -> Result<FakeImageList> {
        Ok(FakeImageList {
            size,
            entries: Vec::new(),
        })
    }

    fn default_folder_index(&self) -> Result<SystemIconIndex> {
        Ok(self.default_folder)
    }

    fn add_folder_glyph(&self, list: &mut FakeImageList) -> Result<PrivateIconIndex> {
        list.entries.push(FakeEntry::FolderGlyph);
        Ok(PrivateIconIndex(list.entries.len() as i32 - 1))
    }

    fn copy_icon(&self, list: &mut FakeImageList, index: SystemIconIndex) -> Result<PrivateIconIndex> {
        if self.broken_icons.contains(&index) {
            return Err(ShellError::binding("copy icon", format!("icon {} is unreadable", index.0)));
        }
        self.copies.set(self.copies.get() + 1);
        list.entries.push(FakeEntry::System(index));
        Ok(PrivateIconIndex(list.entries.len() as i32 - 1))
    }
}

/// Builds an identifier whose segments are the given ASCII names.
pub fn item_id(names: &[&str]) -> ShellItemId {
    let mut raw = Vec::new();
    for name in names {
        raw.extend_from_slice(&((name.len() + 2) as u16).to_le_bytes());
        raw.extend_from_slice(name.as_bytes());
    }
    raw.extend_from_slice(&[0, 0]);
    ShellItemId::from_bytes(&raw).unwrap()
}

/// Everything a scripted namespace was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceCall {
    BindToParent(ShellItemId),
    DataObject(Vec<ShellItemId>),
    Handlers,
    DefaultMenu {
        directory: ShellItemId,
        services: ServiceSet,
    },
    ManualMenu {
        directory: ShellItemId,
        services: ServiceSet,
    },
    ItemMenu {
        /// Directory of the folder the menu was requested from.
        folder: ShellItemId,
        selection: Vec<ShellItemId>,
        services: ServiceSet,
    },
    AddExtension(Clsid),
    Track(ScreenPoint, MenuOptions),
    Invoke(u32),
}

pub struct FakeFolder(pub ShellItemId);

pub struct FakeDataObject(pub Vec<ShellItemId>);

/// Namespace whose failures and menu choices are scripted by the test.
#[derive(Default)]
pub struct ScriptedNamespace {
    calls: Rc<RefCell<Vec<NamespaceCall>>>,
    children: HashMap<ShellItemId, Vec<ShellItemId>>,
    handlers: Vec<Clsid>,
    fail_bind: bool,
    fail_data_object: bool,
    fail_handler: Option<Clsid>,
    choice: Option<u32>,
    /// Children that show up in every directory once a command has run.
    created_on_invoke: Vec<ShellItemId>,
    invoked: Rc<Cell<bool>>,
    enumerations: Cell<usize>,
}

impl ScriptedNamespace {
    /// Binds everything, registers no handlers and has every menu dismissed.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn choosing(mut self, command: u32) -> Self {
        self.choice = Some(command);
        self
    }

    pub fn with_handlers(mut self, handlers: Vec<Clsid>) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_children(mut self, directory: ShellItemId, children: Vec<ShellItemId>) -> Self {
        self.children.insert(directory, children);
        self
    }

    pub fn creating_on_invoke(mut self, created: Vec<ShellItemId>) -> Self {
        self.created_on_invoke = created;
        self
    }

    pub fn failing_bind(mut self) -> Self {
        self.fail_bind = true;
        self
    }

    pub fn failing_data_object(mut self) -> Self {
        self.fail_data_object = true;
        self
    }

    pub fn failing_handler(mut self, handler: Clsid) -> Self {
        self.fail_handler = Some(handler);
        self
    }

    pub fn calls(&self) -> Vec<NamespaceCall> {
        self.calls.borrow().clone()
    }

    /// How many times a directory listing was requested.
    pub fn enumeration_count(&self) -> usize {
        self.enumerations.get()
    }

    fn record(&self, call: NamespaceCall) {
        self.calls.borrow_mut().push(call);
    }

    fn menu(&self) -> ScriptedMenu {
        ScriptedMenu {
            calls: self.calls.clone(),
            invoked: self.invoked.clone(),
            fail_handler: self.fail_handler,
            choice: self.choice,
        }
    }
}

pub struct ScriptedMenu {
    calls: Rc<RefCell<Vec<NamespaceCall>>>,
    invoked: Rc<Cell<bool>>,
    fail_handler: Option<Clsid>,
    choice: Option<u32>,
}

impl NativeMenu for ScriptedMenu {
    fn add_extension(&mut self, handler: &Clsid) -> Result<()> {
        self.calls.borrow_mut().push(NamespaceCall::AddExtension(*handler));
        if self.fail_handler == Some(*handler) {
            return Err(ShellError::binding("create extension", "class not registered"));
        }
        Ok(())
    }

    fn track(&mut self, anchor: ScreenPoint, options: MenuOptions) -> Result<Option<u32>> {
        self.calls.borrow_mut().push(NamespaceCall::Track(anchor, options));
        Ok(self.choice)
    }

    fn invoke(&mut self, command: u32) -> Result<()> {
        self.calls.borrow_mut().push(NamespaceCall::Invoke(command));
        self.invoked.set(true);
        Ok(())
    }
}

impl ShellNamespace for ScriptedNamespace {
    type Folder = FakeFolder;
    type DataObject = FakeDataObject;
    type Menu = ScriptedMenu;

    fn bind_to_parent_folder(&self, item: &ShellItemId) -> Result<FakeFolder> {
        self.record(NamespaceCall::BindToParent(item.clone()));
        if self.fail_bind {
            return Err(ShellError::binding("bind to parent", "access denied"));
        }
        let parent = item
            .parent()
            .ok_or_else(|| ShellError::binding("bind to parent", "desktop has no parent"))?;
        Ok(FakeFolder(parent))
    }

    fn data_object_for_children(
        &self,
        _folder: &FakeFolder,
        children: &[ShellItemId],
    ) -> Result<FakeDataObject> {
        self.record(NamespaceCall::DataObject(children.to_vec()));
        if self.fail_data_object {
            return Err(ShellError::binding("get data object", "no such interface"));
        }
        Ok(FakeDataObject(children.to_vec()))
    }

    fn enumerate_children(&self, item: &ShellItemId) -> Result<Vec<ShellItemId>> {
        self.enumerations.set(self.enumerations.get() + 1);
        let mut children = self.children.get(item).cloned().unwrap_or_default();
        if self.invoked.get() {
            children.extend(self.created_on_invoke.iter().cloned());
        }
        Ok(children)
    }

    fn background_handlers(&self) -> Result<Vec<Clsid>> {
        self.record(NamespaceCall::Handlers);
        Ok(self.handlers.clone())
    }

    fn default_menu(&self, directory: &ShellItemId, services: &ServiceSet) -> Result<ScriptedMenu> {
        self.record(NamespaceCall::DefaultMenu {
            directory: directory.clone(),
            services: services.clone(),
        });
        Ok(self.menu())
    }

    fn manual_menu(
        &self,
        directory: &ShellItemId,
        _data: FakeDataObject,
        services: &ServiceSet,
    ) -> Result<ScriptedMenu> {
        self.record(NamespaceCall::ManualMenu {
            directory: directory.clone(),
            services: services.clone(),
        });
        Ok(self.menu())
    }

    fn item_menu(
        &self,
        _directory: &ShellItemId,
        folder: &FakeFolder,
        selection: &[ShellItemId],
        services: &ServiceSet,
    ) -> Result<ScriptedMenu> {
        self.record(NamespaceCall::ItemMenu {
            folder: folder.0.clone(),
            selection: selection.to_vec(),
            services: services.clone(),
        });
        Ok(self.menu())
    }
}

//! Native shell context menus for a directory or a selection inside it.
//!
//! The shell object model is reached through [`ShellNamespace`]. How a menu
//! is put together depends on what the running OS supports, and that choice is
//! made once, when the [`ContextMenuLayer`] is created.

mod block_list;
mod strategy;

pub use block_list::{BlockList, CLSID_NEW_MENU};
pub use strategy::{LegacyMenuStrategy, MenuStrategy, ModernMenuStrategy};

use crate::error::Result;
use crate::ids::{Clsid, ScreenPoint, ShellItemId};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuKind {
    /// Nothing selected: the menu is for the directory itself.
    Background,
    Items,
}

impl MenuKind {
    pub fn for_selection(selection: &[ShellItemId]) -> Self {
        if selection.is_empty() {
            MenuKind::Background
        } else {
            MenuKind::Items
        }
    }
}

/// Which menu construction path the running OS supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsCapability {
    /// Windows 8 and later: default menu with a site service provider.
    Modern,
    /// Earlier versions: menu assembled by hand from a data object.
    Legacy,
}

/// A service the menu's site offers to shell extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellService {
    /// Supplies the "New" submenu and selects what it creates.
    NewMenuClient,
    /// Folder view adapter for the given directory.
    FolderView(ShellItemId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceSet {
    services: Vec<ShellService>,
}

impl ServiceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, service: ShellService) {
        if !self.services.contains(&service) {
            self.services.push(service);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShellService> {
        self.services.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn has_new_menu_client(&self) -> bool {
        self.services.contains(&ShellService::NewMenuClient)
    }

    pub fn folder_view(&self) -> Option<&ShellItemId> {
        self.services.iter().find_map(|service| match service {
            ShellService::FolderView(directory) => Some(directory),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MenuOptions {
    /// Include verbs the shell normally shows only with Shift held.
    pub extended_verbs: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuOutcome {
    /// The menu could not be built. Nothing was displayed.
    NotShown,
    Dismissed,
    Invoked {
        command: u32,
        /// Items that appeared in the directory as a result, e.g. through
        /// the "New" submenu.
        created: Vec<ShellItemId>,
    },
}

/// The shell namespace as seen by the menu layer.
pub trait ShellNamespace {
    type Folder;
    type DataObject;
    type Menu: NativeMenu;

    /// Binds to the folder that contains `item`.
    fn bind_to_parent_folder(&self, item: &ShellItemId) -> Result<Self::Folder>;

    /// Data object describing `children` (single-level identifiers) of
    /// `folder`.
    fn data_object_for_children(
        &self,
        folder: &Self::Folder,
        children: &[ShellItemId],
    ) -> Result<Self::DataObject>;

    /// Single-level identifiers of everything directly inside `item`.
    fn enumerate_children(&self, item: &ShellItemId) -> Result<Vec<ShellItemId>>;

    /// Context menu extension handlers registered for directory backgrounds.
    fn background_handlers(&self) -> Result<Vec<Clsid>>;

    /// The shell's default menu for the background of `directory`, sited on
    /// `services`. Registered extensions are not loaded automatically.
    fn default_menu(&self, directory: &ShellItemId, services: &ServiceSet) -> Result<Self::Menu>;

    /// A menu assembled by hand around `data`.
    fn manual_menu(
        &self,
        directory: &ShellItemId,
        data: Self::DataObject,
        services: &ServiceSet,
    ) -> Result<Self::Menu>;

    /// The folder's own menu for `selection`, with the verbs and handlers the
    /// shell registers for those item types.
    fn item_menu(
        &self,
        directory: &ShellItemId,
        folder: &Self::Folder,
        selection: &[ShellItemId],
        services: &ServiceSet,
    ) -> Result<Self::Menu>;
}

pub trait NativeMenu {
    /// Loads one extension handler into the menu.
    fn add_extension(&mut self, handler: &Clsid) -> Result<()>;

    /// Displays the menu and blocks until it is dismissed. Returns the chosen
    /// command, if any.
    fn track(&mut self, anchor: ScreenPoint, options: MenuOptions) -> Result<Option<u32>>;

    fn invoke(&mut self, command: u32) -> Result<()>;
}

/// Shows native context menus using the strategy picked for this OS.
pub struct ContextMenuLayer<N: ShellNamespace> {
    namespace: N,
    strategy: Box<dyn MenuStrategy<N>>,
}

impl<N: ShellNamespace> ContextMenuLayer<N> {
    pub fn new(namespace: N, capability: OsCapability) -> Self {
        let strategy: Box<dyn MenuStrategy<N>> = match capability {
            OsCapability::Modern => Box::new(ModernMenuStrategy),
            OsCapability::Legacy => Box::new(LegacyMenuStrategy),
        };
        tracing::debug!(target: "context_menu", "Using {} context menu strategy", strategy.name());
        Self {
            namespace,
            strategy,
        }
    }

    pub fn namespace(&self) -> &N {
        &self.namespace
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Shows the menu for `selection` (single-level identifiers inside
    /// `target_directory`), or for the directory itself when nothing is
    /// selected. Failures are logged and never reach the caller.
    pub fn show_menu(
        &self,
        target_directory: &ShellItemId,
        selection: &[ShellItemId],
        anchor: ScreenPoint,
        blocked: &BlockList,
    ) -> MenuOutcome {
        self.show_menu_with_options(target_directory, selection, anchor, blocked, MenuOptions::default())
    }

    pub fn show_menu_with_options(
        &self,
        target_directory: &ShellItemId,
        selection: &[ShellItemId],
        anchor: ScreenPoint,
        blocked: &BlockList,
        options: MenuOptions,
    ) -> MenuOutcome {
        let mut menu = match self.strategy.build_menu(&self.namespace, target_directory, selection, blocked) {
            Ok(menu) => menu,
            Err(e) => {
                tracing::debug!(target: "context_menu", "Context menu not shown: {}", e);
                return MenuOutcome::NotShown;
            }
        };

        let command = match menu.track(anchor, options) {
            Ok(Some(command)) => command,
            Ok(None) => return MenuOutcome::Dismissed,
            Err(e) => {
                tracing::debug!(target: "context_menu", "Context menu tracking failed: {}", e);
                return MenuOutcome::Dismissed;
            }
        };

        // Only the background menu can create items. The directory is read
        // once a command is chosen, never for a dismissed menu.
        let before = match MenuKind::for_selection(selection) {
            MenuKind::Background => Some(self.snapshot_children(target_directory)),
            MenuKind::Items => None,
        };

        if let Err(e) = menu.invoke(command) {
            tracing::debug!(target: "context_menu", "Context menu command {} failed: {}", command, e);
            return MenuOutcome::Dismissed;
        }

        let created = match before {
            Some(before) => self
                .snapshot_children(target_directory)
                .into_iter()
                .filter(|child| !before.contains(child))
                .collect(),
            None => Vec::new(),
        };

        MenuOutcome::Invoked { command, created }
    }

    fn snapshot_children(&self, directory: &ShellItemId) -> HashSet<ShellItemId> {
        match self.namespace.enumerate_children(directory) {
            Ok(children) => children.into_iter().collect(),
            Err(e) => {
                tracing::debug!(target: "context_menu", "Could not enumerate directory: {}", e);
                HashSet::new()
            }
        }
    }
}

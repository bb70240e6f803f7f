use super::{BlockList, NativeMenu, ServiceSet, ShellNamespace, ShellService};
use crate::error::{Result, ShellError};
use crate::ids::ShellItemId;

/// One way of building a native context menu.
pub trait MenuStrategy<N: ShellNamespace> {
    fn name(&self) -> &'static str;

    fn build_menu(
        &self,
        namespace: &N,
        directory: &ShellItemId,
        selection: &[ShellItemId],
        blocked: &BlockList,
    ) -> Result<N::Menu>;
}

/// Asks the shell for its default background menu and sites it on a service
/// provider offering the new-item client and a folder view of `directory`.
pub struct ModernMenuStrategy;

impl<N: ShellNamespace> MenuStrategy<N> for ModernMenuStrategy {
    fn name(&self) -> &'static str {
        "modern"
    }

    fn build_menu(
        &self,
        namespace: &N,
        directory: &ShellItemId,
        selection: &[ShellItemId],
        blocked: &BlockList,
    ) -> Result<N::Menu> {
        check_selection(selection)?;
        if !selection.is_empty() {
            return build_item_menu(namespace, directory, selection);
        }

        let mut services = ServiceSet::new();
        services.register(ShellService::NewMenuClient);
        services.register(ShellService::FolderView(directory.clone()));

        let mut menu = namespace.default_menu(directory, &services)?;
        add_allowed_extensions(namespace, &mut menu, blocked)?;
        Ok(menu)
    }
}

/// Binds to the directory's parent by hand, asks it for a data object
/// describing the directory and assembles the background menu around that.
pub struct LegacyMenuStrategy;

impl<N: ShellNamespace> MenuStrategy<N> for LegacyMenuStrategy {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn build_menu(
        &self,
        namespace: &N,
        directory: &ShellItemId,
        selection: &[ShellItemId],
        blocked: &BlockList,
    ) -> Result<N::Menu> {
        check_selection(selection)?;
        if !selection.is_empty() {
            return build_item_menu(namespace, directory, selection);
        }

        // The directory is the single item, inside its parent
        let child = directory
            .last_segment()
            .ok_or_else(|| ShellError::binding("bind to parent folder", "the desktop has no parent"))?;
        let folder = namespace.bind_to_parent_folder(directory)?;
        let data = namespace.data_object_for_children(&folder, &[child])?;

        let mut services = ServiceSet::new();
        services.register(ShellService::NewMenuClient);

        let mut menu = namespace.manual_menu(directory, data, &services)?;
        add_allowed_extensions(namespace, &mut menu, blocked)?;
        Ok(menu)
    }
}

fn check_selection(selection: &[ShellItemId]) -> Result<()> {
    if selection.iter().any(|item| item.segments().count() != 1) {
        return Err(ShellError::binding(
            "resolve selection",
            "selected items must be direct children of the directory",
        ));
    }
    Ok(())
}

/// Item menus come from the containing folder on every OS. The folder picks
/// the verbs and handlers for the selected types itself, so nothing is
/// loaded on top and no site is offered.
fn build_item_menu<N: ShellNamespace>(
    namespace: &N,
    directory: &ShellItemId,
    selection: &[ShellItemId],
) -> Result<N::Menu> {
    let first = selection
        .first()
        .ok_or_else(|| ShellError::binding("resolve selection", "nothing selected"))?;
    let folder = namespace.bind_to_parent_folder(&directory.join(first))?;
    namespace.item_menu(directory, &folder, selection, &ServiceSet::new())
}

/// Loads every registered background extension that is not blocked. An
/// extension that fails to load is skipped, the rest of the menu still works.
fn add_allowed_extensions<N: ShellNamespace>(namespace: &N, menu: &mut N::Menu, blocked: &BlockList) -> Result<()> {
    for handler in blocked.allowed(namespace.background_handlers()?) {
        if let Err(e) = menu.add_extension(&handler) {
            tracing::debug!(target: "context_menu", "Skipping extension {}: {}", handler, e);
        }
    }
    Ok(())
}

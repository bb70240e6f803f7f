use shellbridge::config::{get_config_dir, load_config, write_default_config, AppConfig};
use shellbridge::logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let config = load_config();

    let log_dir = get_config_dir()
        .map(|dir| dir.join("logs"))
        .unwrap_or_else(|_| PathBuf::from("logs"));
    let _log_guard = match init_logging(LogConfig::new(log_dir, &config.log_level)) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    if let Err(e) = write_default_config() {
        tracing::warn!(target: "main", "Could not write default config: {}", e);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    match host::run(&config, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(target: "main", "{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(windows)]
mod host {
    use super::AppConfig;
    use shellbridge::bookmark_icons::BookmarkIconManager;
    use shellbridge::context::ShellContext;
    use shellbridge::context_menu::{ContextMenuLayer, MenuOptions, MenuOutcome};
    use shellbridge::ids::{ScreenPoint, ShellItemId};
    use shellbridge::win32::{
        detect_os_capability, is_shift_down, item_id_from_path, ComGuard, HostWindow, ShellIconResolver,
        SystemIconRepository, Win32Namespace,
    };
    use shellbridge::{Result, ShellError};
    use std::sync::Arc;
    use windows::Win32::{Foundation::POINT, UI::WindowsAndMessaging::GetCursorPos};

    pub fn run(config: &AppConfig, args: &[String]) -> Result<()> {
        let _com = ComGuard::new()?;
        let window = HostWindow::create()?;

        match args.split_first() {
            None => load_bookmark_icons(&window, config),
            Some((command, rest)) if command == "menu" => show_menu(&window, config, rest),
            Some((command, _)) => Err(ShellError::binding(
                "parse arguments",
                format!("unknown command {:?}, expected \"menu <dir> [name...]\"", command),
            )),
        }
    }

    fn load_bookmark_icons(window: &HostWindow, config: &AppConfig) -> Result<()> {
        let context = ShellContext::new(
            SystemIconRepository::new()?,
            Arc::new(ShellIconResolver),
            Arc::new(window.waker()),
            config,
        )?;
        window.attach_fetcher(&context.icon_fetcher);

        let manager: BookmarkIconManager<SystemIconRepository> = context.bookmark_icon_manager(config.icon_size)?;
        tracing::info!(
            target: "main",
            "Bookmark image list {:?}: folder glyph {}, default icon {}",
            manager.image_list(),
            manager.folder_icon_index().0,
            manager.default_icon_index().0
        );

        for item in config.bookmarks.iter().flat_map(|root| root.walk()) {
            let name = item.name().to_string();
            let immediate = manager.get_bookmark_item_icon_index(
                item,
                Some(Box::new(move |index| {
                    tracing::info!(target: "main", "{}: resolved to icon {}", name, index.0);
                })),
            );
            tracing::info!(target: "main", "{}: showing icon {}", item.name(), immediate.0);
        }

        let fetcher = context.icon_fetcher.clone();
        window.run_until(|| fetcher.pending_count() == 0);
        tracing::info!(target: "main", "{} icons in the bookmark image list", manager.icon_count());
        Ok(())
    }

    fn show_menu(window: &HostWindow, config: &AppConfig, args: &[String]) -> Result<()> {
        let (directory_path, names) = args
            .split_first()
            .ok_or_else(|| ShellError::binding("parse arguments", "menu needs a directory"))?;
        let directory = item_id_from_path(directory_path)?;
        let selection = names
            .iter()
            .map(|name| child_of(directory_path, name))
            .collect::<Result<Vec<_>>>()?;

        let mut cursor = POINT::default();
        unsafe { GetCursorPos(&mut cursor)? };
        let options = MenuOptions {
            extended_verbs: is_shift_down(),
        };

        let layer = ContextMenuLayer::new(Win32Namespace::new(window.hwnd()), detect_os_capability());
        let outcome = layer.show_menu_with_options(
            &directory,
            &selection,
            ScreenPoint::new(cursor.x, cursor.y),
            &config.block_list(),
            options,
        );

        match outcome {
            MenuOutcome::NotShown => tracing::warn!(target: "main", "No context menu for {}", directory_path),
            MenuOutcome::Dismissed => tracing::info!(target: "main", "Menu dismissed"),
            MenuOutcome::Invoked { command, created } => {
                tracing::info!(target: "main", "Invoked command {}, {} new items", command, created.len())
            }
        }
        Ok(())
    }

    fn child_of(directory: &str, name: &str) -> Result<ShellItemId> {
        let path = format!("{}\\{}", directory.trim_end_matches(['\\', '/']), name);
        item_id_from_path(&path)?
            .last_segment()
            .ok_or_else(|| ShellError::binding("parse arguments", format!("{} is not inside a folder", path)))
    }
}

#[cfg(not(windows))]
mod host {
    use super::AppConfig;
    use shellbridge::{Result, ShellError};

    pub fn run(_config: &AppConfig, _args: &[String]) -> Result<()> {
        Err(ShellError::binding("start host", "the shell host requires Windows"))
    }
}

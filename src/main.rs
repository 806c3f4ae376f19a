use anyhow::{anyhow, Context, Result};
use crossterm::style::Stylize;
use reedline::{
    default_emacs_keybindings, ColumnarMenu, Emacs, FileBackedHistory, KeyCode, KeyModifiers,
    MenuBuilder, Prompt, PromptEditMode, PromptHistorySearch, PromptHistorySearchStatus, Reedline,
    ReedlineEvent, ReedlineMenu, Signal,
};
use sheet_browser::api_client::ApiClient;
use sheet_browser::config::Config;
use sheet_browser::notify::NoticeLog;
use sheet_browser::services::BrowserSession;
use sheet_browser::utils::app_paths::AppPaths;
use sheet_browser::utils::logging::init_tracing;
use std::borrow::Cow;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::LocalSet;
use tracing::{info, warn};

mod completer;
mod repl;
mod table_display;

use completer::CommandCompleter;
use repl::{Flow, Repl};

/// Longest a command waits for its requests before the prompt comes back
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

struct SheetPrompt;

impl Prompt for SheetPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Borrowed("sheets")
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, edit_mode: PromptEditMode) -> Cow<'_, str> {
        match edit_mode {
            PromptEditMode::Default | PromptEditMode::Emacs => "> ".into(),
            PromptEditMode::Vi(vi_mode) => match vi_mode {
                reedline::PromptViMode::Normal => "N> ".into(),
                reedline::PromptViMode::Insert => "I> ".into(),
            },
            PromptEditMode::Custom(str) => format!("{str}> ").into(),
        }
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("... ")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };
        Cow::Owned(format!(
            "({}reverse search: {})",
            prefix, history_search.term
        ))
    }
}

fn generate_config() -> Result<()> {
    let path = Config::get_config_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Error creating config directory {}", parent.display()))?;
    }
    std::fs::write(&path, Config::create_default_with_comments())
        .with_context(|| format!("Error writing config file {}", path.display()))?;
    println!("Configuration file created at: {}", path.display());
    Ok(())
}

fn line_editor(table_names: Arc<Mutex<Vec<String>>>) -> Result<Reedline> {
    let completion_menu = Box::new(
        ColumnarMenu::default()
            .with_name("command_completion")
            .with_columns(1)
            .with_column_width(None)
            .with_column_padding(2),
    );

    let mut keybindings = default_emacs_keybindings();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::Menu("command_completion".to_string()),
    );

    let mut editor = Reedline::create()
        .with_completer(Box::new(CommandCompleter::new(table_names)))
        .with_menu(ReedlineMenu::EngineCompleter(completion_menu))
        .with_edit_mode(Box::new(Emacs::new(keybindings)));

    match AppPaths::history_file() {
        Ok(history_file) => {
            let history = FileBackedHistory::with_file(500, history_file)
                .map_err(|e| anyhow!("Error configuring history: {e}"))?;
            editor = editor.with_history(Box::new(history));
        }
        Err(e) => warn!(target: "app", "Command history disabled: {}", e),
    }
    Ok(editor)
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        repl::print_help();
        return Ok(());
    }
    if args.iter().any(|a| a == "--generate-config") {
        return generate_config();
    }

    let config = Config::load()?;
    init_tracing(&config.logging.level);
    info!(target: "app", "Using table service at {}", config.server.base_url);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let local = LocalSet::new();

    let client = ApiClient::new(&config.server.base_url, config.server.timeout())?;
    let notices = Rc::new(NoticeLog::new());
    let session = BrowserSession::new(Rc::new(client), notices.clone(), &config);

    let table_names = Arc::new(Mutex::new(Vec::new()));
    let repl = Repl::new(session, notices, SETTLE_TIMEOUT, Arc::clone(&table_names));
    let mut editor = line_editor(table_names)?;

    println!(
        "{}",
        format!("Connected to API: {}", config.server.base_url).cyan()
    );
    println!("{}", "Type 'help' for a list of commands".dark_grey());
    runtime.block_on(local.run_until(repl.start()));

    let prompt = SheetPrompt;
    loop {
        match editor.read_line(&prompt)? {
            Signal::Success(buffer) => {
                if buffer.trim().is_empty() {
                    continue;
                }
                // Background tasks only advance while the LocalSet is driven
                let flow = runtime.block_on(local.run_until(repl.run_line(&buffer)));
                if flow == Flow::Exit {
                    break;
                }
            }
            Signal::CtrlD | Signal::CtrlC => break,
        }
    }

    println!("\nGoodbye!");
    Ok(())
}

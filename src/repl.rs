//! Command parsing and execution for the interactive prompt

use crate::table_display;
use anyhow::{anyhow, bail, Result};
use crossterm::style::Stylize;
use serde_json::Value;
use sheet_browser::api_client::{ExportFormat, RowData};
use sheet_browser::notify::NoticeLog;
use sheet_browser::services::BrowserSession;
use sheet_browser::utils::app_paths::AppPaths;
use sheet_browser::utils::logging::get_log_buffer;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Command names with a short description, in help order
pub const COMMANDS: &[(&str, &str)] = &[
    ("tables", "List tables"),
    ("open", "Open a table at page 1"),
    ("page", "Go to a page of the open table"),
    ("next", "Next page"),
    ("prev", "Previous page"),
    ("find", "Search inside the open table"),
    ("search", "Search all tables"),
    ("filter", "Narrow the search results"),
    ("clear", "Clear the search"),
    ("select", "Toggle rows on the current page"),
    ("select-all", "Select or unselect every row on the page"),
    ("selected", "Show the selected rows"),
    ("clear-selection", "Unselect all rows"),
    ("export-selected", "Write the selected rows to a CSV file"),
    ("rename", "Rename a table"),
    ("delete", "Delete a table"),
    ("update", "Update a row of the open table"),
    ("upload", "Upload an .xlsx, .xls or .csv file"),
    ("export", "Download a table as xlsx or csv"),
    ("logs", "Show recent log entries"),
    ("help", "Show this help"),
    ("quit", "Exit"),
];

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Tables,
    Open(String),
    Page(usize),
    Next,
    Prev,
    Find(String),
    Search(String),
    Filter(String),
    Clear,
    Select(Vec<String>),
    SelectAll,
    Selected,
    ClearSelection,
    ExportSelected(PathBuf),
    Rename { old_name: String, new_name: String },
    Delete(String),
    Update { id: String, changes: Vec<(String, String)> },
    Upload(PathBuf),
    Export { table: String, format: ExportFormat, dest: Option<PathBuf> },
    Logs(usize),
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let args: Vec<&str> = rest.split_whitespace().collect();

        let command = match name {
            "tables" | "ls" => Command::Tables,
            "open" => Command::Open(required(rest, "open <table>")?),
            "page" => Command::Page(
                rest.parse()
                    .map_err(|_| anyhow!("Usage: page <number>"))?,
            ),
            "next" | "n" => Command::Next,
            "prev" | "p" => Command::Prev,
            "find" => Command::Find(rest.to_string()),
            // The query goes out exactly as typed after the command name
            "search" | "/" => Command::Search(text_after(line, name)),
            "filter" => Command::Filter(text_after(line, name)),
            "clear" => Command::Clear,
            "select" => {
                if args.is_empty() {
                    bail!("Usage: select <id> [<id> ...]");
                }
                Command::Select(args.iter().map(|s| s.to_string()).collect())
            }
            "select-all" => Command::SelectAll,
            "selected" => Command::Selected,
            "clear-selection" => Command::ClearSelection,
            "export-selected" => {
                Command::ExportSelected(PathBuf::from(required(rest, "export-selected <file.csv>")?))
            }
            "rename" => match args.as_slice() {
                [old_name, new_name] => Command::Rename {
                    old_name: old_name.to_string(),
                    new_name: new_name.to_string(),
                },
                _ => bail!("Usage: rename <table> <new name>"),
            },
            "delete" => Command::Delete(required(rest, "delete <table>")?),
            "update" => parse_update(&args)?,
            "upload" => Command::Upload(PathBuf::from(required(rest, "upload <file>")?)),
            "export" => match args.as_slice() {
                [table] => Command::Export {
                    table: table.to_string(),
                    format: ExportFormat::default(),
                    dest: None,
                },
                [table, format] => Command::Export {
                    table: table.to_string(),
                    format: format.parse()?,
                    dest: None,
                },
                [table, format, dest] => Command::Export {
                    table: table.to_string(),
                    format: format.parse()?,
                    dest: Some(PathBuf::from(dest)),
                },
                _ => bail!("Usage: export <table> [xlsx|csv] [destination]"),
            },
            "logs" => Command::Logs(if rest.is_empty() {
                20
            } else {
                rest.parse().map_err(|_| anyhow!("Usage: logs [count]"))?
            }),
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => bail!("Unknown command '{other}'. Type 'help' for a list of commands"),
        };
        Ok(command)
    }
}

/// Everything after the command name and its single separating whitespace
fn text_after(line: &str, name: &str) -> String {
    let mut rest = line[name.len()..].chars();
    rest.next();
    rest.as_str().to_string()
}

fn required(rest: &str, usage: &str) -> Result<String> {
    if rest.is_empty() {
        bail!("Usage: {usage}");
    }
    Ok(rest.to_string())
}

/// `update <id> column=value [column=value ...]`
fn parse_update(args: &[&str]) -> Result<Command> {
    let Some((id, assignments)) = args.split_first() else {
        bail!("Usage: update <id> <column>=<value> ...");
    };
    if assignments.is_empty() {
        bail!("Usage: update <id> <column>=<value> ...");
    }
    let changes = assignments
        .iter()
        .map(|a| {
            a.split_once('=')
                .map(|(column, value)| (column.to_string(), value.to_string()))
                .ok_or_else(|| anyhow!("Expected <column>=<value>, got '{a}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Command::Update {
        id: id.to_string(),
        changes,
    })
}

pub fn print_help() {
    println!("{}", "Sheet Browser - spreadsheet tables on a remote service".blue().bold());
    println!();
    println!("{}", "Usage:".yellow());
    println!("  sheet-browser [--generate-config] [--help]");
    println!();
    println!("{}", "Commands:".yellow());
    for (name, description) in COMMANDS {
        println!("  {} - {}", format!("{name:<16}").green(), description);
    }
    println!();
    println!("{}", "Examples:".yellow());
    println!("  search acme");
    println!("  filter acme corp");
    println!("  open Orders");
    println!("  update 12 status=shipped qty=3");
    println!("  export Orders csv ./orders.csv");
    println!();
}

/// Runs commands against the session and renders the outcome
pub struct Repl {
    session: BrowserSession,
    notices: std::rc::Rc<NoticeLog>,
    settle_timeout: Duration,
    table_names: Arc<Mutex<Vec<String>>>,
}

/// What the prompt loop should do after a command
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

impl Repl {
    pub fn new(
        session: BrowserSession,
        notices: std::rc::Rc<NoticeLog>,
        settle_timeout: Duration,
        table_names: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        Self {
            session,
            notices,
            settle_timeout,
            table_names,
        }
    }

    pub async fn start(&self) {
        self.session.start().await;
        self.sync_table_names();
        self.flush_notices();
        table_display::display_tables(&self.session.catalog().tables());
    }

    pub async fn run_line(&self, line: &str) -> Flow {
        let flow = match Command::parse(line) {
            Ok(command) => self.execute(command).await,
            Err(e) => {
                eprintln!("{}", e.to_string().red());
                Flow::Continue
            }
        };
        self.sync_table_names();
        self.flush_notices();
        flow
    }

    async fn execute(&self, command: Command) -> Flow {
        let session = &self.session;
        match command {
            Command::Tables => {
                session.refresh_tables().await;
                table_display::display_tables(&session.catalog().tables());
            }
            Command::Open(name) => {
                session.open_table(&name);
                self.show_page().await;
            }
            Command::Page(n) => self.change_page(session.go_to_page(n)).await,
            Command::Next => self.change_page(session.next_page()).await,
            Command::Prev => self.change_page(session.previous_page()).await,
            Command::Find(term) => {
                if session.find_in_table(&term) {
                    self.show_page().await;
                } else {
                    eprintln!("{}", "Open a table first".yellow());
                }
            }
            Command::Search(query) => {
                if session.submit_search(&query) {
                    self.show_results().await;
                } else {
                    eprintln!("{}", "Usage: search <text>".yellow());
                }
            }
            Command::Filter(text) => {
                session.set_filter_text(&text);
                self.show_results().await;
            }
            Command::Clear => {
                session.clear_search();
                println!("{}", "Search cleared".dark_grey());
            }
            Command::Select(ids) => {
                for id in ids {
                    if !session.toggle_row(&id) {
                        eprintln!("{}", format!("Row {id} is not on this page").yellow());
                    }
                }
                self.print_selection_count();
            }
            Command::SelectAll => {
                session.select_all();
                self.print_selection_count();
            }
            Command::Selected => {
                let columns = session
                    .pagination()
                    .window()
                    .map(|w| w.columns.clone())
                    .unwrap_or_default();
                table_display::display_records(&columns, &session.selected_records());
            }
            Command::ClearSelection => {
                session.clear_selection();
                self.print_selection_count();
            }
            Command::ExportSelected(dest) => {
                if !session.export_selected(&dest) {
                    eprintln!("{}", "No rows selected".yellow());
                }
            }
            Command::Rename { old_name, new_name } => {
                if session.rename_table(&old_name, &new_name).await {
                    self.show_page().await;
                }
            }
            Command::Delete(name) => {
                session.delete_table(&name).await;
            }
            Command::Update { id, changes } => self.update_row(&id, changes).await,
            Command::Upload(path) => {
                session.upload(&path).await;
            }
            Command::Export {
                table,
                format,
                dest,
            } => {
                let dest = dest.unwrap_or_else(|| {
                    AppPaths::download_dir().join(format!("{table}.{format}"))
                });
                if session.export_table(&table, format, &dest).await {
                    println!("Saved to {}", dest.display());
                }
            }
            Command::Logs(count) => {
                let entries = get_log_buffer()
                    .map(|buffer| buffer.get_recent(count))
                    .unwrap_or_default();
                table_display::display_logs(&entries);
            }
            Command::Help => print_help(),
            Command::Quit => return Flow::Exit,
        }
        Flow::Continue
    }

    /// Merge the changes into the row as currently shown and send it
    async fn update_row(&self, id: &str, changes: Vec<(String, String)>) {
        let current = self
            .session
            .pagination()
            .window()
            .and_then(|w| w.records.iter().find(|r| r.id == id).map(|r| r.data.clone()));
        let Some(mut data): Option<RowData> = current else {
            eprintln!("{}", format!("Row {id} is not on this page").yellow());
            return;
        };
        for (column, value) in changes {
            data.insert(column, Value::String(value));
        }
        if self.session.update_row(id, &data).await {
            self.show_page().await;
        }
    }

    async fn change_page(&self, accepted: bool) {
        if accepted {
            self.show_page().await;
        } else {
            eprintln!("{}", "That page is not available".yellow());
        }
    }

    async fn settle(&self) {
        if !self.session.settle(self.settle_timeout).await {
            eprintln!("{}", "Still loading...".dark_grey());
        }
    }

    async fn show_page(&self) {
        self.settle().await;
        let pagination = self.session.pagination();
        match pagination.window() {
            Some(window) => table_display::display_page(
                &window,
                &self.session.selection().selection(),
                &pagination.strip(),
            ),
            None => println!("{}", "Select a table from the list: open <table>".dark_grey()),
        }
    }

    async fn show_results(&self) {
        self.settle().await;
        let session = self.session.search().session();
        table_display::display_groups(&self.session.grouped_results(), session.no_results_term());
    }

    fn print_selection_count(&self) {
        let selection = self.session.selection().selection();
        println!("{}", format!("{} selected rows", selection.len()).green());
    }

    fn flush_notices(&self) {
        for notice in self.notices.drain() {
            table_display::display_notice(&notice);
        }
    }

    fn sync_table_names(&self) {
        let names = self
            .session
            .catalog()
            .tables()
            .iter()
            .map(|t| t.name.clone())
            .collect();
        if let Ok(mut tables) = self.table_names.lock() {
            *tables = names;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_navigation() {
        assert_eq!(Command::parse("open Orders").unwrap(), Command::Open("Orders".into()));
        assert_eq!(Command::parse("page 3").unwrap(), Command::Page(3));
        assert_eq!(Command::parse(" next ").unwrap(), Command::Next);
        assert!(Command::parse("page three").is_err());
        assert!(Command::parse("open").is_err());
    }

    #[test]
    fn test_search_keeps_text_as_typed() {
        assert_eq!(
            Command::parse("search acme  corp").unwrap(),
            Command::Search("acme  corp".into())
        );
        assert_eq!(Command::parse("filter").unwrap(), Command::Filter(String::new()));
        assert_eq!(Command::parse("search").unwrap(), Command::Search(String::new()));
    }

    #[test]
    fn test_parse_update() {
        assert_eq!(
            Command::parse("update 12 status=shipped qty=3").unwrap(),
            Command::Update {
                id: "12".into(),
                changes: vec![
                    ("status".into(), "shipped".into()),
                    ("qty".into(), "3".into())
                ],
            }
        );
        assert!(Command::parse("update 12").is_err());
        assert!(Command::parse("update 12 status").is_err());
    }

    #[test]
    fn test_parse_export() {
        assert_eq!(
            Command::parse("export Orders").unwrap(),
            Command::Export {
                table: "Orders".into(),
                format: ExportFormat::Xlsx,
                dest: None
            }
        );
        assert_eq!(
            Command::parse("export Orders csv out.csv").unwrap(),
            Command::Export {
                table: "Orders".into(),
                format: ExportFormat::Csv,
                dest: Some(PathBuf::from("out.csv"))
            }
        );
        assert!(Command::parse("export Orders pdf").is_err());
    }

    #[test]
    fn test_unknown_command() {
        let err = Command::parse("frobnicate").unwrap_err();
        assert!(err.to_string().contains("frobnicate"));
    }
}

use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use crossterm::style::Stylize;
use sheet_browser::api_client::{Record, TableInfo};
use sheet_browser::core::pagination::PageWindow;
use sheet_browser::core::result_aggregator::ResultGroup;
use sheet_browser::core::selection::SelectionSet;
use sheet_browser::export::cell_text;
use sheet_browser::notify::{Notice, NoticeLevel};
use sheet_browser::utils::logging::LogEntry;

fn new_table(headers: impl IntoIterator<Item = String>) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
    );
    table
}

pub fn display_tables(tables: &[TableInfo]) {
    if tables.is_empty() {
        println!("{}", "No tables yet".yellow());
        println!("Start by uploading an Excel file: upload <path>");
        return;
    }

    let mut table = new_table(["Table", "Records", "Columns", "Created"].map(String::from));
    for info in tables {
        table.add_row(vec![
            info.name.clone(),
            info.record_count.to_string(),
            info.columns.len().to_string(),
            info.created_at.clone().unwrap_or_default(),
        ]);
    }
    println!("{table}");
}

/// Render one page; selected rows are marked in the first column
pub fn display_page(window: &PageWindow, selection: &SelectionSet, strip: &[usize]) {
    println!(
        "{} {}",
        window.table_name.clone().bold(),
        format!(
            "({} records • {} pages)",
            window.total_records, window.total_pages
        )
        .dark_grey()
    );
    if !window.search_term.is_empty() {
        println!("{}", format!("Filtered by '{}'", window.search_term).cyan());
    }

    if window.records.is_empty() {
        println!("{}", "No data in this table yet".yellow());
    } else {
        let headers = ["".to_string(), "id".to_string()]
            .into_iter()
            .chain(window.columns.iter().cloned());
        let mut table = new_table(headers);
        for record in &window.records {
            let marker = if selection.contains(&record.id) {
                Cell::new("✔").fg(Color::Green)
            } else {
                Cell::new("")
            };
            let mut row = vec![marker, Cell::new(&record.id).fg(Color::DarkGrey)];
            row.extend(
                window
                    .columns
                    .iter()
                    .map(|column| Cell::new(cell_text(record.data.get(column)))),
            );
            table.add_row(row);
        }
        println!("{table}");
    }

    if window.total_pages > 1 {
        let strip: Vec<String> = strip
            .iter()
            .map(|&n| {
                if n == window.page_number {
                    format!("[{n}]")
                } else {
                    n.to_string()
                }
            })
            .collect();
        println!(
            "Page {} of {}   {}",
            window.page_number,
            window.total_pages,
            strip.join(" ")
        );
    }
    if !selection.is_empty() {
        println!("{}", format!("{} selected rows", selection.len()).green());
    }
}

pub fn display_groups(groups: &[ResultGroup], no_results_term: Option<&str>) {
    if groups.is_empty() {
        println!("{}", "No search results found".yellow());
        if let Some(term) = no_results_term {
            println!("Search performed for: \"{term}\"");
            println!("{}", "Try a different search term".dark_grey());
        }
        return;
    }

    let total: usize = groups.iter().map(ResultGroup::count).sum();
    println!("{}", format!("Search Results ({total})").bold());
    for group in groups {
        println!();
        println!(
            "{} {}",
            format!("{} results in", group.count()).dark_grey(),
            group.table.clone().cyan().bold()
        );

        let mut columns: Vec<String> = Vec::new();
        for row in &group.rows {
            for key in row.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let mut table = new_table(columns.iter().cloned());
        for row in &group.rows {
            table.add_row(columns.iter().map(|c| cell_text(row.get(c))));
        }
        println!("{table}");
    }
}

pub fn display_records(columns: &[String], records: &[Record]) {
    if records.is_empty() {
        println!("{}", "No rows selected".yellow());
        return;
    }
    let headers = std::iter::once("id".to_string()).chain(columns.iter().cloned());
    let mut table = new_table(headers);
    for record in records {
        let mut row = vec![record.id.clone()];
        row.extend(columns.iter().map(|c| cell_text(record.data.get(c))));
        table.add_row(row);
    }
    println!("{table}");
}

pub fn display_notice(notice: &Notice) {
    match notice.level {
        NoticeLevel::Success => println!("{}", format!("✔ {notice}").green()),
        NoticeLevel::Info => println!("{}", format!("ℹ {notice}").blue()),
        NoticeLevel::Error => eprintln!("{}", format!("✘ {notice}").red()),
    }
}

pub fn display_logs(entries: &[LogEntry]) {
    if entries.is_empty() {
        println!("{}", "No log entries".dark_grey());
        return;
    }
    for entry in entries {
        let line = entry.format_for_display();
        match entry.level.as_str() {
            "ERROR" => println!("{}", line.red()),
            "WARN" => println!("{}", line.yellow()),
            "DEBUG" | "TRACE" => println!("{}", line.dark_grey()),
            _ => println!("{line}"),
        }
    }
}

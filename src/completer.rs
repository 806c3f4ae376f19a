use reedline::{Completer, Span, Suggestion};
use std::sync::{Arc, Mutex};

use crate::repl::COMMANDS;

/// Completes command names, and table names after commands that take one
pub struct CommandCompleter {
    tables: Arc<Mutex<Vec<String>>>,
}

impl CommandCompleter {
    pub fn new(tables: Arc<Mutex<Vec<String>>>) -> Self {
        Self { tables }
    }

    fn table_names(&self) -> Vec<String> {
        self.tables
            .lock()
            .map(|names| names.clone())
            .unwrap_or_default()
    }
}

fn takes_table(command: &str) -> bool {
    matches!(command, "open" | "delete" | "rename" | "export")
}

impl Completer for CommandCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        let input = &line[..pos];
        let partial = input
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or_default();
        let start = pos - partial.len();
        let words: Vec<&str> = input.split_whitespace().collect();

        let candidates: Vec<(String, &str)> = if start == input.len() - input.trim_start().len() {
            COMMANDS
                .iter()
                .map(|(name, description)| (name.to_string(), *description))
                .collect()
        } else if words.first().is_some_and(|c| takes_table(c))
            && (words.len() == 1 || (words.len() == 2 && !partial.is_empty()))
        {
            self.table_names()
                .into_iter()
                .map(|name| (name, "table"))
                .collect()
        } else {
            Vec::new()
        };

        candidates
            .into_iter()
            .filter(|(value, _)| value.starts_with(partial))
            .map(|(value, description)| Suggestion {
                value,
                description: Some(description.to_string()),
                extra: None,
                span: Span { start, end: pos },
                style: None,
                append_whitespace: true,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completer() -> CommandCompleter {
        CommandCompleter::new(Arc::new(Mutex::new(vec![
            "Orders".to_string(),
            "Clients".to_string(),
        ])))
    }

    #[test]
    fn test_completes_commands() {
        let values: Vec<String> = completer()
            .complete("sel", 3)
            .into_iter()
            .map(|s| s.value)
            .collect();
        assert_eq!(values, vec!["select", "select-all", "selected"]);
    }

    #[test]
    fn test_completes_table_names() {
        let suggestions = completer().complete("open Or", 7);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].value, "Orders");
        assert_eq!(suggestions[0].span, Span { start: 5, end: 7 });

        assert!(completer().complete("search Or", 9).is_empty());
    }
}

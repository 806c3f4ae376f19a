//! Groups global search results by the table they came from

use crate::api_client::{RowData, SearchResult};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ResultGroup {
    pub table: String,
    pub rows: Vec<RowData>,
}

impl ResultGroup {
    pub fn count(&self) -> usize {
        self.rows.len()
    }
}

/// One group per table, in the order tables first appear in `results`.
/// Rows keep their relative order within a group.
pub fn group(results: &[SearchResult]) -> Vec<ResultGroup> {
    let mut groups: Vec<ResultGroup> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for result in results {
        let slot = *index.entry(result.table.as_str()).or_insert_with(|| {
            groups.push(ResultGroup {
                table: result.table.clone(),
                rows: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].rows.push(result.data.clone());
    }

    groups
}

/// `(table, count)` for each group
pub fn summarize(groups: &[ResultGroup]) -> Vec<(String, usize)> {
    groups.iter().map(|g| (g.table.clone(), g.count())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::row;

    fn result(table: &str, n: usize) -> SearchResult {
        SearchResult {
            table: table.to_string(),
            data: row(&[("name", &format!("acme {n}"))]),
        }
    }

    #[test]
    fn test_groups_in_first_seen_order() {
        // 7 from Orders and 5 from Clients, interleaved
        let results: Vec<SearchResult> = (0..12)
            .map(|i| {
                if i % 2 == 0 || i == 11 {
                    result("Orders", i)
                } else {
                    result("Clients", i)
                }
            })
            .collect();

        let groups = group(&results);
        assert_eq!(
            summarize(&groups),
            vec![("Orders".to_string(), 7), ("Clients".to_string(), 5)]
        );
        assert_eq!(groups[0].rows[1]["name"], "acme 2");
        assert_eq!(groups[1].rows[0]["name"], "acme 1");
    }

    #[test]
    fn test_empty_results() {
        assert!(group(&[]).is_empty());
    }
}

//! Keep the best-covering test run for every function.

use std::collections::HashMap;

use crate::model::{FunctionKey, WorkItem};

/// Group items by function and keep the one with the most covered logs.
///
/// Groups come out in first-encounter order. Ties go to the earliest item.
pub fn deduplicate_by_log_coverage(items: Vec<WorkItem>) -> Vec<WorkItem> {
    let mut positions: HashMap<FunctionKey, usize> = HashMap::new();
    let mut best: Vec<WorkItem> = Vec::new();

    for item in items {
        let key = item.function_info.key();
        match positions.get(&key) {
            Some(&idx) => {
                if item.covered_log.len() > best[idx].covered_log.len() {
                    best[idx] = item;
                }
            }
            None => {
                positions.insert(key, best.len());
                best.push(item);
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CoveredLog, FunctionInfo, LineRange, LogStatementDetail};
    use std::path::PathBuf;

    fn item(name: &str, test: &str, count: usize) -> WorkItem {
        WorkItem {
            uuid: format!("{name}-{test}"),
            function_info: FunctionInfo {
                function_name: name.to_string(),
                function_position: PathBuf::from("/src/A.java"),
                function_lines: LineRange::new(1, 9),
                function_content: String::new(),
                function_content_without_logs: String::new(),
                log_details: vec![],
            },
            covered_log: (0..count)
                .map(|i| CoveredLog {
                    line_number: i as u32 + 1,
                    detail: LogStatementDetail {
                        statement: format!("log.info({i})"),
                        vars: vec![],
                    },
                })
                .collect(),
            unit_test: test.to_string(),
            execute_dir: PathBuf::from("/build"),
            function_content_without_covered_logs: String::new(),
            function_with_labeled_data: Some(String::new()),
        }
    }

    #[test]
    fn test_keeps_first_maximum() {
        let items = vec![
            item("f", "T1", 3),
            item("f", "T2", 5),
            item("f", "T3", 5),
            item("f", "T4", 1),
        ];
        let result = deduplicate_by_log_coverage(items);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].covered_log.len(), 5);
        assert_eq!(result[0].unit_test, "T2");
    }

    #[test]
    fn test_groups_keep_encounter_order() {
        let items = vec![item("g", "T1", 1), item("f", "T1", 1), item("g", "T2", 2)];
        let result = deduplicate_by_log_coverage(items);
        let names: Vec<_> = result
            .iter()
            .map(|i| i.function_info.function_name.as_str())
            .collect();
        assert_eq!(names, vec!["g", "f"]);
        assert_eq!(result[0].unit_test, "T2");
    }
}

//! Budget command implementation.

use segman_core::cache::FileHandleBudgetCache;
use segman_core::ManagerConfig;
use serde::Serialize;

/// File-handle budget report.
#[derive(Debug, Serialize)]
pub struct BudgetResult {
    /// Descriptor limit the budget is computed from.
    pub file_handle_limit: u64,
    /// Where the limit came from (`os` or `override`).
    pub limit_source: &'static str,
    /// File handles one persistent index holds.
    pub handles_per_index: usize,
    /// Persistent indexes that may be open at once.
    pub open_index_budget: usize,
}

/// Computes the budget a persistent local manager would use.
pub fn compute(
    max_file_handles: Option<u64>,
    handles_per_index: usize,
) -> Result<BudgetResult, Box<dyn std::error::Error>> {
    let mut config = ManagerConfig::new().handles_per_persistent_index(handles_per_index);
    if let Some(limit) = max_file_handles {
        config = config.max_file_handles(limit);
    }
    config.validate()?;

    let limit = config.file_handle_limit();
    let cache = FileHandleBudgetCache::from_limits(limit, handles_per_index)?;
    Ok(BudgetResult {
        file_handle_limit: limit,
        limit_source: if max_file_handles.is_some() {
            "override"
        } else {
            "os"
        },
        handles_per_index,
        open_index_budget: cache.budget(),
    })
}

/// Runs the budget command.
pub fn run(
    max_file_handles: Option<u64>,
    handles_per_index: usize,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = compute(max_file_handles, handles_per_index)?;
    tracing::debug!(budget = result.open_index_budget, "computed file handle budget");

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => {
            println!("File Handle Budget");
            println!("==================");
            println!();
            println!(
                "  Descriptor limit:     {} ({})",
                result.file_handle_limit, result.limit_source
            );
            println!("  Handles per index:    {}", result.handles_per_index);
            println!("  Open index budget:    {}", result.open_index_budget);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_from_override() {
        let result = compute(Some(10), 2).unwrap();
        assert_eq!(result.open_index_budget, 5);
        assert_eq!(result.limit_source, "override");
    }

    #[test]
    fn budget_below_one_index_fails() {
        assert!(compute(Some(3), 4).is_err());
        assert!(compute(Some(10), 0).is_err());
    }
}

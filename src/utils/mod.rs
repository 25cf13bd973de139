//! Common utilities and helpers

pub mod logging;
pub mod resource_budget;
pub mod time;

pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
pub use resource_budget::{
    BudgetConfig, BudgetSnapshot, BudgetThresholds, HostCapability, HostClass, IntermediateLease,
    ProbeLease, ResourceBudgetManager,
};
pub use time::{format_ticks, parse_decimal_seconds};

/// Percentage of `current` over `total`, in whole percent
pub fn percent(current: usize, total: usize) -> u32 {
    if total == 0 {
        100
    } else {
        (current.min(total) * 100 / total) as u32
    }
}

//! Services - scan cycle logic and filter state
//!
//! This module contains the core scanning services:
//! - `parser` - Detection record parsing
//! - `tag_filter` - Per-(antenna, tag) presence filter
//! - `filter_registry` - Staged filter method selection
//! - `change_detector` - Settled-set change detection per antenna
//! - `scanner` - Scan cycle orchestrator and its control handle

pub mod change_detector;
pub mod filter_registry;
pub mod parser;
pub mod scanner;
pub mod tag_filter;

// Re-export commonly used types
pub use filter_registry::{FilterRegistry, FilterTransition};
pub use scanner::{Scanner, ScannerHandle};
pub use tag_filter::TagFilter;

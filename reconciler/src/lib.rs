//! # reconciler
//!
//! Joins Cursor's per-workspace session index with its global record store
//! and turns the result into an efficiency report for one working session.
//!
//! Data flows in four steps:
//! - **Locate:** find the workspace identity for a project directory
//! - **Select:** pick the composer sessions active inside a time window
//! - **Aggregate:** fetch session and message records in two batched lookups
//! - **Measure:** reduce the aggregate to usage, token and adoption metrics
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use reconciler::{Reconciler, StorageRoots, TimeWindow};
//!
//! let reconciler = Reconciler::new(StorageRoots::detect());
//! let window = TimeWindow::new(Utc::now() - chrono::Duration::hours(1), Utc::now());
//! let result = reconciler.reconcile(std::path::Path::new("."), &window)?;
//! println!("{}", result.metrics.usage_amount);
//! # Ok::<(), reconciler::Error>(())
//! ```

pub use checkpoint::Checkpoint;
pub use config::EfficiencyConfig;
pub use error::{Error, Result};
pub use locator::StorageRoots;
pub use metrics::MetricsSummary;
pub use report::{Reconciler, Reconciliation, ReportInputs};
pub use types::*;
pub use vcs::{GitCli, VersionControl};

pub mod checkpoint;
pub mod collect;
pub mod config;
pub mod error;
pub mod legacy;
pub mod locator;
pub mod metrics;
pub mod parse;
pub mod records;
pub mod report;
pub mod sessions;
pub mod store;
pub mod types;
pub mod vcs;

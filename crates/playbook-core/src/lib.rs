pub mod config;
pub mod error;
pub mod funnel;
pub mod grid;
pub mod health;
pub mod insight;
pub mod io;
pub mod matrix;
pub mod metrics;
pub mod paths;
pub mod playbook;
pub mod quality;
pub mod report;
pub mod repository;
pub mod run;
pub mod snapshot;
pub mod timeline;
pub mod types;
pub mod window;

pub use error::{AnalyticsError, Result};

pub mod analytics;
pub mod config;
pub mod fetch;
pub mod init;
pub mod run;
pub mod serve;
pub mod view;

pub mod archive;
pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod install;
pub mod package;
pub mod runner;
pub mod runtime;

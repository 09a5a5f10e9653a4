pub mod action;
pub mod auth;
pub mod clear;
pub mod config;
mod context;
mod prompts;
pub mod run;
pub mod sync;
mod sync_ui;

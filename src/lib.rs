pub mod access;
pub mod access_levels;
pub mod aggregate;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod filters;
pub mod handover;
pub mod output;
pub mod validate;

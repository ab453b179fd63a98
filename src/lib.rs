pub mod aws;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod event;
pub mod functions;
pub mod handler;
pub mod introspect;
pub mod policy;
pub mod provision;
pub mod response;
pub mod secrets;
pub mod warehouse;

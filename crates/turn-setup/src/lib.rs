pub mod cmd;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod domain;
pub mod escalate;
pub mod files;
pub mod install;
pub mod net;
pub mod os;
pub mod prompt;
pub mod relay;
pub mod report;
pub mod swap;
pub mod tls;
pub mod turnconf;

pub mod actor;
pub mod backup;
pub mod catalog;
pub mod db;
pub mod decode;
pub mod error;
pub mod export;
pub mod import;
pub mod ipc;
pub mod logging;
pub mod marks;
pub mod payload;
pub mod replace;
pub mod sanitize;
pub mod store;

pub mod error;
pub mod imap;
pub mod logger;
pub mod mime;
pub mod rules;
pub mod scan;
pub mod settings;
pub mod store;
pub mod utils;

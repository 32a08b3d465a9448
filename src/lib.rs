pub mod applications;
pub mod attachments;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod form;
pub mod models;
pub mod routes;
pub mod schema;
pub mod state;
pub mod storage;
pub mod webdav;

pub mod app;
pub mod assets;
pub mod bag;
pub mod checkpoint;
pub mod config;
pub mod domain;
pub mod donor;
pub mod entity;
pub mod error;
pub mod formats;
pub mod http;
pub mod inventory;
pub mod manifest;
pub mod metadata;
pub mod output;
pub mod report;
pub mod search;
pub mod store;
pub mod uuid_api;

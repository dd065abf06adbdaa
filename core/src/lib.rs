pub mod adapter;
pub mod auth;
pub mod db;
pub mod diff;
pub mod lifecycle;
pub mod models;
pub mod ninjas;
pub mod service;

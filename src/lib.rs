pub mod api;
pub mod client;
pub mod config;
pub mod controller;
pub mod input;
pub mod models;
pub mod panel;
pub mod state;

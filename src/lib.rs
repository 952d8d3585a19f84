pub mod cache;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod dto;
pub mod entity;
pub mod error;
pub mod locks;
pub mod phone;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;

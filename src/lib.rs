//! Per-user notes and folders served over a small REST API.

pub mod auth;
pub mod config;
pub mod dto;
pub mod filter;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod scope;
pub mod service;

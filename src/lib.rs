//! Quill - A small blog platform backend
//!
//! This library provides token authentication, user registration and
//! sanitized blog post CRUD behind a JSON API.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;

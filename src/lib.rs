//! Quire: a small server-rendered blog backed by Postgres.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;

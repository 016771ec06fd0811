pub mod assessment;
pub mod canvas;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod extend;
pub mod jobs;
pub mod models;
pub mod refresh;
pub mod repo;
pub mod routes;
pub mod update;

#[cfg(test)]
mod test_support;

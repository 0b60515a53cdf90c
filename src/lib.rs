pub mod config;
pub mod db;
pub mod editor;
pub mod model;
pub mod ui;

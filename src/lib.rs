pub mod app;
pub mod capture;
pub mod color;
pub mod config;
pub mod connection;
pub mod device;
pub mod effect;
pub mod engine;
pub mod event;
pub mod filters;
pub mod link;
pub mod mode;
pub mod prefs;
pub mod protocol;
pub mod runtime;
pub mod terminal;
pub mod timers;

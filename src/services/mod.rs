// src/services/mod.rs
//
// Services Module - Orchestration Layer

pub mod history_service;

#[cfg(test)]
mod history_service_tests;

pub use history_service::{
    ContinueWatchingPage,
    HistoryConfig,
    HistoryService,
    RecordProgressRequest,
};

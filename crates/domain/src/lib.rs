//! Domain layer for the Guardian monitoring agent.
//!
//! This crate contains:
//! - Domain models (MonitoringPayload, AnalysisResult, RiskAlert, UploadStatus)
//! - Collaborator traits consumed by the upload scheduler
//! - The cycle error taxonomy

pub mod error;
pub mod models;
pub mod services;

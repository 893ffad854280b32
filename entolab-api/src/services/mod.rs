//! Service layer: external clients and domain workflows

pub mod annotation;
pub mod detector_client;
pub mod reconcile;
pub mod report;
pub mod storage;

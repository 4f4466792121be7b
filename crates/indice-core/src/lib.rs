pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod mapping;
pub mod model;
pub mod month;
pub mod normalize;
pub mod snapshot;

pub mod official;
pub mod publish;
pub mod reconcile;
pub mod tracker;

pub mod report;
pub mod storage;

// Tonescope: batched tone and hate-category classification for comments
//
// This is the library root. Each module corresponds to one stage of the
// classification pipeline or to the storage and display around it.

pub mod classifier;
pub mod config;
pub mod dataset;
pub mod db;
pub mod device;
pub mod labels;
pub mod output;
pub mod pipeline;
pub mod status;

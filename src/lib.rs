// Library for tests to access modules

pub mod aggregation;
pub mod config;
pub mod errors;
pub mod gcp;
pub mod models;
pub mod normalize;
pub mod output;
pub mod reader;
pub mod source;

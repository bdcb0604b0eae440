pub mod categorize;
pub mod cluster;
pub mod duplicate;
pub mod embedding;
pub mod exif;
pub mod hasher;
pub mod model;
pub mod pipeline;
pub mod scanner;

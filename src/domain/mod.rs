pub mod business;
pub mod classification;
pub mod code;
pub mod content;
pub mod deadline;
pub mod industry;
pub mod keyword;
pub mod taxonomy;
pub mod thresholds;

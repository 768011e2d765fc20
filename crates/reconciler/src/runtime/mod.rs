//! Runtime module - process lifecycle: logging, boot, one-shot run.

pub mod boot;
pub mod run;

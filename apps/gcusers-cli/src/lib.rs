//! gcusers - bulk user selection and update tool
//!
//! Selects directory users by email, name, role, group, location, skill and
//! more, then exports them or applies bulk role and ACD auto-answer updates.
//! The remote work is done by [`gcusers_engine`]; this crate handles
//! settings, input files, the post-selection filter and export files.

pub mod cli;
pub mod commands;
pub mod error;
pub mod export;
pub mod filter;
pub mod input;
pub mod logging;
pub mod settings;

#[macro_use]
extern crate log;

pub mod catalogue;
pub mod domain;
pub mod infrastructure;
pub mod utils;

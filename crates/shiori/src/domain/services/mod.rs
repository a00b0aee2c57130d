pub mod bookmark;
pub mod token;

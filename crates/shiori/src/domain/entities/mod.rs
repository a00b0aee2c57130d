pub mod bookmark;
pub mod credential;

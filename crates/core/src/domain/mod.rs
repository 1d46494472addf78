pub mod catalog;
pub mod content;
pub mod conversation;
pub mod item;

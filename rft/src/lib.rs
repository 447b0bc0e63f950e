//! The protocol itself: a sequence-number allocator, the sliding-window-backed sender and
//! receiver state machines, and the chunked file I/O that feeds and drains them.

pub mod constants;
mod file_io;
mod seq;

pub mod receiver;
pub mod sender;

pub use file_io::{FileReader, FileWriter};

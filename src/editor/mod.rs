mod buffer;

pub use buffer::*;

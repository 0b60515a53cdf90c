mod connection;
mod cursor;
mod error;
mod memory;
mod postgres;
mod value;

pub use connection::*;
pub use cursor::*;
pub use error::*;
pub use memory::*;
pub use value::*;

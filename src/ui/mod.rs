mod components;
mod dispatch;
mod frame;
mod panel;
mod table;
mod theme;
mod view;

pub use components::*;
pub use dispatch::*;
pub use frame::*;
pub use panel::*;
pub use table::*;
pub use theme::*;
pub use view::*;

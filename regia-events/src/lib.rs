pub mod bus;
pub mod event;
pub mod filters;
pub mod handlers;
pub mod persistence;

pub use bus::*;
pub use event::*;
pub use filters::*;
pub use handlers::*;
pub use persistence::*;

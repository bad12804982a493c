pub mod extract;
pub mod html;
pub mod json_feed;
pub mod parser;
pub mod xml;

pub use extract::*;
pub use html::*;
pub use json_feed::*;
pub use parser::*;
pub use xml::*;

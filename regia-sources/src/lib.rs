pub mod custom_feed;
pub mod dedup;
pub mod ecb;
pub mod factory;
pub mod fca;
pub mod sec_edgar;
pub mod source;
pub mod state;
pub mod web_scraping;

pub use custom_feed::*;
pub use dedup::*;
pub use ecb::*;
pub use factory::*;
pub use fca::*;
pub use sec_edgar::*;
pub use source::*;
pub use state::*;
pub use web_scraping::*;

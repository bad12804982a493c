pub mod knowledge_base;
pub mod postgres;
pub mod schema;
pub mod snapshot;
pub mod store;

pub use knowledge_base::*;
pub use postgres::*;
pub use snapshot::*;
pub use store::*;

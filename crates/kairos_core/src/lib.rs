pub mod api;
pub mod error;
pub mod geo;
pub mod ids;
pub mod model;
pub mod pagination;
pub mod parser;
pub mod payload;
pub mod query;
pub mod representation;
pub mod service;
pub mod time;

pub use api::*;
pub use error::{KairosError, KairosResult};
pub use geo::*;
pub use ids::*;
pub use model::*;
pub use pagination::*;
pub use parser::*;
pub use payload::*;
pub use query::*;
pub use representation::*;
pub use service::*;
pub use time::*;

pub mod error;
pub mod processing;
pub mod scanner;

pub use error::{QueryError, TargetParseError};
pub use scanner::{query_server, ModEntry, QueryConfig, ServerQueryResult, ServerVersion};
pub use scanner::targets::Target;

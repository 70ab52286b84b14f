pub mod cursor;
pub mod options;
pub mod page;
pub mod query;
pub mod record;
pub mod signature;
pub mod sort;

pub use cursor::*;
pub use options::*;
pub use page::*;
pub use query::*;
pub use record::*;
pub use signature::*;
pub use sort::*;

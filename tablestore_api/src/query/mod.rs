mod common;
pub use self::common::{Filter, Operator, Query, SortDirection};

mod select;
pub use self::select::SelectQuery;

mod delete;
pub use self::delete::DeleteQuery;

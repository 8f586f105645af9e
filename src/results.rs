mod cursor;
mod field;
mod row;

pub use cursor::ResultCursor;
pub use field::FieldInfo;
pub use row::{FetchedRow, ObjectRow};

mod col_type;
mod record;
mod value;

pub use col_type::ColType;
pub use record::Record;
pub use value::{
    datetime_to_string, promote_pair, string_to_datetime, Value,
};

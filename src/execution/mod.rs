mod context;
mod delete;
mod executor;
mod index_scan;
mod insert;
mod nested_loop_join;
mod projection;
mod query_manager;
mod seq_scan;
mod sort;
mod update;

pub use context::Context;
pub use delete::DeleteExecutor;
pub use executor::{
    col_value, eval_cond, eval_conds, find_col, find_col_idx, Executor,
};
pub use index_scan::IndexScanExecutor;
pub use insert::InsertExecutor;
pub use nested_loop_join::NestedLoopJoinExecutor;
pub use projection::ProjectionExecutor;
pub use query_manager::{QueryManager, QueryResult};
pub use seq_scan::SeqScanExecutor;
pub use sort::SortExecutor;
pub use update::UpdateExecutor;

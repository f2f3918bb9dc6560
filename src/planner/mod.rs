mod plan;
#[allow(clippy::module_inception)]
mod planner;
mod query;

pub use plan::{Plan, QueryPlan};
pub use planner::{pop_conds, Planner};
pub use query::{
    AggKind, CompOp, CondRhs, Condition, Limit, OrderBy, Query, SetClause, SetOp,
    Statement, TabCol,
};

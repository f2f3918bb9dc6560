use crate::tuple::Value;

use super::query::{Condition, Limit, SetClause, TabCol};

/// Physical plan tree for a SELECT.
#[derive(Debug, Clone)]
pub enum Plan {
    SeqScan {
        tab_name: String,
        conds: Vec<Condition>,
    },
    IndexScan {
        tab_name: String,
        conds: Vec<Condition>,
        index_col_names: Vec<String>,
    },
    Join {
        left: Box<Plan>,
        right: Box<Plan>,
        conds: Vec<Condition>,
    },
    Sort {
        child: Box<Plan>,
        order_cols: Vec<(TabCol, bool)>,
    },
    Projection {
        child: Box<Plan>,
        sel_cols: Vec<TabCol>,
        limit: Option<Limit>,
    },
}

/// Top-level plan for one DML statement.
#[derive(Debug, Clone)]
pub enum QueryPlan {
    Select {
        plan: Plan,
        sel_cols: Vec<TabCol>,
    },
    Insert {
        tab_name: String,
        values: Vec<Value>,
    },
    Delete {
        tab_name: String,
        scan: Plan,
        conds: Vec<Condition>,
    },
    Update {
        tab_name: String,
        scan: Plan,
        set_clauses: Vec<SetClause>,
        conds: Vec<Condition>,
    },
}

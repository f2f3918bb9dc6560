use crate::catalog::Database;
use crate::common::{DbError, Result};

use super::plan::{Plan, QueryPlan};
use super::query::{CompOp, CondRhs, Condition, Query, Statement, TabCol};

/// Builds physical plans for DML statements. Scan-method choice uses
/// leftmost-prefix index matching; multi-table queries get a left-deep
/// nested-loop join tree with predicates pushed down as far as they
/// go.
pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Planner
    }

    pub fn plan(&self, db: &Database, stmt: &Statement) -> Result<QueryPlan> {
        match stmt {
            Statement::Select(query) => self.plan_select(db, query),
            Statement::Insert { tab_name, values } => {
                db.get_table(tab_name)?;
                Ok(QueryPlan::Insert {
                    tab_name: tab_name.clone(),
                    values: values.clone(),
                })
            }
            Statement::Delete { tab_name, conds } => {
                db.get_table(tab_name)?;
                let scan = self.plan_scan(db, tab_name, conds.clone())?;
                Ok(QueryPlan::Delete {
                    tab_name: tab_name.clone(),
                    scan,
                    conds: conds.clone(),
                })
            }
            Statement::Update {
                tab_name,
                set_clauses,
                conds,
            } => {
                db.get_table(tab_name)?;
                let scan = self.plan_scan(db, tab_name, conds.clone())?;
                Ok(QueryPlan::Update {
                    tab_name: tab_name.clone(),
                    scan,
                    set_clauses: set_clauses.clone(),
                    conds: conds.clone(),
                })
            }
            _ => Err(DbError::Internal(
                "statement kind does not produce a plan".into(),
            )),
        }
    }

    /// The logical pass: a named hook with no rewrites yet.
    fn logical_optimization(&self, query: Query) -> Query {
        query
    }

    fn plan_select(&self, db: &Database, query: &Query) -> Result<QueryPlan> {
        let query = self.logical_optimization(query.clone());
        let sel_cols = self.expand_select_list(db, &query)?;

        let mut conds = query.conds.clone();
        let mut scans = Vec::with_capacity(query.tables.len());
        for tab_name in &query.tables {
            let table_conds = pop_conds(&mut conds, tab_name);
            scans.push(Some(self.plan_scan(db, tab_name, table_conds)?));
        }

        let mut root = if query.tables.len() == 1 {
            scans[0].take().unwrap()
        } else {
            self.build_join_tree(&query.tables, scans, conds)?
        };

        if !query.order_by.is_empty() {
            let order_cols = query
                .order_by
                .iter()
                .map(|o| (o.col.clone(), o.desc))
                .collect();
            root = Plan::Sort {
                child: Box::new(root),
                order_cols,
            };
        }

        let plan = Plan::Projection {
            child: Box::new(root),
            sel_cols: sel_cols.clone(),
            limit: query.limit,
        };
        Ok(QueryPlan::Select { plan, sel_cols })
    }

    /// Replaces `*` select items with every column of every referenced
    /// table; a tagged `count(*)` folds over the first column instead.
    fn expand_select_list(&self, db: &Database, query: &Query) -> Result<Vec<TabCol>> {
        let mut out = Vec::new();
        for col in &query.cols {
            if col.col_name != "*" {
                out.push(col.clone());
                continue;
            }
            if let Some(agg) = col.aggregate {
                let tab = db.get_table(&query.tables[0])?;
                let first = &tab.cols[0];
                let mut expanded = TabCol::with_agg(&first.tab_name, &first.name, agg);
                expanded.alias = col.alias.clone();
                out.push(expanded);
            } else {
                for tab_name in &query.tables {
                    let tab = db.get_table(tab_name)?;
                    for c in &tab.cols {
                        out.push(TabCol::new(&c.tab_name, &c.name));
                    }
                }
            }
        }
        Ok(out)
    }

    /// Chooses between a sequential and an index scan for one table's
    /// predicates.
    fn plan_scan(&self, db: &Database, tab_name: &str, mut conds: Vec<Condition>) -> Result<Plan> {
        match self.match_index_cols(db, tab_name, &mut conds)? {
            Some(index_col_names) => Ok(Plan::IndexScan {
                tab_name: tab_name.to_string(),
                conds,
                index_col_names,
            }),
            None => Ok(Plan::SeqScan {
                tab_name: tab_name.to_string(),
                conds,
            }),
        }
    }

    /// Leftmost-prefix matching: for each candidate index, walk its
    /// columns left to right; an equality predicate lets the match
    /// continue, a range predicate ends it at that column. The longest
    /// match wins, its predicates are reordered to the front in index
    /// column order, and the chosen index's column list is returned.
    fn match_index_cols(
        &self,
        db: &Database,
        tab_name: &str,
        conds: &mut Vec<Condition>,
    ) -> Result<Option<Vec<String>>> {
        let tab = db.get_table(tab_name)?;

        // Usable predicates per column: literal comparisons on this
        // table, equality preferred over ranges.
        let usable = |col_name: &str, prefer_eq: bool| -> Option<usize> {
            let mut range_hit = None;
            for (i, cond) in conds.iter().enumerate() {
                if cond.lhs_col.tab_name != tab_name
                    || cond.lhs_col.col_name != col_name
                    || !cond.is_rhs_value()
                {
                    continue;
                }
                match cond.op {
                    CompOp::Eq => return Some(i),
                    CompOp::Ne => {}
                    _ => {
                        if range_hit.is_none() {
                            range_hit = Some(i)
                        }
                    }
                }
            }
            if prefer_eq {
                None
            } else {
                range_hit
            }
        };

        let mut best_len = 0;
        let mut best: Option<(Vec<usize>, Vec<String>)> = None;
        for index in &tab.indexes {
            let mut picked = Vec::new();
            for col in &index.cols {
                if let Some(i) = usable(&col.name, true) {
                    picked.push(i);
                    continue;
                }
                if let Some(i) = usable(&col.name, false) {
                    picked.push(i);
                }
                break;
            }
            if picked.len() > best_len {
                best_len = picked.len();
                best = Some((picked, index.col_names()));
            }
        }

        let Some((picked, col_names)) = best else {
            return Ok(None);
        };

        // Matched predicates first, in index column order
        let mut reordered = Vec::with_capacity(conds.len());
        for &i in &picked {
            reordered.push(conds[i].clone());
        }
        for (i, cond) in conds.iter().enumerate() {
            if !picked.contains(&i) {
                reordered.push(cond.clone());
            }
        }
        *conds = reordered;
        Ok(Some(col_names))
    }

    /// Left-deep join construction: the first join predicate pairs two
    /// scans; each further predicate attaches a not-yet-joined scan on
    /// the left (swapping the predicate's sides when needed); fully
    /// joined predicates are pushed down into the subtree; tables with
    /// no join predicate are cross-joined last.
    fn build_join_tree(
        &self,
        tables: &[String],
        mut scans: Vec<Option<Plan>>,
        mut conds: Vec<Condition>,
    ) -> Result<Plan> {
        let mut joined: Vec<String> = Vec::new();

        let take_scan = |scans: &mut Vec<Option<Plan>>,
                         joined: &mut Vec<String>,
                         table: &str|
         -> Option<Plan> {
            for (i, t) in tables.iter().enumerate() {
                if t == table && scans[i].is_some() {
                    joined.push(t.clone());
                    return scans[i].take();
                }
            }
            None
        };

        let mut root: Option<Plan> = None;
        while let Some(mut cond) = if conds.is_empty() {
            None
        } else {
            Some(conds.remove(0))
        } {
            let CondRhs::Col(rhs_col) = cond.rhs.clone() else {
                // Residual literal predicate on a joined table
                if let Some(r) = root.as_mut() {
                    push_cond(&mut cond, r);
                }
                continue;
            };

            if root.is_none() {
                let left = take_scan(&mut scans, &mut joined, &cond.lhs_col.tab_name);
                let right = take_scan(&mut scans, &mut joined, &rhs_col.tab_name);
                match (left, right) {
                    (Some(l), Some(r)) => {
                        root = Some(Plan::Join {
                            left: Box::new(l),
                            right: Box::new(r),
                            conds: vec![cond],
                        });
                    }
                    _ => {
                        return Err(DbError::Internal(
                            "join predicate names an unknown table".into(),
                        ))
                    }
                }
                continue;
            }

            let lhs_new = !joined.contains(&cond.lhs_col.tab_name);
            let rhs_new = !joined.contains(&rhs_col.tab_name);
            match (lhs_new, rhs_new) {
                (false, false) => {
                    // Both sides already joined: push down
                    let r = root.as_mut().unwrap();
                    if push_cond(&mut cond, r) != PushResult::Consumed {
                        if let Plan::Join { conds, .. } = r {
                            conds.push(cond);
                        }
                    }
                }
                (true, false) => {
                    let left = take_scan(&mut scans, &mut joined, &cond.lhs_col.tab_name)
                        .ok_or_else(|| {
                            DbError::Internal("join predicate names an unknown table".into())
                        })?;
                    root = Some(Plan::Join {
                        left: Box::new(left),
                        right: Box::new(root.take().unwrap()),
                        conds: vec![cond],
                    });
                }
                (false, true) => {
                    cond.swap_sides();
                    let left = take_scan(&mut scans, &mut joined, &cond.lhs_col.tab_name)
                        .ok_or_else(|| {
                            DbError::Internal("join predicate names an unknown table".into())
                        })?;
                    root = Some(Plan::Join {
                        left: Box::new(left),
                        right: Box::new(root.take().unwrap()),
                        conds: vec![cond],
                    });
                }
                (true, true) => {
                    // Neither side joined yet: pair them up and hang
                    // the pair over the current tree
                    let left = take_scan(&mut scans, &mut joined, &cond.lhs_col.tab_name);
                    let right = take_scan(&mut scans, &mut joined, &rhs_col.tab_name);
                    let (Some(l), Some(r)) = (left, right) else {
                        return Err(DbError::Internal(
                            "join predicate names an unknown table".into(),
                        ));
                    };
                    let pair = Plan::Join {
                        left: Box::new(l),
                        right: Box::new(r),
                        conds: vec![cond],
                    };
                    root = Some(Plan::Join {
                        left: Box::new(pair),
                        right: Box::new(root.take().unwrap()),
                        conds: Vec::new(),
                    });
                }
            }
        }

        // Cross-join any table no predicate reached
        for scan in scans.iter_mut() {
            if let Some(plan) = scan.take() {
                root = Some(match root.take() {
                    Some(r) => Plan::Join {
                        left: Box::new(plan),
                        right: Box::new(r),
                        conds: Vec::new(),
                    },
                    None => plan,
                });
            }
        }

        root.ok_or_else(|| DbError::Internal("empty table list".into()))
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushResult {
    /// No scan below matches either side
    NoMatch,
    /// Only the predicate's left side matches
    LeftSide,
    /// Only the predicate's right side matches
    RightSide,
    Consumed,
}

/// Recursive predicate pushdown: a join whose subtrees cover both
/// sides of the predicate absorbs it (swapping sides so the left
/// column refers to the left subtree).
fn push_cond(cond: &mut Condition, plan: &mut Plan) -> PushResult {
    match plan {
        Plan::SeqScan { tab_name, .. } | Plan::IndexScan { tab_name, .. } => {
            let lhs = cond.lhs_col.tab_name == *tab_name;
            let rhs = matches!(&cond.rhs, CondRhs::Col(c) if c.tab_name == *tab_name);
            if lhs {
                PushResult::LeftSide
            } else if rhs {
                PushResult::RightSide
            } else {
                PushResult::NoMatch
            }
        }
        Plan::Join { left, right, conds } => {
            let l = push_cond(cond, left);
            if l == PushResult::Consumed {
                return PushResult::Consumed;
            }
            let r = push_cond(cond, right);
            if r == PushResult::Consumed {
                return PushResult::Consumed;
            }
            match (l, r) {
                (PushResult::NoMatch, other) | (other, PushResult::NoMatch) => other,
                (l, _) => {
                    if l == PushResult::RightSide {
                        cond.swap_sides();
                    }
                    conds.push(cond.clone());
                    PushResult::Consumed
                }
            }
        }
        Plan::Sort { child, .. } | Plan::Projection { child, .. } => push_cond(cond, child),
    }
}

/// Extracts the predicates that touch only `tab_name`: a literal
/// comparison against one of its columns, or a comparison between two
/// of its own columns.
pub fn pop_conds(conds: &mut Vec<Condition>, tab_name: &str) -> Vec<Condition> {
    let mut mine = Vec::new();
    let mut rest = Vec::new();
    for cond in conds.drain(..) {
        let owned = match &cond.rhs {
            CondRhs::Value(_) => cond.lhs_col.tab_name == tab_name,
            CondRhs::Col(rhs) => {
                cond.lhs_col.tab_name == tab_name && rhs.tab_name == tab_name
            }
        };
        if owned {
            mine.push(cond);
        } else {
            rest.push(cond);
        }
    }
    *conds = rest;
    mine
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::catalog::ColDef;
    use crate::planner::Limit;
    use crate::storage::DiskManager;
    use crate::tuple::{ColType, Value};
    use std::sync::Arc;

    fn open_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("db");
        Database::create(&home).unwrap();
        let dm = Arc::new(DiskManager::new());
        let bpm = Arc::new(BufferPoolManager::new(128, 2, dm));
        let db = Database::open(&home, bpm).unwrap();
        (db, dir)
    }

    fn int_col(name: &str) -> ColDef {
        ColDef {
            name: name.to_string(),
            col_type: ColType::Int,
            len: 4,
        }
    }

    fn val_cond(tab: &str, col: &str, op: CompOp, v: i32) -> Condition {
        Condition {
            lhs_col: TabCol::new(tab, col),
            op,
            rhs: CondRhs::Value(Value::Int(v)),
        }
    }

    #[test]
    fn test_pop_conds_separates_tables() {
        let mut conds = vec![
            val_cond("a", "x", CompOp::Eq, 1),
            Condition {
                lhs_col: TabCol::new("a", "x"),
                op: CompOp::Eq,
                rhs: CondRhs::Col(TabCol::new("b", "y")),
            },
            val_cond("b", "y", CompOp::Gt, 2),
        ];
        let mine = pop_conds(&mut conds, "a");
        assert_eq!(mine.len(), 1);
        assert_eq!(conds.len(), 2);
    }

    #[test]
    fn test_single_table_seq_scan() {
        let (db, _dir) = open_db();
        db.create_table("t", &[int_col("x")], None).unwrap();
        let planner = Planner::new();
        let query = Query {
            tables: vec!["t".into()],
            cols: vec![TabCol::new("", "*")],
            conds: vec![val_cond("t", "x", CompOp::Eq, 1)],
            order_by: vec![],
            limit: None,
        };
        let QueryPlan::Select { plan, sel_cols } = planner.plan_select(&db, &query).unwrap()
        else {
            panic!()
        };
        assert_eq!(sel_cols.len(), 1);
        let Plan::Projection { child, .. } = plan else { panic!() };
        assert!(matches!(*child, Plan::SeqScan { .. }));
    }

    #[test]
    fn test_index_scan_chosen_for_prefix() {
        let (db, _dir) = open_db();
        db.create_table("t", &[int_col("a"), int_col("b"), int_col("c")], None)
            .unwrap();
        db.create_index("t", &["a".into(), "b".into()], None).unwrap();
        let planner = Planner::new();

        // Equality on a plus range on b: both columns match
        let mut conds = vec![
            val_cond("t", "b", CompOp::Gt, 5),
            val_cond("t", "a", CompOp::Eq, 1),
        ];
        let matched = planner.match_index_cols(&db, "t", &mut conds).unwrap();
        assert_eq!(matched, Some(vec!["a".to_string(), "b".to_string()]));
        // Reordered into index column order
        assert_eq!(conds[0].lhs_col.col_name, "a");
        assert_eq!(conds[1].lhs_col.col_name, "b");

        // Range on a alone terminates the match at a
        let mut conds = vec![
            val_cond("t", "a", CompOp::Ge, 1),
            val_cond("t", "b", CompOp::Eq, 2),
        ];
        let matched = planner.match_index_cols(&db, "t", &mut conds).unwrap();
        assert_eq!(matched, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(conds[0].lhs_col.col_name, "a");

        // Predicate only on b: no leftmost prefix
        let mut conds = vec![val_cond("t", "b", CompOp::Eq, 2)];
        assert_eq!(planner.match_index_cols(&db, "t", &mut conds).unwrap(), None);
    }

    #[test]
    fn test_join_tree_left_deep() {
        let (db, _dir) = open_db();
        for t in ["a", "b", "c"] {
            db.create_table(t, &[int_col("x")], None).unwrap();
        }
        let planner = Planner::new();
        let join = |l: &str, r: &str| Condition {
            lhs_col: TabCol::new(l, "x"),
            op: CompOp::Eq,
            rhs: CondRhs::Col(TabCol::new(r, "x")),
        };
        let query = Query {
            tables: vec!["a".into(), "b".into(), "c".into()],
            cols: vec![TabCol::new("", "*")],
            conds: vec![join("a", "b"), join("b", "c")],
            order_by: vec![],
            limit: None,
        };
        let QueryPlan::Select { plan, .. } = planner.plan_select(&db, &query).unwrap() else {
            panic!()
        };
        let Plan::Projection { child, .. } = plan else { panic!() };
        let Plan::Join { left, right, conds } = *child else { panic!() };
        // Second predicate attached table c on the left of the
        // existing (a join b) tree, sides canonicalized
        assert_eq!(conds.len(), 1);
        assert_eq!(conds[0].lhs_col.tab_name, "c");
        assert!(matches!(*left, Plan::SeqScan { ref tab_name, .. } if tab_name == "c"));
        assert!(matches!(*right, Plan::Join { .. }));
    }

    #[test]
    fn test_order_by_adds_sort() {
        let (db, _dir) = open_db();
        db.create_table("t", &[int_col("x")], None).unwrap();
        let planner = Planner::new();
        let query = Query {
            tables: vec!["t".into()],
            cols: vec![TabCol::new("t", "x")],
            conds: vec![],
            order_by: vec![crate::planner::OrderBy {
                col: TabCol::new("t", "x"),
                desc: true,
            }],
            limit: Some(Limit { start: 0, len: 5 }),
        };
        let QueryPlan::Select { plan, .. } = planner.plan_select(&db, &query).unwrap() else {
            panic!()
        };
        let Plan::Projection { child, limit, .. } = plan else { panic!() };
        assert_eq!(limit, Some(Limit { start: 0, len: 5 }));
        assert!(matches!(*child, Plan::Sort { .. }));
    }
}

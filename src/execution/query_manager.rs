use std::io::Write;

use crate::catalog::Database;
use crate::common::{DbError, Result, Rid, OUTPUT_FILE_NAME};
use crate::planner::{AggKind, Plan, QueryPlan, TabCol};
use crate::tuple::{ColType, Value};

use super::context::Context;
use super::delete::DeleteExecutor;
use super::executor::{col_value, Executor};
use super::index_scan::IndexScanExecutor;
use super::insert::InsertExecutor;
use super::nested_loop_join::NestedLoopJoinExecutor;
use super::projection::ProjectionExecutor;
use super::seq_scan::SeqScanExecutor;
use super::sort::SortExecutor;
use super::update::UpdateExecutor;

const HELP_TEXT: &str = "Supported SQL syntax:\n\
  command ;\n\
command:\n\
  CREATE TABLE table_name (column_name type [, column_name type ...])\n\
  DROP TABLE table_name\n\
  CREATE INDEX table_name (column_name [, column_name ...])\n\
  DROP INDEX table_name (column_name [, column_name ...])\n\
  SHOW INDEX FROM table_name\n\
  INSERT INTO table_name VALUES (value [, value ...])\n\
  DELETE FROM table_name [WHERE where_clause]\n\
  UPDATE table_name SET column_name = value [, column_name = value ...] [WHERE where_clause]\n\
  SELECT selector FROM table_name [, table_name ...] [WHERE where_clause]\n\
         [ORDER BY column [ASC|DESC]] [LIMIT start, count]\n\
  BEGIN / COMMIT / ABORT / ROLLBACK\n\
  SHOW TABLES / DESC table_name\n\
  LOAD file_name INTO table_name\n\
type:\n\
  {INT | FLOAT | CHAR(n) | BIGINT | DATETIME}\n\
where_clause:\n\
  condition [AND condition ...]\n\
condition:\n\
  column op {column | value}\n\
op:\n\
  {= | <> | < | > | <= | >=}\n";

/// Result of one statement: a tabulated row set for SELECT-like
/// statements, an affected-row count for DML, or a short
/// acknowledgment.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub captions: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub affected: usize,
    pub message: String,
}

impl QueryResult {
    pub fn ack(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    fn table(captions: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let message = format!("{} rows", rows.len());
        Self {
            captions,
            rows,
            affected: 0,
            message,
        }
    }
}

/// Drives plans and utility statements against the storage layer.
pub struct QueryManager;

impl QueryManager {
    pub fn new() -> Self {
        QueryManager
    }

    pub fn help(&self) -> QueryResult {
        QueryResult::ack(HELP_TEXT)
    }

    /// Instantiates the executor tree for a plan.
    pub fn build_executor<'a>(
        &self,
        db: &'a Database,
        plan: &Plan,
        ctx: &'a Context,
    ) -> Result<Box<dyn Executor + 'a>> {
        match plan {
            Plan::SeqScan { tab_name, conds } => Ok(Box::new(SeqScanExecutor::new(
                db,
                tab_name,
                conds.clone(),
                ctx,
            )?)),
            Plan::IndexScan {
                tab_name,
                conds,
                index_col_names,
            } => Ok(Box::new(IndexScanExecutor::new(
                db,
                tab_name,
                conds.clone(),
                index_col_names.clone(),
                ctx,
            )?)),
            Plan::Join { left, right, conds } => {
                let left = self.build_executor(db, left, ctx)?;
                let right = self.build_executor(db, right, ctx)?;
                Ok(Box::new(NestedLoopJoinExecutor::new(
                    left,
                    right,
                    conds.clone(),
                )))
            }
            Plan::Sort { child, order_cols } => {
                let child = self.build_executor(db, child, ctx)?;
                Ok(Box::new(SortExecutor::new(child, order_cols)?))
            }
            Plan::Projection {
                child,
                sel_cols,
                limit,
            } => {
                let child = self.build_executor(db, child, ctx)?;
                Ok(Box::new(ProjectionExecutor::new(child, sel_cols, *limit)?))
            }
        }
    }

    /// Runs one planned DML statement.
    pub fn run_plan(&self, db: &Database, plan: &QueryPlan, ctx: &Context) -> Result<QueryResult> {
        match plan {
            QueryPlan::Select { plan, sel_cols } => self.select_from(db, plan, sel_cols, ctx),
            QueryPlan::Insert { tab_name, values } => {
                let affected = InsertExecutor::new(db, tab_name, values.clone(), ctx)?.execute()?;
                Ok(QueryResult {
                    affected,
                    message: format!("{} row inserted", affected),
                    ..Default::default()
                })
            }
            QueryPlan::Delete { tab_name, scan, .. } => {
                let rids = self.collect_rids(db, scan, ctx)?;
                let affected = DeleteExecutor::new(db, tab_name, rids, ctx)?.execute()?;
                Ok(QueryResult {
                    affected,
                    message: format!("{} rows deleted", affected),
                    ..Default::default()
                })
            }
            QueryPlan::Update {
                tab_name,
                scan,
                set_clauses,
                ..
            } => {
                let rids = self.collect_rids(db, scan, ctx)?;
                let affected =
                    UpdateExecutor::new(db, tab_name, set_clauses.clone(), rids, ctx)?.execute()?;
                Ok(QueryResult {
                    affected,
                    message: format!("{} rows updated", affected),
                    ..Default::default()
                })
            }
        }
    }

    /// Runs a scan plan and collects the rids it produces.
    fn collect_rids(&self, db: &Database, scan: &Plan, ctx: &Context) -> Result<Vec<Rid>> {
        let mut exec = self.build_executor(db, scan, ctx)?;
        exec.begin()?;
        let mut rids = Vec::new();
        while !exec.is_end() {
            rids.push(exec.rid());
            exec.advance()?;
        }
        Ok(rids)
    }

    /// Runs a SELECT tree and renders its rows. An aggregate tag on
    /// the first selected column switches to a single-row fold with
    /// one accumulator per output column.
    pub fn select_from(
        &self,
        db: &Database,
        plan: &Plan,
        sel_cols: &[TabCol],
        ctx: &Context,
    ) -> Result<QueryResult> {
        let captions: Vec<String> = sel_cols
            .iter()
            .map(|c| c.alias.clone().unwrap_or_else(|| c.col_name.clone()))
            .collect();

        let mut exec = self.build_executor(db, plan, ctx)?;
        let rows = if sel_cols.first().and_then(|c| c.aggregate).is_some() {
            self.aggregate_rows(&mut exec, sel_cols)?
        } else {
            let mut rows = Vec::new();
            exec.begin()?;
            while !exec.is_end() {
                let record = exec.record()?;
                let row = exec
                    .columns()
                    .iter()
                    .map(|col| col_value(&record, col).to_string())
                    .collect();
                rows.push(row);
                exec.advance()?;
            }
            rows
        };

        let result = QueryResult::table(captions, rows);
        if !ctx.output_ellipsis {
            write_output_table(&result)?;
        }
        Ok(result)
    }

    /// Folds the child stream into one output row of per-column
    /// accumulators.
    fn aggregate_rows<'a>(
        &self,
        exec: &mut Box<dyn Executor + 'a>,
        sel_cols: &[TabCol],
    ) -> Result<Vec<Vec<String>>> {
        let first_tag = sel_cols[0].aggregate;
        let cols = exec.columns().to_vec();
        let mut accs: Vec<Accumulator> = sel_cols
            .iter()
            .zip(cols.iter())
            .map(|(sel, col)| Accumulator::new(sel.aggregate.or(first_tag), col.col_type))
            .collect();

        exec.begin()?;
        while !exec.is_end() {
            let record = exec.record()?;
            for (acc, col) in accs.iter_mut().zip(cols.iter()) {
                acc.fold(&col_value(&record, col))?;
            }
            exec.advance()?;
        }

        let row = accs.iter().map(|acc| acc.finish()).collect();
        Ok(vec![row])
    }

    pub fn show_tables(&self, db: &Database, ctx: &Context) -> Result<QueryResult> {
        let rows: Vec<Vec<String>> = db.table_names().into_iter().map(|n| vec![n]).collect();
        let result = QueryResult::table(vec!["Tables".into()], rows);
        if !ctx.output_ellipsis {
            write_output_table(&result)?;
        }
        Ok(result)
    }

    pub fn desc_table(&self, db: &Database, tab_name: &str) -> Result<QueryResult> {
        let tab = db.get_table(tab_name)?;
        let rows = tab
            .cols
            .iter()
            .map(|col| {
                let ty = match col.col_type {
                    ColType::String => format!("CHAR({})", col.len),
                    other => other.to_string(),
                };
                vec![
                    col.name.clone(),
                    ty,
                    if col.index { "YES" } else { "NO" }.to_string(),
                ]
            })
            .collect();
        Ok(QueryResult::table(
            vec!["Field".into(), "Type".into(), "Index".into()],
            rows,
        ))
    }

    pub fn show_index(&self, db: &Database, tab_name: &str, ctx: &Context) -> Result<QueryResult> {
        let tab = db.get_table(tab_name)?;
        let rows: Vec<Vec<String>> = tab
            .indexes
            .iter()
            .map(|ix| {
                vec![
                    tab_name.to_string(),
                    "unique".to_string(),
                    format!("({})", ix.col_names().join(",")),
                ]
            })
            .collect();
        let result = QueryResult::table(
            vec!["Table".into(), "Unique".into(), "Key_name".into()],
            rows,
        );
        if !ctx.output_ellipsis {
            write_output_table(&result)?;
        }
        Ok(result)
    }

    /// LOAD <file> INTO <table>: parses the CSV and inserts each row
    /// through the normal insert path so logging and indexes stay
    /// consistent.
    pub fn load(
        &self,
        db: &Database,
        file_name: &str,
        tab_name: &str,
        ctx: &Context,
    ) -> Result<QueryResult> {
        let rows = db.load_csv(file_name, tab_name)?;
        let mut affected = 0;
        for values in rows {
            affected += InsertExecutor::new(db, tab_name, values, ctx)?.execute()?;
        }
        Ok(QueryResult {
            affected,
            message: format!("{} rows loaded", affected),
            ..Default::default()
        })
    }
}

impl Default for QueryManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-column aggregate state.
struct Accumulator {
    kind: Option<AggKind>,
    col_type: ColType,
    count: i64,
    sum: Option<Value>,
    best: Option<Value>,
}

impl Accumulator {
    fn new(kind: Option<AggKind>, col_type: ColType) -> Self {
        Self {
            kind,
            col_type,
            count: 0,
            sum: None,
            best: None,
        }
    }

    fn fold(&mut self, value: &Value) -> Result<()> {
        match self.kind {
            Some(AggKind::Count) => self.count += 1,
            Some(AggKind::Sum) => {
                let sum = match self.sum.take() {
                    None => value.clone(),
                    Some(acc) => add_values(&acc, value)?,
                };
                self.sum = Some(sum);
            }
            Some(AggKind::Min) => {
                let better = match self.best.take() {
                    None => value.clone(),
                    Some(best) => {
                        if value.compare(&best)? == std::cmp::Ordering::Less {
                            value.clone()
                        } else {
                            best
                        }
                    }
                };
                self.best = Some(better);
            }
            Some(AggKind::Max) => {
                let better = match self.best.take() {
                    None => value.clone(),
                    Some(best) => {
                        if value.compare(&best)? == std::cmp::Ordering::Greater {
                            value.clone()
                        } else {
                            best
                        }
                    }
                };
                self.best = Some(better);
            }
            None => {}
        }
        Ok(())
    }

    fn finish(&self) -> String {
        match self.kind {
            Some(AggKind::Count) => self.count.to_string(),
            Some(AggKind::Sum) => self
                .sum
                .clone()
                .unwrap_or_else(|| zero_of(self.col_type))
                .to_string(),
            Some(AggKind::Min) | Some(AggKind::Max) => self
                .best
                .clone()
                .unwrap_or_else(|| neutral_of(self.col_type))
                .to_string(),
            None => String::new(),
        }
    }
}

fn add_values(a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_add(*y))),
        (Value::Bigint(x), Value::Bigint(y)) => Ok(Value::Bigint(x.wrapping_add(*y))),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x + y)),
        _ => Err(DbError::IncompatibleType {
            lhs: a.col_type().to_string(),
            rhs: b.col_type().to_string(),
        }),
    }
}

fn zero_of(col_type: ColType) -> Value {
    match col_type {
        ColType::Int => Value::Int(0),
        ColType::Float => Value::Float(0.0),
        ColType::Bigint => Value::Bigint(0),
        ColType::Datetime => Value::Datetime(0),
        ColType::String => Value::Str(String::new()),
    }
}

fn neutral_of(col_type: ColType) -> Value {
    zero_of(col_type)
}

/// Appends a rendered result table to output.txt in the current
/// directory.
fn write_output_table(result: &QueryResult) -> Result<()> {
    let mut text = String::new();
    text.push('|');
    for caption in &result.captions {
        text.push_str(&format!(" {} |", caption));
    }
    text.push('\n');
    for row in &result.rows {
        text.push('|');
        for field in row {
            text.push_str(&format!(" {} |", field));
        }
        text.push('\n');
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(OUTPUT_FILE_NAME)?;
    file.write_all(text.as_bytes())?;
    Ok(())
}

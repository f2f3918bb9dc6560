use ferrodb::catalog::ColDef;
use ferrodb::planner::{
    CompOp, CondRhs, Condition, Query, Statement, TabCol,
};
use ferrodb::tuple::{ColType, Value};
use ferrodb::{Engine, Session};

fn main() {
    env_logger::init();

    println!("ferrodb - a disk-oriented relational database engine");
    println!("====================================================\n");

    let db_path = "demo_db";
    let _ = Engine::destroy_database(db_path);
    Engine::create_database(db_path).expect("failed to create database");
    let engine = Engine::open(db_path).expect("failed to open database");
    let mut session = Session::new();
    session.output_ellipsis = true;

    engine
        .execute(
            &Statement::CreateTable {
                tab_name: "users".into(),
                col_defs: vec![
                    ColDef {
                        name: "id".into(),
                        col_type: ColType::Int,
                        len: 4,
                    },
                    ColDef {
                        name: "name".into(),
                        col_type: ColType::String,
                        len: 16,
                    },
                ],
            },
            &mut session,
        )
        .expect("create table failed");
    println!("Created table users(id INT, name CHAR(16))");

    engine
        .execute(
            &Statement::CreateIndex {
                tab_name: "users".into(),
                col_names: vec!["id".into()],
            },
            &mut session,
        )
        .expect("create index failed");
    println!("Created index on users(id)");

    for (id, name) in [(3, "carol"), (1, "alice"), (2, "bob")] {
        engine
            .execute(
                &Statement::Insert {
                    tab_name: "users".into(),
                    values: vec![Value::Int(id), Value::Str(name.into())],
                },
                &mut session,
            )
            .expect("insert failed");
        println!("Inserted ({}, {})", id, name);
    }

    let select = Statement::Select(Query {
        tables: vec!["users".into()],
        cols: vec![TabCol::new("", "*")],
        conds: vec![Condition {
            lhs_col: TabCol::new("users", "id"),
            op: CompOp::Ge,
            rhs: CondRhs::Value(Value::Int(2)),
        }],
        order_by: vec![],
        limit: None,
    });
    let result = engine
        .execute(&select, &mut session)
        .expect("select failed");

    println!("\nSELECT * FROM users WHERE id >= 2:");
    println!("  {:?}", result.captions);
    for row in &result.rows {
        println!("  {:?}", row);
    }

    engine.close().expect("close failed");
    Engine::destroy_database(db_path).ok();
    println!("\nDemo completed successfully!");
}

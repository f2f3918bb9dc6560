use std::sync::Arc;

use ferrodb::catalog::ColDef;
use ferrodb::planner::{
    AggKind, CompOp, CondRhs, Condition, Limit, OrderBy, Query, SetClause, SetOp,
    Statement, TabCol,
};
use ferrodb::tuple::{ColType, Value};
use ferrodb::{Engine, Session};

fn open_engine() -> (Arc<Engine>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let home = dir.path().join("db");
    Engine::create_database(&home).unwrap();
    (Arc::new(Engine::open(&home).unwrap()), dir)
}

fn session() -> Session {
    let mut s = Session::new();
    s.output_ellipsis = true;
    s
}

fn create_scores(engine: &Engine, s: &mut Session) {
    engine
        .execute(
            &Statement::CreateTable {
                tab_name: "scores".into(),
                col_defs: vec![
                    ColDef {
                        name: "id".into(),
                        col_type: ColType::Int,
                        len: 4,
                    },
                    ColDef {
                        name: "name".into(),
                        col_type: ColType::String,
                        len: 8,
                    },
                    ColDef {
                        name: "score".into(),
                        col_type: ColType::Float,
                        len: 8,
                    },
                ],
            },
            s,
        )
        .unwrap();
}

fn insert_score(engine: &Engine, s: &mut Session, id: i32, name: &str, score: f64) {
    engine
        .execute(
            &Statement::Insert {
                tab_name: "scores".into(),
                values: vec![
                    Value::Int(id),
                    Value::Str(name.into()),
                    Value::Float(score),
                ],
            },
            s,
        )
        .unwrap();
}

fn run_select(engine: &Engine, s: &mut Session, query: Query) -> Vec<Vec<String>> {
    engine
        .execute(&Statement::Select(query), s)
        .unwrap()
        .rows
}

fn scores_query() -> Query {
    Query {
        tables: vec!["scores".into()],
        cols: vec![TabCol::new("", "*")],
        conds: vec![],
        order_by: vec![],
        limit: None,
    }
}

#[test]
fn test_where_with_cross_type_coercion() {
    let (engine, _dir) = open_engine();
    let mut s = session();
    create_scores(&engine, &mut s);
    insert_score(&engine, &mut s, 1, "alice", 1.5);
    insert_score(&engine, &mut s, 2, "bob", 3.0);
    insert_score(&engine, &mut s, 3, "carol", 2.5);

    // Float column compared against an int literal
    let mut query = scores_query();
    query.cols = vec![TabCol::new("scores", "name")];
    query.conds = vec![Condition {
        lhs_col: TabCol::new("scores", "score"),
        op: CompOp::Ge,
        rhs: CondRhs::Value(Value::Int(2)),
    }];
    let mut rows = run_select(&engine, &mut s, query);
    rows.sort();
    assert_eq!(rows, vec![vec!["bob".to_string()], vec!["carol".to_string()]]);
}

#[test]
fn test_order_by_and_limit() {
    let (engine, _dir) = open_engine();
    let mut s = session();
    create_scores(&engine, &mut s);
    for (id, name, score) in [(1, "a", 3.0), (2, "b", 1.0), (3, "c", 2.0)] {
        insert_score(&engine, &mut s, id, name, score);
    }

    let mut query = scores_query();
    query.cols = vec![TabCol::new("scores", "id")];
    query.order_by = vec![OrderBy {
        col: TabCol::new("scores", "score"),
        desc: true,
    }];
    let rows = run_select(&engine, &mut s, query.clone());
    assert_eq!(rows, vec![vec!["1"], vec!["3"], vec!["2"]]);

    // LIMIT 0,0 yields nothing
    query.limit = Some(Limit { start: 0, len: 0 });
    assert!(run_select(&engine, &mut s, query.clone()).is_empty());

    // LIMIT 0,2 yields the first two
    query.limit = Some(Limit { start: 0, len: 2 });
    assert_eq!(
        run_select(&engine, &mut s, query.clone()),
        vec![vec!["1"], vec!["3"]]
    );

    // LIMIT 1,2 skips one then yields two
    query.limit = Some(Limit { start: 1, len: 2 });
    assert_eq!(
        run_select(&engine, &mut s, query),
        vec![vec!["3"], vec!["2"]]
    );
}

#[test]
fn test_aggregates() {
    let (engine, _dir) = open_engine();
    let mut s = session();
    create_scores(&engine, &mut s);
    for (id, name, score) in [(1, "a", 3.0), (2, "b", 1.0), (3, "c", 2.0)] {
        insert_score(&engine, &mut s, id, name, score);
    }

    // COUNT(*)
    let mut query = scores_query();
    query.cols = vec![TabCol::with_agg("", "*", AggKind::Count)];
    assert_eq!(run_select(&engine, &mut s, query), vec![vec!["3"]]);

    // MAX and MIN over an int column
    let mut query = scores_query();
    query.cols = vec![
        TabCol::with_agg("scores", "id", AggKind::Max),
        TabCol::with_agg("scores", "id", AggKind::Min),
    ];
    assert_eq!(run_select(&engine, &mut s, query), vec![vec!["3", "1"]]);

    // SUM over the float column
    let mut query = scores_query();
    query.cols = vec![TabCol::with_agg("scores", "score", AggKind::Sum)];
    assert_eq!(run_select(&engine, &mut s, query), vec![vec!["6"]]);
}

#[test]
fn test_aggregate_over_empty_input() {
    let (engine, _dir) = open_engine();
    let mut s = session();
    create_scores(&engine, &mut s);

    let mut query = scores_query();
    query.cols = vec![TabCol::with_agg("", "*", AggKind::Count)];
    assert_eq!(run_select(&engine, &mut s, query), vec![vec!["0"]]);

    let mut query = scores_query();
    query.cols = vec![
        TabCol::with_agg("scores", "id", AggKind::Sum),
        TabCol::with_agg("scores", "name", AggKind::Max),
    ];
    assert_eq!(run_select(&engine, &mut s, query), vec![vec!["0", ""]]);
}

#[test]
fn test_index_scan_matches_seq_scan() {
    let (engine, _dir) = open_engine();
    let mut s = session();
    create_scores(&engine, &mut s);
    for id in (1..=30).rev() {
        insert_score(&engine, &mut s, id, "x", id as f64);
    }

    let range_query = |lo: i32, hi: i32| {
        let mut query = scores_query();
        query.cols = vec![TabCol::new("scores", "id")];
        query.conds = vec![
            Condition {
                lhs_col: TabCol::new("scores", "id"),
                op: CompOp::Gt,
                rhs: CondRhs::Value(Value::Int(lo)),
            },
            Condition {
                lhs_col: TabCol::new("scores", "id"),
                op: CompOp::Le,
                rhs: CondRhs::Value(Value::Int(hi)),
            },
        ];
        query
    };

    let mut before: Vec<Vec<String>> = run_select(&engine, &mut s, range_query(10, 20));
    before.sort();

    engine
        .execute(
            &Statement::CreateIndex {
                tab_name: "scores".into(),
                col_names: vec!["id".into()],
            },
            &mut s,
        )
        .unwrap();

    // Same predicates now served by the index
    let mut after = run_select(&engine, &mut s, range_query(10, 20));
    after.sort();
    assert_eq!(before, after);
    assert_eq!(after.len(), 10);

    // Point lookup through the index
    let mut query = scores_query();
    query.cols = vec![TabCol::new("scores", "id")];
    query.conds = vec![Condition {
        lhs_col: TabCol::new("scores", "id"),
        op: CompOp::Eq,
        rhs: CondRhs::Value(Value::Int(17)),
    }];
    assert_eq!(run_select(&engine, &mut s, query), vec![vec!["17"]]);
}

#[test]
fn test_join_two_tables() {
    let (engine, _dir) = open_engine();
    let mut s = session();

    for (tab, col) in [("users", "uid"), ("orders", "ouid")] {
        engine
            .execute(
                &Statement::CreateTable {
                    tab_name: tab.into(),
                    col_defs: vec![
                        ColDef {
                            name: col.into(),
                            col_type: ColType::Int,
                            len: 4,
                        },
                        ColDef {
                            name: "tag".into(),
                            col_type: ColType::Int,
                            len: 4,
                        },
                    ],
                },
                &mut s,
            )
            .unwrap();
    }
    for (uid, tag) in [(1, 100), (2, 200)] {
        engine
            .execute(
                &Statement::Insert {
                    tab_name: "users".into(),
                    values: vec![Value::Int(uid), Value::Int(tag)],
                },
                &mut s,
            )
            .unwrap();
    }
    for (ouid, tag) in [(1, 11), (1, 12), (2, 21)] {
        engine
            .execute(
                &Statement::Insert {
                    tab_name: "orders".into(),
                    values: vec![Value::Int(ouid), Value::Int(tag)],
                },
                &mut s,
            )
            .unwrap();
    }

    let query = Query {
        tables: vec!["users".into(), "orders".into()],
        cols: vec![
            TabCol::new("users", "uid"),
            TabCol::new("orders", "tag"),
        ],
        conds: vec![Condition {
            lhs_col: TabCol::new("users", "uid"),
            op: CompOp::Eq,
            rhs: CondRhs::Col(TabCol::new("orders", "ouid")),
        }],
        order_by: vec![],
        limit: None,
    };
    let mut rows = run_select(&engine, &mut s, query);
    rows.sort();
    assert_eq!(
        rows,
        vec![
            vec!["1".to_string(), "11".to_string()],
            vec!["1".to_string(), "12".to_string()],
            vec!["2".to_string(), "21".to_string()],
        ]
    );
}

#[test]
fn test_update_add_and_sub() {
    let (engine, _dir) = open_engine();
    let mut s = session();
    create_scores(&engine, &mut s);
    insert_score(&engine, &mut s, 1, "a", 10.0);

    let update = |op: SetOp, v: f64| Statement::Update {
        tab_name: "scores".into(),
        set_clauses: vec![SetClause {
            col: TabCol::new("scores", "score"),
            op,
            value: Value::Float(v),
        }],
        conds: vec![],
    };
    // new = old + literal
    engine.execute(&update(SetOp::Add, 2.5), &mut s).unwrap();
    // new = old - literal
    engine.execute(&update(SetOp::Sub, 0.5), &mut s).unwrap();

    let mut query = scores_query();
    query.cols = vec![TabCol::new("scores", "score")];
    assert_eq!(run_select(&engine, &mut s, query), vec![vec!["12"]]);
}

#[test]
fn test_datetime_round_trip_and_comparison() {
    let (engine, _dir) = open_engine();
    let mut s = session();
    engine
        .execute(
            &Statement::CreateTable {
                tab_name: "events".into(),
                col_defs: vec![
                    ColDef {
                        name: "id".into(),
                        col_type: ColType::Int,
                        len: 4,
                    },
                    ColDef {
                        name: "at".into(),
                        col_type: ColType::Datetime,
                        len: 8,
                    },
                ],
            },
            &mut s,
        )
        .unwrap();
    for (id, at) in [(1, 20240101120000i64), (2, 20250601080000)] {
        engine
            .execute(
                &Statement::Insert {
                    tab_name: "events".into(),
                    values: vec![Value::Int(id), Value::Datetime(at)],
                },
                &mut s,
            )
            .unwrap();
    }

    // Datetime column compared against its canonical string form
    let query = Query {
        tables: vec!["events".into()],
        cols: vec![TabCol::new("events", "id")],
        conds: vec![Condition {
            lhs_col: TabCol::new("events", "at"),
            op: CompOp::Gt,
            rhs: CondRhs::Value(Value::Str("2024-12-31 00:00:00".into())),
        }],
        order_by: vec![],
        limit: None,
    };
    assert_eq!(run_select(&engine, &mut s, query), vec![vec!["2"]]);

    let query = Query {
        tables: vec!["events".into()],
        cols: vec![TabCol::new("events", "at")],
        conds: vec![Condition {
            lhs_col: TabCol::new("events", "id"),
            op: CompOp::Eq,
            rhs: CondRhs::Value(Value::Int(1)),
        }],
        order_by: vec![],
        limit: None,
    };
    assert_eq!(
        run_select(&engine, &mut s, query),
        vec![vec!["2024-01-01 12:00:00"]]
    );
}

#[test]
fn test_show_desc_and_load() {
    let (engine, _dir) = open_engine();
    let mut s = session();
    create_scores(&engine, &mut s);
    engine
        .execute(
            &Statement::CreateIndex {
                tab_name: "scores".into(),
                col_names: vec!["id".into()],
            },
            &mut s,
        )
        .unwrap();

    let tables = engine.execute(&Statement::ShowTables, &mut s).unwrap();
    assert_eq!(tables.rows, vec![vec!["scores".to_string()]]);

    let desc = engine
        .execute(
            &Statement::DescTable {
                tab_name: "scores".into(),
            },
            &mut s,
        )
        .unwrap();
    assert_eq!(desc.rows[0], vec!["id", "INT", "YES"]);
    assert_eq!(desc.rows[1], vec!["name", "CHAR(8)", "NO"]);
    assert_eq!(desc.rows[2], vec!["score", "FLOAT", "NO"]);

    let shown = engine
        .execute(
            &Statement::ShowIndex {
                tab_name: "scores".into(),
            },
            &mut s,
        )
        .unwrap();
    assert_eq!(shown.rows, vec![vec!["scores", "unique", "(id)"]]);

    // LOAD goes through the normal insert path, indexes included
    let csv = engine.database().home().join("scores.csv");
    std::fs::write(&csv, "id,name,score\n5,eve,9.5\n6,mallory,0.5\n").unwrap();
    let loaded = engine
        .execute(
            &Statement::Load {
                file_name: csv.display().to_string(),
                tab_name: "scores".into(),
            },
            &mut s,
        )
        .unwrap();
    assert_eq!(loaded.affected, 2);

    let mut query = scores_query();
    query.cols = vec![TabCol::new("scores", "name")];
    query.conds = vec![Condition {
        lhs_col: TabCol::new("scores", "id"),
        op: CompOp::Eq,
        rhs: CondRhs::Value(Value::Int(5)),
    }];
    assert_eq!(run_select(&engine, &mut s, query), vec![vec!["eve"]]);
}

#[test]
fn test_composite_index_prefix_queries() {
    let (engine, _dir) = open_engine();
    let mut s = session();
    engine
        .execute(
            &Statement::CreateTable {
                tab_name: "t".into(),
                col_defs: vec![
                    ColDef {
                        name: "a".into(),
                        col_type: ColType::Int,
                        len: 4,
                    },
                    ColDef {
                        name: "b".into(),
                        col_type: ColType::Int,
                        len: 4,
                    },
                    ColDef {
                        name: "c".into(),
                        col_type: ColType::Int,
                        len: 4,
                    },
                ],
            },
            &mut s,
        )
        .unwrap();
    engine
        .execute(
            &Statement::CreateIndex {
                tab_name: "t".into(),
                col_names: vec!["a".into(), "b".into()],
            },
            &mut s,
        )
        .unwrap();
    for a in 1..=3 {
        for b in 1..=3 {
            engine
                .execute(
                    &Statement::Insert {
                        tab_name: "t".into(),
                        values: vec![Value::Int(a), Value::Int(b), Value::Int(a * 10 + b)],
                    },
                    &mut s,
                )
                .unwrap();
        }
    }

    // Equality on the full prefix
    let query = Query {
        tables: vec!["t".into()],
        cols: vec![TabCol::new("t", "c")],
        conds: vec![
            Condition {
                lhs_col: TabCol::new("t", "a"),
                op: CompOp::Eq,
                rhs: CondRhs::Value(Value::Int(2)),
            },
            Condition {
                lhs_col: TabCol::new("t", "b"),
                op: CompOp::Eq,
                rhs: CondRhs::Value(Value::Int(3)),
            },
        ],
        order_by: vec![],
        limit: None,
    };
    assert_eq!(run_select(&engine, &mut s, query), vec![vec!["23"]]);

    // Equality on a, range on b
    let query = Query {
        tables: vec!["t".into()],
        cols: vec![TabCol::new("t", "c")],
        conds: vec![
            Condition {
                lhs_col: TabCol::new("t", "a"),
                op: CompOp::Eq,
                rhs: CondRhs::Value(Value::Int(3)),
            },
            Condition {
                lhs_col: TabCol::new("t", "b"),
                op: CompOp::Ge,
                rhs: CondRhs::Value(Value::Int(2)),
            },
        ],
        order_by: vec![],
        limit: None,
    };
    let mut rows = run_select(&engine, &mut s, query);
    rows.sort();
    assert_eq!(rows, vec![vec!["32".to_string()], vec!["33".to_string()]]);
}

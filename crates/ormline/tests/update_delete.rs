mod common;

use common::{User, db_with, postgres, row, user};
use ormline::prelude::*;
use ormline::{ExecResult, Locking};

#[test]
fn save_updates_every_writable_field() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();

    let mut u = user(4, "d");
    u.company_id = Some(2);
    let executed = db.save(&cx, &mut u).unwrap();

    assert_eq!(
        executed.sql,
        r#"UPDATE "users" SET "name"=$1,"company_id"=$2 WHERE "users"."id" = $3"#
    );
    assert_eq!(
        executed.vars,
        vec![Value::Text("d".into()), Value::BigInt(2), Value::BigInt(4)]
    );
    assert_eq!(state.lock().unwrap().events, vec!["begin", "commit"]);
}

#[test]
fn save_with_zero_key_creates() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    state
        .lock()
        .unwrap()
        .results
        .push_back(vec![row(&["id"], vec![Value::BigInt(11)])]);

    let mut u = user(0, "new");
    let executed = db.save(&cx, &mut u).unwrap();
    assert!(executed.sql.starts_with(r#"INSERT INTO "users""#));
    assert_eq!(u.id, 11);
}

#[test]
fn save_matching_no_row_inserts_instead() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    state.lock().unwrap().exec_results.push_back(ExecResult::new(0));

    let mut u = user(4, "d");
    let executed = db.save(&cx, &mut u).unwrap();
    assert_eq!(
        executed.sql,
        concat!(
            r#"INSERT INTO "users" ("id","name","company_id") VALUES ($1,$2,$3) "#,
            r#"ON CONFLICT ("id") DO UPDATE SET "#,
            r#""name"=excluded."name","company_id"=excluded."company_id" "#,
            r#"RETURNING "id""#
        )
    );
    assert_eq!(u.id, 4);
}

#[test]
fn update_without_names_writes_non_zero_fields() {
    let cx = Cx::for_testing();
    let (db, _state) = postgres();

    let mut u = user(4, "d");
    let executed = db.update(&cx, &mut u, &[]).unwrap();
    assert_eq!(
        executed.sql,
        r#"UPDATE "users" SET "name"=$1 WHERE "users"."id" = $2"#
    );
}

#[test]
fn updates_assigns_and_writes_back() {
    let cx = Cx::for_testing();
    let (db, _state) = postgres();

    let mut u = user(4, "d");
    let executed = db
        .updates(
            &cx,
            &mut u,
            vec![
                ("Name", Value::Text("z".into())),
                ("company_id", Value::BigInt(9)),
            ],
        )
        .unwrap();
    assert_eq!(
        executed.sql,
        r#"UPDATE "users" SET "name"=$1,"company_id"=$2 WHERE "users"."id" = $3"#
    );
    assert_eq!(u.name, "z");
    assert_eq!(u.company_id, Some(9));
}

#[test]
fn unknown_field_is_rejected_before_running() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();

    let mut u = user(4, "d");
    let err = db.update(&cx, &mut u, &["Nickname"]).unwrap_err();
    assert!(err.to_string().contains("Nickname"), "{err}");
    assert!(state.lock().unwrap().all_sql().is_empty());
}

#[test]
fn conditions_narrow_an_update() {
    let cx = Cx::for_testing();
    let (db, _state) = postgres();

    let mut u = user(4, "d");
    let executed = db
        .filter(Condition::eq("CompanyID", 2_i64))
        .update(&cx, &mut u, &["Name"])
        .unwrap();
    assert_eq!(
        executed.sql,
        r#"UPDATE "users" SET "name"=$1 WHERE "users"."company_id" = $2 AND "users"."id" = $3"#
    );
}

#[test]
fn global_update_needs_permission() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();

    let mut u = user(0, "d");
    let err = db.update(&cx, &mut u, &["Name"]).unwrap_err();
    assert!(matches!(err, Error::MissingWhereClause));
    assert!(state.lock().unwrap().executed.is_empty());

    let allowed = db.session(SessionOptions {
        allow_global_update: true,
        ..SessionOptions::default()
    });
    let executed = allowed.update(&cx, &mut u, &["Name"]).unwrap();
    assert_eq!(executed.sql, r#"UPDATE "users" SET "name"=$1"#);
}

#[test]
fn delete_by_primary_key() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    state.lock().unwrap().exec_results.push_back(ExecResult::new(1));

    let executed = db.delete(&cx, &user(3, "c"), vec![]).unwrap();
    assert_eq!(executed.sql, r#"DELETE FROM "users" WHERE "users"."id" = $1"#);
    assert_eq!(executed.rows_affected, 1);
    assert_eq!(state.lock().unwrap().events, vec!["begin", "commit"]);
}

#[test]
fn delete_by_conditions_only() {
    let cx = Cx::for_testing();
    let (db, _state) = db_with(Dialect::Mysql, Config::default());

    let executed = db
        .delete(&cx, &user(0, ""), vec![Condition::eq("Name", "gone")])
        .unwrap();
    assert_eq!(executed.sql, "DELETE FROM `users` WHERE `users`.`name` = ?");
}

#[test]
fn delete_without_conditions_is_refused() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();

    let err = db.delete(&cx, &user(0, ""), vec![]).unwrap_err();
    assert!(matches!(err, Error::MissingWhereClause));
    let state = state.lock().unwrap();
    assert!(state.executed.is_empty());
    assert_eq!(state.events, vec!["begin", "rollback"]);
}

#[test]
fn zero_model_condition_does_not_count_as_a_where() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();

    let blank = user(0, "");
    let err = db
        .delete(&cx, &blank, vec![Condition::model(&blank)])
        .unwrap_err();
    assert!(matches!(err, Error::MissingWhereClause));
    assert!(state.lock().unwrap().executed.is_empty());

    let executed = db
        .delete(
            &cx,
            &blank,
            vec![Condition::model(&blank), Condition::eq("Name", "gone")],
        )
        .unwrap();
    assert_eq!(
        executed.sql,
        r#"DELETE FROM "users" WHERE "users"."name" = $1"#
    );
}

#[test]
fn exec_reports_rows_affected() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    state.lock().unwrap().exec_results.push_back(ExecResult::new(5));

    let executed = db
        .exec(&cx, "UPDATE users SET name = ? WHERE id IN ?", vec![
            Value::Text("x".into()),
            Value::Array(vec![Value::BigInt(1), Value::BigInt(2)]),
        ])
        .unwrap();
    assert_eq!(executed.rows_affected, 5);
    assert_eq!(executed.sql, "UPDATE users SET name = $1 WHERE id IN ($2,$3)");
    drop(state);
}

#[test]
fn locking_clause_is_appended() {
    let cx = Cx::for_testing();
    let (db, _state) = postgres();

    let mut users: Vec<User> = Vec::new();
    let executed = db
        .clauses([Locking::update().into()])
        .find(&cx, &mut users, vec![Condition::eq("ID", 1_i64)])
        .unwrap();
    assert_eq!(
        executed.sql,
        r#"SELECT * FROM "users" WHERE "users"."id" = $1 FOR UPDATE"#
    );
}

mod common;

use common::{User, postgres, row, user_row};
use ormline::ASSOCIATIONS;
use ormline::prelude::*;

fn account_row(id: i64, user_id: i64, number: &str) -> Row {
    row(
        &["id", "user_id", "number"],
        vec![Value::BigInt(id), Value::BigInt(user_id), Value::Text(number.into())],
    )
}

fn pet_row(id: i64, user_id: i64, name: &str) -> Row {
    row(
        &["id", "user_id", "name"],
        vec![Value::BigInt(id), Value::BigInt(user_id), Value::Text(name.into())],
    )
}

fn three_users() -> Vec<Row> {
    vec![user_row(1, "a", None), user_row(2, "b", None), user_row(3, "c", None)]
}

#[test]
fn has_one_costs_one_query_for_all_parents() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    {
        let mut state = state.lock().unwrap();
        state.results.push_back(three_users());
        state
            .results
            .push_back(vec![account_row(10, 1, "n1"), account_row(30, 3, "n3")]);
    }

    let mut users: Vec<User> = Vec::new();
    db.preload("Account", vec![]).find(&cx, &mut users, vec![]).unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.queries.len(), 2);
    assert_eq!(
        state.queries[1],
        (
            r#"SELECT * FROM "accounts" WHERE "accounts"."user_id" IN ($1,$2,$3)"#.to_string(),
            vec![Value::BigInt(1), Value::BigInt(2), Value::BigInt(3)]
        )
    );
    assert_eq!(users[0].account.as_ref().map(|a| a.number.as_str()), Some("n1"));
    assert_eq!(users[1].account, None);
    assert_eq!(users[2].account.as_ref().map(|a| a.id), Some(30));
}

#[test]
fn nested_path_loads_parent_first() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    {
        let mut state = state.lock().unwrap();
        state.results.push_back(vec![user_row(1, "a", None), user_row(2, "b", None)]);
        state.results.push_back(vec![
            pet_row(5, 1, "rex"),
            pet_row(6, 1, "tom"),
            pet_row(7, 2, "kit"),
        ]);
        state.results.push_back(vec![
            row(
                &["id", "pet_id", "name"],
                vec![Value::BigInt(50), Value::BigInt(5), Value::Text("ball".into())],
            ),
            row(
                &["id", "pet_id", "name"],
                vec![Value::BigInt(51), Value::BigInt(7), Value::Text("bone".into())],
            ),
        ]);
    }

    let mut users: Vec<User> = Vec::new();
    db.preload("Pets.Toys", vec![]).find(&cx, &mut users, vec![]).unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.queries.len(), 3);
    assert_eq!(
        state.queries[1].0,
        r#"SELECT * FROM "pets" WHERE "pets"."user_id" IN ($1,$2)"#
    );
    assert_eq!(
        state.queries[2],
        (
            r#"SELECT * FROM "toys" WHERE "toys"."pet_id" IN ($1,$2,$3)"#.to_string(),
            vec![Value::BigInt(5), Value::BigInt(6), Value::BigInt(7)]
        )
    );

    assert_eq!(users[0].pets.len(), 2);
    assert_eq!(users[0].pets[0].toys[0].name, "ball");
    assert!(users[0].pets[1].toys.is_empty());
    assert_eq!(users[1].pets[0].toys[0].name, "bone");
}

#[test]
fn extra_conditions_apply_to_their_path() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    state.lock().unwrap().results.push_back(vec![user_row(1, "a", None)]);

    let mut users: Vec<User> = Vec::new();
    db.preload("Pets", vec![Condition::eq("Name", "rex")])
        .find(&cx, &mut users, vec![])
        .unwrap();

    let state = state.lock().unwrap();
    assert_eq!(
        state.queries[1].0,
        r#"SELECT * FROM "pets" WHERE "pets"."user_id" IN ($1) AND "pets"."name" = $2"#
    );
    assert!(users[0].pets.is_empty());
}

#[test]
fn failed_path_skips_its_subtree_only() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    {
        let mut state = state.lock().unwrap();
        state.results.push_back(vec![user_row(1, "a", None)]);
        state.results.push_back(vec![account_row(10, 1, "n1")]);
        state.fail_on = Some(r#"FROM "pets""#.into());
    }

    let mut users: Vec<User> = Vec::new();
    let err = db
        .preload("Account", vec![])
        .preload("Pets.Toys", vec![])
        .find(&cx, &mut users, vec![])
        .unwrap_err();
    assert!(err.to_string().contains("mock failure"), "{err}");

    let state = state.lock().unwrap();
    assert!(state.all_sql().iter().all(|sql| !sql.contains("toys")));
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].account.as_ref().map(|a| a.id), Some(10));
}

#[test]
fn many_to_many_goes_through_the_join_table() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    {
        let mut state = state.lock().unwrap();
        state.results.push_back(vec![user_row(1, "a", None), user_row(2, "b", None)]);
        state.results.push_back(vec![
            row(&["user_id", "language_id"], vec![Value::BigInt(1), Value::BigInt(20)]),
            row(&["user_id", "language_id"], vec![Value::BigInt(2), Value::BigInt(20)]),
            row(&["user_id", "language_id"], vec![Value::BigInt(2), Value::BigInt(21)]),
        ]);
        state.results.push_back(vec![
            row(&["id", "name"], vec![Value::BigInt(20), Value::Text("en".into())]),
            row(&["id", "name"], vec![Value::BigInt(21), Value::Text("fr".into())]),
        ]);
    }

    let mut users: Vec<User> = Vec::new();
    db.preload("Languages", vec![]).find(&cx, &mut users, vec![]).unwrap();

    let state = state.lock().unwrap();
    assert_eq!(
        state.queries[1].0,
        r#"SELECT * FROM "user_languages" WHERE "user_languages"."user_id" IN ($1,$2)"#
    );
    assert_eq!(
        state.queries[2],
        (
            r#"SELECT * FROM "languages" WHERE "languages"."id" IN ($1,$2)"#.to_string(),
            vec![Value::BigInt(20), Value::BigInt(21)]
        )
    );
    let names = |u: &User| u.languages.iter().map(|l| l.name.clone()).collect::<Vec<_>>();
    assert_eq!(names(&users[0]), vec!["en"]);
    assert_eq!(names(&users[1]), vec!["en", "fr"]);
}

#[test]
fn belongs_to_skips_null_keys() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    {
        let mut state = state.lock().unwrap();
        state.results.push_back(vec![
            user_row(1, "a", Some(4)),
            user_row(2, "b", None),
            user_row(3, "c", Some(4)),
        ]);
        state.results.push_back(vec![row(
            &["id", "name"],
            vec![Value::BigInt(4), Value::Text("acme".into())],
        )]);
    }

    let mut users: Vec<User> = Vec::new();
    db.preload("Company", vec![]).find(&cx, &mut users, vec![]).unwrap();

    let state = state.lock().unwrap();
    assert_eq!(
        state.queries[1],
        (
            r#"SELECT * FROM "companies" WHERE "companies"."id" IN ($1)"#.to_string(),
            vec![Value::BigInt(4)]
        )
    );
    assert_eq!(users[0].company.as_ref().map(|c| c.name.as_str()), Some("acme"));
    assert_eq!(users[1].company, None);
    assert_eq!(users[2].company, users[0].company);
}

#[test]
fn no_parent_keys_means_no_query() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();

    let mut users: Vec<User> = Vec::new();
    db.preload(ASSOCIATIONS, vec![]).find(&cx, &mut users, vec![]).unwrap();

    assert_eq!(state.lock().unwrap().queries.len(), 1);
    assert!(users.is_empty());
}

#[test]
fn every_direct_association_with_wildcard() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    state.lock().unwrap().results.push_back(vec![user_row(1, "a", Some(4))]);

    let mut users: Vec<User> = Vec::new();
    db.preload(ASSOCIATIONS, vec![]).find(&cx, &mut users, vec![]).unwrap();

    let state = state.lock().unwrap();
    let tables: Vec<&str> = state.queries[1..]
        .iter()
        .map(|(sql, _)| sql.split('"').nth(1).unwrap_or_default())
        .collect();
    // Languages read the join table and stop there: no links, no targets.
    assert_eq!(tables, vec!["accounts", "companies", "user_languages", "pets"]);
}

#[test]
fn unknown_path_is_relation_not_found() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    state.lock().unwrap().results.push_back(vec![user_row(1, "a", None)]);

    let mut users: Vec<User> = Vec::new();
    let err = db
        .preload("Pets.Owner", vec![])
        .find(&cx, &mut users, vec![])
        .unwrap_err();
    assert!(err.is_relation_not_found());
    // "Pets" itself still loaded.
    assert_eq!(state.lock().unwrap().queries.len(), 2);
    assert_eq!(users.len(), 1);
}

mod common;

use common::{Company, Language, Pet, User, db_with, postgres, row, user};
use ormline::prelude::*;
use ormline::{ExecResult, OnConflict};

fn id_row(id: i64) -> Vec<Row> {
    vec![row(&["id"], vec![Value::BigInt(id)])]
}

#[test]
fn postgres_create_returns_generated_key() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    state.lock().unwrap().results.push_back(id_row(7));

    let mut u = user(0, "a");
    let executed = db.create(&cx, &mut u).unwrap();

    assert_eq!(
        executed.sql,
        r#"INSERT INTO "users" ("name","company_id") VALUES ($1,$2) RETURNING "id""#
    );
    assert_eq!(executed.vars, vec![Value::Text("a".into()), Value::Null]);
    assert_eq!(executed.rows_affected, 1);
    assert_eq!(u.id, 7);

    let state = state.lock().unwrap();
    assert_eq!(state.events, vec!["begin", "commit"]);
    assert!(state.executed.is_empty());
}

#[test]
fn explicit_key_is_written_and_kept() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    state.lock().unwrap().results.push_back(id_row(3));

    let mut u = user(3, "c");
    let executed = db.create(&cx, &mut u).unwrap();
    assert_eq!(
        executed.sql,
        r#"INSERT INTO "users" ("id","name","company_id") VALUES ($1,$2,$3) RETURNING "id""#
    );
    assert_eq!(u.id, 3);
    drop(state);
}

#[test]
fn mysql_batch_assigns_ascending_ids_from_last_insert_id() {
    let cx = Cx::for_testing();
    let (db, state) = db_with(Dialect::Mysql, Config::default());
    state
        .lock()
        .unwrap()
        .exec_results
        .push_back(ExecResult::new(3).with_last_insert_id(10));

    let mut users = vec![user(0, "a"), user(0, "b"), user(0, "c")];
    let executed = db.create_batch(&cx, &mut users).unwrap();

    assert_eq!(
        executed.sql,
        "INSERT INTO `users` (`name`,`company_id`) VALUES (?,?),(?,?),(?,?)"
    );
    assert_eq!(executed.rows_affected, 3);
    assert_eq!(users.iter().map(|u| u.id).collect::<Vec<_>>(), vec![10, 11, 12]);
}

#[test]
fn reversed_last_insert_id_counts_down_from_the_last_record() {
    let cx = Cx::for_testing();
    let mut config = Config::default();
    config.create.last_insert_id_reversed = true;
    let (db, state) = db_with(Dialect::Mysql, config);
    state
        .lock()
        .unwrap()
        .exec_results
        .push_back(ExecResult::new(2).with_last_insert_id(21));

    let mut users = vec![user(0, "a"), user(0, "b")];
    db.create_batch(&cx, &mut users).unwrap();
    assert_eq!(users.iter().map(|u| u.id).collect::<Vec<_>>(), vec![20, 21]);
}

#[test]
fn without_returning_postgres_falls_back_to_execute() {
    let cx = Cx::for_testing();
    let mut config = Config::default();
    config.create.with_returning = false;
    let (db, state) = db_with(Dialect::Postgres, config);

    let mut u = user(0, "a");
    let executed = db.create(&cx, &mut u).unwrap();
    assert_eq!(
        executed.sql,
        r#"INSERT INTO "users" ("name","company_id") VALUES ($1,$2)"#
    );
    assert_eq!(u.id, 0);
    assert_eq!(state.lock().unwrap().executed.len(), 1);
}

#[test]
fn belongs_to_target_is_created_first_and_its_key_copied() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    {
        let mut state = state.lock().unwrap();
        state.results.push_back(id_row(5));
        state.results.push_back(id_row(8));
    }

    let mut u = user(0, "a");
    u.company = Some(Company {
        id: 0,
        name: "acme".into(),
    });
    db.create(&cx, &mut u).unwrap();

    assert_eq!(u.id, 8);
    assert_eq!(u.company_id, Some(5));
    assert_eq!(u.company.as_ref().map(|c| c.id), Some(5));

    let state = state.lock().unwrap();
    assert_eq!(
        state.queries[0].0,
        r#"INSERT INTO "companies" ("name") VALUES ($1) RETURNING "id""#
    );
    assert_eq!(
        state.queries[1],
        (
            r#"INSERT INTO "users" ("name","company_id") VALUES ($1,$2) RETURNING "id""#
                .to_string(),
            vec![Value::Text("a".into()), Value::BigInt(5)]
        )
    );
    // One default transaction around the whole save.
    assert_eq!(state.events, vec!["begin", "commit"]);
}

#[test]
fn existing_belongs_to_target_is_only_referenced() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    state.lock().unwrap().results.push_back(id_row(9));

    let mut u = user(0, "a");
    u.company = Some(Company {
        id: 4,
        name: "acme".into(),
    });
    db.create(&cx, &mut u).unwrap();

    assert_eq!(u.company_id, Some(4));
    let state = state.lock().unwrap();
    assert_eq!(state.queries.len(), 1);
    assert!(state.queries[0].0.starts_with(r#"INSERT INTO "users""#));
}

#[test]
fn has_many_children_get_the_owner_key() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    {
        let mut state = state.lock().unwrap();
        state.results.push_back(id_row(7));
        state.results.push_back(vec![
            row(&["id"], vec![Value::BigInt(100)]),
            row(&["id"], vec![Value::BigInt(101)]),
        ]);
    }

    let mut u = user(0, "a");
    u.pets = vec![
        Pet {
            name: "rex".into(),
            ..Pet::default()
        },
        Pet {
            name: "tom".into(),
            ..Pet::default()
        },
    ];
    db.create(&cx, &mut u).unwrap();

    assert_eq!(
        u.pets.iter().map(|p| (p.id, p.user_id)).collect::<Vec<_>>(),
        vec![(100, 7), (101, 7)]
    );
    let state = state.lock().unwrap();
    assert_eq!(
        state.queries[1],
        (
            r#"INSERT INTO "pets" ("user_id","name") VALUES ($1,$2),($3,$4) RETURNING "id""#
                .to_string(),
            vec![
                Value::BigInt(7),
                Value::Text("rex".into()),
                Value::BigInt(7),
                Value::Text("tom".into()),
            ]
        )
    );
}

#[test]
fn existing_children_are_upserted_on_their_key() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    state.lock().unwrap().results.push_back(id_row(7));

    let mut u = user(0, "a");
    u.pets = vec![Pet {
        id: 40,
        name: "rex".into(),
        ..Pet::default()
    }];
    db.create(&cx, &mut u).unwrap();

    let state = state.lock().unwrap();
    assert_eq!(
        state.queries[1].0,
        concat!(
            r#"INSERT INTO "pets" ("id","user_id","name") VALUES ($1,$2,$3) "#,
            r#"ON CONFLICT ("id") DO UPDATE SET "user_id"=excluded."user_id" RETURNING "id""#
        )
    );
    assert_eq!(u.pets[0].user_id, 7);
}

#[test]
fn many_to_many_links_are_inserted_after_new_targets() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    {
        let mut state = state.lock().unwrap();
        state.results.push_back(id_row(7));
        state.results.push_back(id_row(30));
    }

    let mut u = user(0, "a");
    u.languages = vec![
        Language {
            id: 0,
            name: "en".into(),
        },
        Language {
            id: 3,
            name: "fr".into(),
        },
    ];
    db.create(&cx, &mut u).unwrap();

    assert_eq!(u.languages.iter().map(|l| l.id).collect::<Vec<_>>(), vec![30, 3]);
    let state = state.lock().unwrap();
    assert_eq!(
        state.queries[1].0,
        r#"INSERT INTO "languages" ("name") VALUES ($1) RETURNING "id""#
    );
    assert_eq!(
        state.executed[0],
        (
            concat!(
                r#"INSERT INTO "user_languages" ("user_id","language_id") "#,
                r#"VALUES ($1,$2),($3,$4) ON CONFLICT DO NOTHING"#
            )
            .to_string(),
            vec![Value::BigInt(7), Value::BigInt(30), Value::BigInt(7), Value::BigInt(3)]
        )
    );
}

#[test]
fn omitted_association_is_not_saved() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    state.lock().unwrap().results.push_back(id_row(7));

    let mut u = user(0, "a");
    u.company = Some(Company {
        id: 0,
        name: "acme".into(),
    });
    db.omit("Company").create(&cx, &mut u).unwrap();

    assert_eq!(u.company_id, None);
    let state = state.lock().unwrap();
    assert_eq!(state.queries.len(), 1);
    assert!(state.queries[0].0.starts_with(r#"INSERT INTO "users""#));
}

#[test]
fn selected_fields_limit_saved_associations() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    {
        let mut state = state.lock().unwrap();
        state.results.push_back(id_row(7));
        state.results.push_back(id_row(8));
        state.results.push_back(id_row(100));
    }

    let with_pet = || {
        let mut u = user(0, "a");
        u.pets = vec![Pet {
            name: "rex".into(),
            ..Pet::default()
        }];
        u
    };

    let mut u = with_pet();
    db.select("Name").create(&cx, &mut u).unwrap();
    assert_eq!(u.id, 7);
    assert_eq!(u.pets[0].id, 0);

    let mut u = with_pet();
    db.select("Name, Pets").create(&cx, &mut u).unwrap();
    assert_eq!(u.pets[0].id, 100);

    let state = state.lock().unwrap();
    assert_eq!(
        state.all_sql(),
        vec![
            r#"INSERT INTO "users" ("name") VALUES ($1) RETURNING "id""#,
            r#"INSERT INTO "users" ("name") VALUES ($1) RETURNING "id""#,
            r#"INSERT INTO "pets" ("user_id","name") VALUES ($1,$2) RETURNING "id""#,
        ]
    );
}

#[test]
fn omitting_a_field_leaves_its_column_out() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    state.lock().unwrap().results.push_back(id_row(7));

    let mut u = user(0, "a");
    let executed = db.omit("CompanyID").create(&cx, &mut u).unwrap();
    assert_eq!(
        executed.sql,
        r#"INSERT INTO "users" ("name") VALUES ($1) RETURNING "id""#
    );
    drop(state);
}

#[test]
fn conflict_clause_is_rendered_before_returning() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    state.lock().unwrap().results.push_back(id_row(7));

    let mut u = user(0, "a");
    let executed = db
        .clauses([OnConflict::do_nothing().into()])
        .create(&cx, &mut u)
        .unwrap();
    assert_eq!(
        executed.sql,
        concat!(
            r#"INSERT INTO "users" ("name","company_id") VALUES ($1,$2) "#,
            r#"ON CONFLICT DO NOTHING RETURNING "id""#
        )
    );
    drop(state);
}

#[test]
fn dry_run_create_issues_nothing() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    let dry = db.session(SessionOptions {
        dry_run: true,
        ..SessionOptions::default()
    });

    let mut u = user(0, "a");
    u.company = Some(Company {
        id: 0,
        name: "acme".into(),
    });
    let executed = dry.create(&cx, &mut u).unwrap();
    assert!(executed.sql.starts_with(r#"INSERT INTO "users""#));
    assert_eq!(u.id, 0);

    let state = state.lock().unwrap();
    assert!(state.all_sql().is_empty());
    assert!(state.events.is_empty());
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Speaks {
    user_id: i64,
    language_id: i64,
    level: i64,
}

impl Model for Speaks {
    fn describe() -> ModelDef {
        ModelDef::new("Speaks")
            .table("user_speaks")
            .field(FieldInfo::new("UserID").primary_key(true))
            .field(FieldInfo::new("LanguageID").primary_key(true))
            .field(FieldInfo::new("Level"))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("UserID", self.user_id)
            .with("LanguageID", self.language_id)
            .with("Level", self.level)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            user_id: record.get_as("UserID")?,
            language_id: record.get_as("LanguageID")?,
            level: record.get_as::<Option<i64>>("Level")?.unwrap_or_default(),
        })
    }
}

#[test]
fn join_model_replaces_the_join_table() {
    let cx = Cx::for_testing();
    let (db, state) = postgres();
    state.lock().unwrap().results.push_back(id_row(7));

    db.setup_join_table::<User, Speaks>("Languages").unwrap();
    let join = db.schema_of::<User>().unwrap();
    let join = join.relationship("Languages").unwrap().join_table.clone().unwrap();
    assert_eq!(join.table, "user_speaks");

    let mut u = user(0, "a");
    u.languages = vec![Language {
        id: 3,
        name: "fr".into(),
    }];
    db.create(&cx, &mut u).unwrap();
    assert_eq!(
        state.lock().unwrap().executed[0].0,
        concat!(
            r#"INSERT INTO "user_speaks" ("user_id","language_id") "#,
            r#"VALUES ($1,$2) ON CONFLICT DO NOTHING"#
        )
    );
}

#[test]
fn join_model_must_carry_the_join_columns() {
    let (db, _state) = postgres();

    let err = db.setup_join_table::<User, Company>("Languages").unwrap_err();
    assert!(matches!(
        err,
        Error::Schema(ref e) if e.kind == ormline_core::SchemaErrorKind::MissingField
    ));
    assert!(err.to_string().contains("missing field user_id for join table"), "{err}");

    let err = db.setup_join_table::<User, Speaks>("Pets").unwrap_err();
    assert!(err.to_string().contains("Pets: not a many-to-many relationship"), "{err}");
    assert!(db.setup_join_table::<User, Speaks>("Friends").is_err());
}

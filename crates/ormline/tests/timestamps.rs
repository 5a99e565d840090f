mod common;

use common::{MockState, db_with, row};
use ormline::prelude::*;
use std::sync::Mutex;

#[derive(Debug, Clone, Default, PartialEq)]
struct Post {
    id: i64,
    title: String,
    created_at: i64,
    updated_at: i64,
}

impl Model for Post {
    fn describe() -> ModelDef {
        ModelDef::new("Post")
            .field(FieldInfo::new("ID").primary_key(true).auto_increment(true))
            .field(FieldInfo::new("Title"))
            .field(FieldInfo::new("CreatedAt"))
            .field(FieldInfo::new("UpdatedAt"))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("ID", self.id)
            .with("Title", &self.title)
            .with("CreatedAt", Value::Timestamp(self.created_at))
            .with("UpdatedAt", Value::Timestamp(self.updated_at))
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: record.get_as("ID")?,
            title: record.get_as::<Option<String>>("Title")?.unwrap_or_default(),
            created_at: record.get_as::<Option<i64>>("CreatedAt")?.unwrap_or_default(),
            updated_at: record.get_as::<Option<i64>>("UpdatedAt")?.unwrap_or_default(),
        })
    }
}

fn clocked() -> (Db, Arc<Mutex<MockState>>) {
    db_with(
        Dialect::Postgres,
        Config {
            now_func: NowFunc::fixed(1_000),
            ..Config::default()
        },
    )
}

fn post(id: i64, stamp: i64) -> Post {
    Post {
        id,
        title: "b".into(),
        created_at: stamp,
        updated_at: stamp,
    }
}

#[test]
fn create_fills_zero_times_from_the_clock() {
    let cx = Cx::for_testing();
    let (db, state) = clocked();
    state
        .lock()
        .unwrap()
        .results
        .push_back(vec![row(&["id"], vec![Value::BigInt(1)])]);

    let mut p = post(0, 0);
    let executed = db.create(&cx, &mut p).unwrap();
    assert_eq!(
        executed.sql,
        concat!(
            r#"INSERT INTO "posts" ("title","created_at","updated_at") "#,
            r#"VALUES ($1,$2,$3) RETURNING "id""#
        )
    );
    assert_eq!(
        executed.vars,
        vec![
            Value::Text("b".into()),
            Value::Timestamp(1_000),
            Value::Timestamp(1_000),
        ]
    );
    assert_eq!((p.id, p.created_at, p.updated_at), (1, 1_000, 1_000));
}

#[test]
fn preset_times_are_kept_on_create() {
    let cx = Cx::for_testing();
    let (db, _state) = clocked();

    let mut p = post(0, 77);
    let executed = db.create(&cx, &mut p).unwrap();
    assert_eq!(executed.vars[1..], [Value::Timestamp(77), Value::Timestamp(77)]);
    assert_eq!((p.created_at, p.updated_at), (77, 77));
}

#[test]
fn session_clock_overrides_the_handle_clock() {
    let cx = Cx::for_testing();
    let (db, _state) = clocked();
    let later = db.session(SessionOptions {
        now_func: Some(NowFunc::fixed(2_000)),
        ..SessionOptions::default()
    });

    let mut p = post(0, 0);
    later.create(&cx, &mut p).unwrap();
    assert_eq!((p.created_at, p.updated_at), (2_000, 2_000));

    let mut p = post(0, 0);
    db.create(&cx, &mut p).unwrap();
    assert_eq!(p.created_at, 1_000);
}

#[test]
fn update_refreshes_the_update_time() {
    let cx = Cx::for_testing();
    let (db, _state) = clocked();

    let mut p = post(3, 5);
    let executed = db.update(&cx, &mut p, &["Title"]).unwrap();
    assert_eq!(
        executed.sql,
        r#"UPDATE "posts" SET "title"=$1,"updated_at"=$2 WHERE "posts"."id" = $3"#
    );
    assert_eq!(executed.vars[1], Value::Timestamp(1_000));
    assert_eq!((p.created_at, p.updated_at), (5, 1_000));
}

#[test]
fn save_keeps_creation_time_and_refreshes_update_time() {
    let cx = Cx::for_testing();
    let (db, _state) = clocked();

    let mut p = post(3, 5);
    let executed = db.save(&cx, &mut p).unwrap();
    assert_eq!(
        executed.sql,
        concat!(
            r#"UPDATE "posts" SET "title"=$1,"created_at"=$2,"updated_at"=$3 "#,
            r#"WHERE "posts"."id" = $4"#
        )
    );
    assert_eq!(
        executed.vars[1..3],
        [Value::Timestamp(5), Value::Timestamp(1_000)]
    );
    assert_eq!(p.updated_at, 1_000);
}

#[test]
fn update_column_leaves_the_update_time_alone() {
    let cx = Cx::for_testing();
    let (db, _state) = clocked();

    let mut p = post(3, 5);
    let executed = db.update_column(&cx, &mut p, "Title", "c").unwrap();
    assert_eq!(
        executed.sql,
        r#"UPDATE "posts" SET "title"=$1 WHERE "posts"."id" = $2"#
    );
    assert_eq!((p.title.as_str(), p.updated_at), ("c", 5));
}

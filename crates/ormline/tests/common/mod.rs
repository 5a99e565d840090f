#![allow(dead_code)]

use ormline::prelude::*;
use ormline::{ExecResult, Outcome, Related};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Everything the mock saw, plus scripted results.
#[derive(Debug, Default)]
pub struct MockState {
    pub queries: Vec<(String, Vec<Value>)>,
    pub executed: Vec<(String, Vec<Value>)>,
    /// "begin", "commit", "rollback", in order
    pub events: Vec<String>,
    /// Returned by `query`, one entry per call; empty once exhausted
    pub results: VecDeque<Vec<Row>>,
    /// Reported by `execute`; defaults to one row affected
    pub exec_results: VecDeque<ExecResult>,
    /// Statements containing this text fail
    pub fail_on: Option<String>,
    /// `commit` records its event and then fails
    pub fail_commit: bool,
    /// `rollback` records its event and then fails
    pub fail_rollback: bool,
}

impl MockState {
    pub fn all_sql(&self) -> Vec<&str> {
        let mut all: Vec<&str> = self.queries.iter().map(|(s, _)| s.as_str()).collect();
        all.extend(self.executed.iter().map(|(s, _)| s.as_str()));
        all
    }
}

#[derive(Debug, Clone)]
pub struct MockExecutor {
    pub state: Arc<Mutex<MockState>>,
    in_tx: bool,
}

impl MockExecutor {
    pub fn new() -> (Arc<dyn Executor>, Arc<Mutex<MockState>>) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let conn = MockExecutor {
            state: Arc::clone(&state),
            in_tx: false,
        };
        (Arc::new(conn), state)
    }

    fn failure(&self, sql: &str) -> Option<Error> {
        let state = self.state.lock().unwrap();
        state
            .fail_on
            .as_ref()
            .filter(|needle| sql.contains(needle.as_str()))
            .map(|_| Error::Custom(format!("mock failure: {sql}")))
    }
}

impl Executor for MockExecutor {
    fn query(&self, _cx: &Cx, sql: &str, params: &[Value]) -> Outcome<Vec<Row>, Error> {
        if let Some(e) = self.failure(sql) {
            return Outcome::Err(e);
        }
        let mut state = self.state.lock().unwrap();
        state.queries.push((sql.to_string(), params.to_vec()));
        Outcome::Ok(state.results.pop_front().unwrap_or_default())
    }

    fn execute(&self, _cx: &Cx, sql: &str, params: &[Value]) -> Outcome<ExecResult, Error> {
        if let Some(e) = self.failure(sql) {
            return Outcome::Err(e);
        }
        let mut state = self.state.lock().unwrap();
        state.executed.push((sql.to_string(), params.to_vec()));
        Outcome::Ok(state.exec_results.pop_front().unwrap_or(ExecResult::new(1)))
    }

    fn begin(&self, _cx: &Cx) -> Outcome<Arc<dyn Executor>, Error> {
        self.state.lock().unwrap().events.push("begin".into());
        Outcome::Ok(Arc::new(MockExecutor {
            state: Arc::clone(&self.state),
            in_tx: true,
        }))
    }

    fn commit(&self, _cx: &Cx) -> Outcome<(), Error> {
        let mut state = self.state.lock().unwrap();
        state.events.push("commit".into());
        if state.fail_commit {
            return Outcome::Err(Error::Custom("mock commit failure".into()));
        }
        Outcome::Ok(())
    }

    fn rollback(&self, _cx: &Cx) -> Outcome<(), Error> {
        let mut state = self.state.lock().unwrap();
        state.events.push("rollback".into());
        if state.fail_rollback {
            return Outcome::Err(Error::Custom("mock rollback failure".into()));
        }
        Outcome::Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_tx
    }
}

pub fn row(columns: &[&str], values: Vec<Value>) -> Row {
    Row::new(columns.iter().map(|c| (*c).to_string()).collect(), values)
}

pub fn db_with(dialect: Dialect, config: Config) -> (Db, Arc<Mutex<MockState>>) {
    let (conn, state) = MockExecutor::new();
    let db = Db::builder(conn).dialect(dialect).config(config).build();
    (db, state)
}

pub fn postgres() -> (Db, Arc<Mutex<MockState>>) {
    db_with(Dialect::Postgres, Config::default())
}

// Models

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Company {
    pub id: i64,
    pub name: String,
}

impl Model for Company {
    fn describe() -> ModelDef {
        ModelDef::new("Company")
            .field(FieldInfo::new("ID").primary_key(true).auto_increment(true))
            .field(FieldInfo::new("Name"))
    }

    fn to_record(&self) -> Record {
        Record::new().with("ID", self.id).with("Name", &self.name)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: record.get_as("ID")?,
            name: record.get_as::<Option<String>>("Name")?.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub number: String,
}

impl Model for Account {
    fn describe() -> ModelDef {
        ModelDef::new("Account")
            .field(FieldInfo::new("ID").primary_key(true).auto_increment(true))
            .field(FieldInfo::new("UserID"))
            .field(FieldInfo::new("Number"))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("ID", self.id)
            .with("UserID", self.user_id)
            .with("Number", &self.number)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: record.get_as("ID")?,
            user_id: record.get_as::<Option<i64>>("UserID")?.unwrap_or_default(),
            number: record.get_as::<Option<String>>("Number")?.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Toy {
    pub id: i64,
    pub pet_id: i64,
    pub name: String,
}

impl Model for Toy {
    fn describe() -> ModelDef {
        ModelDef::new("Toy")
            .field(FieldInfo::new("ID").primary_key(true).auto_increment(true))
            .field(FieldInfo::new("PetID"))
            .field(FieldInfo::new("Name"))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("ID", self.id)
            .with("PetID", self.pet_id)
            .with("Name", &self.name)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: record.get_as("ID")?,
            pet_id: record.get_as::<Option<i64>>("PetID")?.unwrap_or_default(),
            name: record.get_as::<Option<String>>("Name")?.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pet {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub toys: Vec<Toy>,
}

impl Model for Pet {
    fn describe() -> ModelDef {
        ModelDef::new("Pet")
            .field(FieldInfo::new("ID").primary_key(true).auto_increment(true))
            .field(FieldInfo::new("UserID"))
            .field(FieldInfo::new("Name"))
            .relationship(RelationshipInfo::has_many::<Toy>("Toys"))
    }

    fn to_record(&self) -> Record {
        let record = Record::new()
            .with("ID", self.id)
            .with("UserID", self.user_id)
            .with("Name", &self.name);
        if self.toys.is_empty() {
            record
        } else {
            record.with_many("Toys", self.toys.iter().map(Toy::to_record).collect())
        }
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: record.get_as("ID")?,
            user_id: record.get_as::<Option<i64>>("UserID")?.unwrap_or_default(),
            name: record.get_as::<Option<String>>("Name")?.unwrap_or_default(),
            toys: record.many("Toys").iter().map(Toy::from_record).collect::<Result<_>>()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Language {
    pub id: i64,
    pub name: String,
}

impl Model for Language {
    fn describe() -> ModelDef {
        ModelDef::new("Language")
            .field(FieldInfo::new("ID").primary_key(true).auto_increment(true))
            .field(FieldInfo::new("Name"))
    }

    fn to_record(&self) -> Record {
        Record::new().with("ID", self.id).with("Name", &self.name)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: record.get_as("ID")?,
            name: record.get_as::<Option<String>>("Name")?.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub company_id: Option<i64>,
    pub company: Option<Company>,
    pub account: Option<Account>,
    pub pets: Vec<Pet>,
    pub languages: Vec<Language>,
}

impl Model for User {
    fn describe() -> ModelDef {
        ModelDef::new("User")
            .field(FieldInfo::new("ID").primary_key(true).auto_increment(true))
            .field(FieldInfo::new("Name"))
            .field(FieldInfo::new("CompanyID"))
            .relationship(RelationshipInfo::belongs_to::<Company>("Company"))
            .relationship(RelationshipInfo::has_one::<Account>("Account"))
            .relationship(RelationshipInfo::has_many::<Pet>("Pets"))
            .relationship(RelationshipInfo::many_to_many::<Language>("Languages", "user_languages"))
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("ID", self.id)
            .with("Name", &self.name)
            .with("CompanyID", self.company_id.map_or(Value::Null, Value::BigInt));
        if let Some(company) = &self.company {
            record.set_relation("Company", Related::One(Some(Box::new(company.to_record()))));
        }
        if let Some(account) = &self.account {
            record.set_relation("Account", Related::One(Some(Box::new(account.to_record()))));
        }
        if !self.pets.is_empty() {
            record.set_relation(
                "Pets",
                Related::Many(self.pets.iter().map(Pet::to_record).collect()),
            );
        }
        if !self.languages.is_empty() {
            record.set_relation(
                "Languages",
                Related::Many(self.languages.iter().map(Language::to_record).collect()),
            );
        }
        record
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: record.get_as("ID")?,
            name: record.get_as::<Option<String>>("Name")?.unwrap_or_default(),
            company_id: record.get_as("CompanyID")?,
            company: record.one("Company").map(Company::from_record).transpose()?,
            account: record.one("Account").map(Account::from_record).transpose()?,
            pets: record.many("Pets").iter().map(Pet::from_record).collect::<Result<_>>()?,
            languages: record
                .many("Languages")
                .iter()
                .map(Language::from_record)
                .collect::<Result<_>>()?,
        })
    }
}

pub fn user(id: i64, name: &str) -> User {
    User {
        id,
        name: name.to_string(),
        ..User::default()
    }
}

pub fn user_row(id: i64, name: &str, company_id: Option<i64>) -> Row {
    row(
        &["id", "name", "company_id"],
        vec![
            Value::BigInt(id),
            Value::Text(name.to_string()),
            company_id.map_or(Value::Null, Value::BigInt),
        ],
    )
}

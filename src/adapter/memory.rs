//! In-memory servers implementing [`DatabaseAdapter`].
//!
//! A [`MemoryCluster`] holds any number of named servers, each with
//! databases, tables, logins and links to other servers of the cluster. It
//! keeps a per-server log of every operation and can be told to fail, stall
//! or miscount specific operations, which is what the provisioning and sync
//! tests are built on.

use super::error::AdapterError;
use super::factory::AdapterFactory;
use super::models::{
    ColumnDef, DbKind, Description, IndexDef, LoginSpec, RemoteInsert, RowFilter, RowSet,
    SqlValue, TableDef, TableInfo, TableName,
};
use super::DatabaseAdapter;
use crate::external::{ConnectionResolver, ServerConnection};
use crate::options::extract_database_name;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
struct MemoryTable {
    def: TableDef,
    rows: Vec<Vec<SqlValue>>,
    indexes: Vec<IndexDef>,
    descriptions: Vec<Description>,
    constraints_enabled: bool,
}

impl MemoryTable {
    fn new(def: TableDef) -> Self {
        Self {
            def,
            rows: Vec::new(),
            indexes: Vec::new(),
            descriptions: Vec::new(),
            constraints_enabled: true,
        }
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.def
            .columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn identity_index(&self) -> Option<usize> {
        self.def.columns.iter().position(|c| c.is_identity)
    }

    fn next_identity(&self, idx: usize) -> i64 {
        self.rows
            .iter()
            .filter_map(|row| row.get(idx).and_then(SqlValue::as_i64))
            .max()
            .unwrap_or(0)
            + 1
    }

    fn row_matches(&self, row: &[SqlValue], filter: Option<&RowFilter>) -> bool {
        let Some(filter) = filter else {
            return true;
        };
        match self.column_index(&filter.column).and_then(|i| row.get(i)) {
            Some(value) if filter.value.is_null() => value.is_null(),
            Some(value) => !value.is_null() && value.display_string() == filter.value.display_string(),
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryDatabase {
    name: String,
    tables: Vec<MemoryTable>,
}

impl MemoryDatabase {
    fn table(&self, name: &TableName) -> Option<&MemoryTable> {
        self.tables.iter().find(|t| t.def.table.matches(name))
    }

    fn table_mut(&mut self, name: &TableName) -> Option<&mut MemoryTable> {
        self.tables.iter_mut().find(|t| t.def.table.matches(name))
    }
}

#[derive(Debug, Clone)]
struct LoggedOperation {
    text: String,
    write: bool,
}

#[derive(Debug)]
struct MemoryServer {
    kind: DbKind,
    databases: BTreeMap<String, MemoryDatabase>,
    logins: BTreeSet<String>,
    links: BTreeMap<String, String>,
    log: Vec<LoggedOperation>,
}

impl MemoryServer {
    fn database(&self, name: &str) -> Option<&MemoryDatabase> {
        self.databases.get(&name.to_ascii_uppercase())
    }

    fn database_mut(&mut self, name: &str) -> Option<&mut MemoryDatabase> {
        self.databases.get_mut(&name.to_ascii_uppercase())
    }
}

#[derive(Debug)]
struct FailureRule {
    pattern: String,
    error: AdapterError,
    /// Matches let through before the rule starts failing.
    skip: usize,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct ClusterState {
    servers: HashMap<String, MemoryServer>,
    failures: Vec<FailureRule>,
    delays: Vec<(String, Duration)>,
    stubs: Vec<(String, RowSet)>,
    count_skews: Vec<(String, TableName, i64)>,
}

impl ClusterState {
    fn server(&self, id: &str) -> Result<&MemoryServer, AdapterError> {
        self.servers
            .get(id)
            .ok_or_else(|| AdapterError::Connection(format!("Unknown server: {}", id)))
    }

    fn server_mut(&mut self, id: &str) -> Result<&mut MemoryServer, AdapterError> {
        self.servers
            .get_mut(id)
            .ok_or_else(|| AdapterError::Connection(format!("Unknown server: {}", id)))
    }

    fn take_failure(&mut self, text: &str) -> Option<AdapterError> {
        let upper = text.to_ascii_uppercase();
        let rule = self
            .failures
            .iter_mut()
            .find(|r| r.remaining != Some(0) && upper.contains(&r.pattern))?;
        if rule.skip > 0 {
            rule.skip -= 1;
            return None;
        }
        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(rule.error.clone())
    }

    fn delay_for(&self, text: &str) -> Option<Duration> {
        let upper = text.to_ascii_uppercase();
        self.delays
            .iter()
            .find(|(pattern, _)| upper.contains(pattern))
            .map(|(_, d)| *d)
    }
}

fn missing_database(name: &str) -> AdapterError {
    AdapterError::Query(format!(
        "Database '{}' does not exist. Make sure that the name is entered correctly.",
        name
    ))
}

fn missing_table(name: &TableName) -> AdapterError {
    AdapterError::Query(format!("Invalid object name '{}'.", name))
}

/// A set of in-memory servers. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // =========================================================================
    // Fixture setup
    // =========================================================================

    pub fn add_server(&self, id: &str, kind: DbKind) {
        self.lock().servers.insert(
            id.to_string(),
            MemoryServer {
                kind,
                databases: BTreeMap::new(),
                logins: BTreeSet::new(),
                links: BTreeMap::new(),
                log: Vec::new(),
            },
        );
    }

    pub fn create_database(&self, server: &str, database: &str) {
        if let Some(s) = self.lock().servers.get_mut(server) {
            s.databases.insert(
                database.to_ascii_uppercase(),
                MemoryDatabase {
                    name: database.to_string(),
                    tables: Vec::new(),
                },
            );
        }
    }

    /// Adds a table; `rows` are in the column order of `def`.
    pub fn add_table(&self, server: &str, database: &str, def: TableDef, rows: Vec<Vec<SqlValue>>) {
        let mut state = self.lock();
        if let Some(db) = state
            .servers
            .get_mut(server)
            .and_then(|s| s.database_mut(database))
        {
            let mut table = MemoryTable::new(def);
            table.rows = rows;
            db.tables.push(table);
        }
    }

    pub fn add_index(&self, server: &str, database: &str, index: IndexDef) {
        self.with_table(server, database, &index.table.clone(), |t| t.indexes.push(index));
    }

    pub fn add_description(&self, server: &str, database: &str, description: Description) {
        self.with_table(server, database, &description.table.clone(), |t| {
            t.descriptions.push(description)
        });
    }

    /// Registers `link` on `server`, pointing at `remote_server`.
    pub fn add_link(&self, server: &str, link: &str, remote_server: &str) {
        if let Some(s) = self.lock().servers.get_mut(server) {
            s.links.insert(link.to_string(), remote_server.to_string());
        }
    }

    fn with_table(
        &self,
        server: &str,
        database: &str,
        table: &TableName,
        f: impl FnOnce(&mut MemoryTable),
    ) {
        let mut state = self.lock();
        if let Some(t) = state
            .servers
            .get_mut(server)
            .and_then(|s| s.database_mut(database))
            .and_then(|db| db.table_mut(table))
        {
            f(t);
        }
    }

    // =========================================================================
    // Fault injection
    // =========================================================================

    /// Every operation whose SQL or label contains `pattern` fails with `error`.
    pub fn fail_on(&self, pattern: &str, error: AdapterError) {
        self.lock().failures.push(FailureRule {
            pattern: pattern.to_ascii_uppercase(),
            error,
            skip: 0,
            remaining: None,
        });
    }

    /// Like [`MemoryCluster::fail_on`], for the next `times` matches only.
    pub fn fail_times(&self, pattern: &str, error: AdapterError, times: usize) {
        self.lock().failures.push(FailureRule {
            pattern: pattern.to_ascii_uppercase(),
            error,
            skip: 0,
            remaining: Some(times),
        });
    }

    /// Lets the first `skip` matches of `pattern` through, then fails the
    /// next `times`.
    pub fn fail_after(&self, pattern: &str, error: AdapterError, skip: usize, times: usize) {
        self.lock().failures.push(FailureRule {
            pattern: pattern.to_ascii_uppercase(),
            error,
            skip,
            remaining: Some(times),
        });
    }

    /// Operations matching `pattern` sleep for `delay` before running.
    pub fn delay_on(&self, pattern: &str, delay: Duration) {
        self.lock()
            .delays
            .push((pattern.to_ascii_uppercase(), delay));
    }

    /// Queries whose SQL contains `pattern` return `rows`.
    pub fn stub_query(&self, pattern: &str, rows: RowSet) {
        self.lock().stubs.push((pattern.to_ascii_uppercase(), rows));
    }

    /// `count_rows` on `table` of `server` reports `delta` more rows than exist.
    pub fn skew_count(&self, server: &str, table: TableName, delta: i64) {
        self.lock()
            .count_skews
            .push((server.to_string(), table, delta));
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn database_exists(&self, server: &str, database: &str) -> bool {
        self.lock()
            .servers
            .get(server)
            .map(|s| s.database(database).is_some())
            .unwrap_or(false)
    }

    pub fn login_exists(&self, server: &str, login: &str) -> bool {
        self.lock()
            .servers
            .get(server)
            .map(|s| s.logins.iter().any(|l| l.eq_ignore_ascii_case(login)))
            .unwrap_or(false)
    }

    pub fn table_names(&self, server: &str, database: &str) -> Vec<String> {
        self.lock()
            .servers
            .get(server)
            .and_then(|s| s.database(database))
            .map(|db| db.tables.iter().map(|t| t.def.table.to_string()).collect())
            .unwrap_or_default()
    }

    /// Rows of a table as a [`RowSet`] over all its columns.
    pub fn rows(&self, server: &str, database: &str, table: &str) -> RowSet {
        let state = self.lock();
        state
            .servers
            .get(server)
            .and_then(|s| s.database(database))
            .and_then(|db| db.table(&TableName::parse(table)))
            .map(|t| {
                RowSet::new(
                    t.def.columns.iter().map(|c| c.name.clone()).collect(),
                    t.rows.clone(),
                )
            })
            .unwrap_or_default()
    }

    pub fn indexes(&self, server: &str, database: &str, table: &str) -> Vec<IndexDef> {
        let state = self.lock();
        state
            .servers
            .get(server)
            .and_then(|s| s.database(database))
            .and_then(|db| db.table(&TableName::parse(table)))
            .map(|t| t.indexes.clone())
            .unwrap_or_default()
    }

    pub fn descriptions(&self, server: &str, database: &str, table: &str) -> Vec<Description> {
        let state = self.lock();
        state
            .servers
            .get(server)
            .and_then(|s| s.database(database))
            .and_then(|db| db.table(&TableName::parse(table)))
            .map(|t| t.descriptions.clone())
            .unwrap_or_default()
    }

    pub fn constraints_enabled(&self, server: &str, database: &str, table: &str) -> bool {
        let state = self.lock();
        state
            .servers
            .get(server)
            .and_then(|s| s.database(database))
            .and_then(|db| db.table(&TableName::parse(table)))
            .map(|t| t.constraints_enabled)
            .unwrap_or(true)
    }

    /// Every SQL statement or operation label issued against `server`.
    pub fn statements(&self, server: &str) -> Vec<String> {
        self.lock()
            .servers
            .get(server)
            .map(|s| s.log.iter().map(|op| op.text.clone()).collect())
            .unwrap_or_default()
    }

    /// Mutating operations issued against `server`.
    pub fn writes(&self, server: &str) -> Vec<String> {
        self.lock()
            .servers
            .get(server)
            .map(|s| {
                s.log
                    .iter()
                    .filter(|op| op.write)
                    .map(|op| op.text.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn adapter(&self, server: &str, database: Option<&str>) -> MemoryAdapter {
        MemoryAdapter {
            cluster: self.clone(),
            server: server.to_string(),
            database: database.map(str::to_string),
        }
    }
}

#[async_trait]
impl AdapterFactory for MemoryCluster {
    async fn open(
        &self,
        server_id: &str,
        database: Option<&str>,
    ) -> Result<Box<dyn DatabaseAdapter>, AdapterError> {
        let label = format!("connect {}/{}", server_id, database.unwrap_or(""));
        {
            let mut state = self.lock();
            let server = state.server(server_id)?;
            if let Some(db) = database {
                if server.database(db).is_none() {
                    return Err(AdapterError::Connection(format!(
                        "Cannot open database \"{}\" requested by the login. The login failed.",
                        db
                    )));
                }
            }
            if let Some(err) = state.take_failure(&label) {
                return Err(err);
            }
        }
        Ok(Box::new(self.adapter(server_id, database)))
    }
}

#[async_trait]
impl ConnectionResolver for MemoryCluster {
    async fn resolve(&self, server_id: &str) -> Result<ServerConnection, AdapterError> {
        let state = self.lock();
        let server = state.server(server_id)?;
        Ok(ServerConnection {
            id: server_id.to_string(),
            name: server_id.to_string(),
            kind: server.kind,
            host: "memory".to_string(),
            port: server.kind.default_port(),
            username: "sa".to_string(),
            password: String::new(),
            default_database: None,
            data_path: None,
            log_path: None,
        })
    }
}

/// Adapter bound to one server of a [`MemoryCluster`] and optionally one of
/// its databases.
pub struct MemoryAdapter {
    cluster: MemoryCluster,
    server: String,
    database: Option<String>,
}

impl MemoryAdapter {
    /// Logs `label`, applies delay and failure rules, then runs `f` on the
    /// server's state.
    async fn run<T, F>(&self, label: String, write: bool, f: F) -> Result<T, AdapterError>
    where
        T: Send,
        F: FnOnce(&mut ClusterState, &str) -> Result<T, AdapterError> + Send,
    {
        debug!("[memory:{}] {}", self.server, label);
        let delay = {
            let mut state = self.cluster.lock();
            let server = state.server_mut(&self.server)?;
            server.log.push(LoggedOperation {
                text: label.clone(),
                write,
            });
            state.delay_for(&label)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.cluster.lock();
        if let Some(err) = state.take_failure(&label) {
            return Err(err);
        }
        f(&mut *state, &self.server)
    }

    fn bound_database(&self) -> Result<&str, AdapterError> {
        self.database
            .as_deref()
            .ok_or_else(|| AdapterError::Query("No database selected".to_string()))
    }
}

fn database_of<'a>(
    state: &'a mut ClusterState,
    server: &str,
    database: &str,
) -> Result<&'a mut MemoryDatabase, AdapterError> {
    state
        .server_mut(server)?
        .database_mut(database)
        .ok_or_else(|| missing_database(database))
}

fn table_of<'a>(
    state: &'a mut ClusterState,
    server: &str,
    database: &str,
    table: &TableName,
) -> Result<&'a mut MemoryTable, AdapterError> {
    database_of(state, server, database)?
        .table_mut(table)
        .ok_or_else(|| missing_table(table))
}

fn table_info(table: &MemoryTable) -> TableInfo {
    TableInfo {
        table: table.def.table.clone(),
        row_count: Some(table.rows.len() as u64),
        has_identity: table.identity_index().is_some(),
        description: table
            .descriptions
            .iter()
            .find(|d| d.column.is_none())
            .map(|d| d.text.clone()),
    }
}

fn select_from(table: &MemoryTable, columns: &[String]) -> Result<RowSet, AdapterError> {
    let names: Vec<String> = if columns.is_empty() {
        table.def.columns.iter().map(|c| c.name.clone()).collect()
    } else {
        columns.to_vec()
    };
    let indexes = names
        .iter()
        .map(|name| {
            table.column_index(name).ok_or_else(|| {
                AdapterError::Query(format!("Invalid column name '{}'.", name))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let rows = table
        .rows
        .iter()
        .map(|row| indexes.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Ok(RowSet::new(names, rows))
}

fn insert_into(
    table: &mut MemoryTable,
    columns: &[String],
    rows: &[Vec<SqlValue>],
    keep_identity: bool,
) -> Result<u64, AdapterError> {
    let positions = columns
        .iter()
        .map(|name| {
            table.column_index(name).ok_or_else(|| {
                AdapterError::Query(format!("Invalid column name '{}'.", name))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let identity = table.identity_index();
    if let Some(idx) = identity {
        if positions.contains(&idx) && !keep_identity {
            return Err(AdapterError::Query(format!(
                "Cannot insert explicit value for identity column in table '{}' when IDENTITY_INSERT is set to OFF.",
                table.def.table.name
            )));
        }
    }

    for values in rows {
        if values.len() != positions.len() {
            return Err(AdapterError::Query(
                "There are fewer columns in the INSERT statement than values specified in the VALUES clause."
                    .to_string(),
            ));
        }
        let mut row = vec![SqlValue::Null; table.def.columns.len()];
        for (value, &pos) in values.iter().zip(&positions) {
            row[pos] = value.clone();
        }
        if let Some(idx) = identity {
            if !positions.contains(&idx) {
                row[idx] = SqlValue::Int(table.next_identity(idx));
            }
        }
        for (column, value) in table.def.columns.iter().zip(&row) {
            if !column.nullable && value.is_null() {
                return Err(AdapterError::Query(format!(
                    "Cannot insert the value NULL into column '{}', table '{}'; column does not allow nulls. INSERT fails.",
                    column.name, table.def.table.name
                )));
            }
        }
        table.rows.push(row);
    }
    Ok(rows.len() as u64)
}

#[async_trait]
impl DatabaseAdapter for MemoryAdapter {
    fn kind(&self) -> DbKind {
        self.cluster
            .lock()
            .servers
            .get(&self.server)
            .map(|s| s.kind)
            .unwrap_or(DbKind::Mssql)
    }

    fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    async fn close(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<u64, AdapterError> {
        let created = extract_database_name(sql);
        self.run(sql.trim().to_string(), true, move |state, server| {
            let Some(name) = created else {
                return Ok(0);
            };
            let server = state.server_mut(server)?;
            if server.database(&name).is_some() {
                return Err(AdapterError::Query(format!(
                    "Database '{}' already exists. Choose a different database name.",
                    name
                )));
            }
            server.databases.insert(
                name.to_ascii_uppercase(),
                MemoryDatabase {
                    name,
                    tables: Vec::new(),
                },
            );
            Ok(1)
        })
        .await
    }

    async fn query(&self, sql: &str) -> Result<RowSet, AdapterError> {
        let upper = sql.to_ascii_uppercase();
        self.run(sql.trim().to_string(), false, move |state, _| {
            Ok(state
                .stubs
                .iter()
                .find(|(pattern, _)| upper.contains(pattern))
                .map(|(_, rows)| rows.clone())
                .unwrap_or_default())
        })
        .await
    }

    async fn list_databases(&self) -> Result<Vec<String>, AdapterError> {
        self.run("list_databases".to_string(), false, |state, server| {
            Ok(state
                .server(server)?
                .databases
                .values()
                .map(|db| db.name.clone())
                .collect())
        })
        .await
    }

    async fn database_exists(&self, name: &str) -> Result<bool, AdapterError> {
        self.run(format!("database_exists {}", name), false, |state, server| {
            Ok(state.server(server)?.database(name).is_some())
        })
        .await
    }

    async fn drop_database(&self, name: &str) -> Result<(), AdapterError> {
        self.run(format!("drop_database {}", name), true, |state, server| {
            state
                .server_mut(server)?
                .databases
                .remove(&name.to_ascii_uppercase())
                .map(|_| ())
                .ok_or_else(|| {
                    AdapterError::Query(format!(
                        "Cannot drop the database '{}', because it does not exist or you do not have permission.",
                        name
                    ))
                })
        })
        .await
    }

    async fn create_login(&self, spec: &LoginSpec) -> Result<(), AdapterError> {
        let login = spec.login_name.clone();
        let database = spec.database.clone();
        self.run(format!("create_login {}", login), true, move |state, server| {
            let server = state.server_mut(server)?;
            if server.database(&database).is_none() {
                return Err(missing_database(&database));
            }
            if !server.logins.insert(login.clone()) {
                return Err(AdapterError::Query(format!(
                    "The server principal '{}' already exists.",
                    login
                )));
            }
            Ok(())
        })
        .await?;

        // Mapping the login into the database is a separate operation so it
        // can fail after the login exists.
        let mapped = self
            .run(
                format!("create_user {} IN {}", spec.login_name, spec.database),
                true,
                |_, _| Ok(()),
            )
            .await;
        if mapped.is_err() {
            let _ = self.drop_login(&spec.login_name).await;
        }
        mapped
    }

    async fn drop_login(&self, login_name: &str) -> Result<(), AdapterError> {
        self.run(format!("drop_login {}", login_name), true, |state, server| {
            let logins = &mut state.server_mut(server)?.logins;
            let existing = logins
                .iter()
                .find(|l| l.eq_ignore_ascii_case(login_name))
                .cloned();
            match existing {
                Some(login) => {
                    logins.remove(&login);
                    Ok(())
                }
                None => Err(AdapterError::Query(format!(
                    "Cannot drop the login '{}', because it does not exist or you do not have permission.",
                    login_name
                ))),
            }
        })
        .await
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<TableInfo>, AdapterError> {
        self.run(format!("list_tables {}", database), false, |state, server| {
            let db = database_of(state, server, database)?;
            Ok(db.tables.iter().map(table_info).collect())
        })
        .await
    }

    async fn list_columns(
        &self,
        database: &str,
        table: &TableName,
    ) -> Result<Vec<ColumnDef>, AdapterError> {
        self.run(
            format!("list_columns {}.{}", database, table),
            false,
            |state, server| Ok(table_of(state, server, database, table)?.def.columns.clone()),
        )
        .await
    }

    async fn create_table(&self, def: &TableDef) -> Result<(), AdapterError> {
        let database = self.bound_database()?.to_string();
        let def = def.clone();
        self.run(format!("create_table {}", def.table), true, move |state, server| {
            let db = database_of(state, server, &database)?;
            if db.table(&def.table).is_some() {
                return Err(AdapterError::Query(format!(
                    "There is already an object named '{}' in the database.",
                    def.table.name
                )));
            }
            db.tables.push(MemoryTable::new(def));
            Ok(())
        })
        .await
    }

    async fn list_indexes(&self, table: &TableName) -> Result<Vec<IndexDef>, AdapterError> {
        let database = self.bound_database()?.to_string();
        self.run(format!("list_indexes {}", table), false, move |state, server| {
            Ok(table_of(state, server, &database, table)?.indexes.clone())
        })
        .await
    }

    async fn create_index(&self, index: &IndexDef) -> Result<(), AdapterError> {
        let database = self.bound_database()?.to_string();
        let index = index.clone();
        self.run(
            format!("create_index {} ON {}", index.name, index.table),
            true,
            move |state, server| {
                let table = table_of(state, server, &database, &index.table)?;
                if let Some(missing) = index
                    .columns
                    .iter()
                    .find(|c| table.column_index(c).is_none())
                {
                    return Err(AdapterError::Query(format!(
                        "Column name '{}' does not exist in the target table or view.",
                        missing
                    )));
                }
                table.indexes.push(index);
                Ok(())
            },
        )
        .await
    }

    async fn list_descriptions(
        &self,
        table: &TableName,
    ) -> Result<Vec<Description>, AdapterError> {
        let database = self.bound_database()?.to_string();
        self.run(
            format!("list_descriptions {}", table),
            false,
            move |state, server| Ok(table_of(state, server, &database, table)?.descriptions.clone()),
        )
        .await
    }

    async fn apply_description(&self, description: &Description) -> Result<(), AdapterError> {
        let database = self.bound_database()?.to_string();
        let description = description.clone();
        self.run(
            format!("apply_description {}", description.table),
            true,
            move |state, server| {
                table_of(state, server, &database, &description.table)?
                    .descriptions
                    .push(description);
                Ok(())
            },
        )
        .await
    }

    async fn select_rows(
        &self,
        table: &TableName,
        columns: &[String],
    ) -> Result<RowSet, AdapterError> {
        let database = self.bound_database()?.to_string();
        self.run(format!("select_rows {}", table), false, move |state, server| {
            select_from(table_of(state, server, &database, table)?, columns)
        })
        .await
    }

    async fn insert_rows(
        &self,
        table: &TableName,
        columns: &[String],
        rows: &[Vec<SqlValue>],
        keep_identity: bool,
    ) -> Result<u64, AdapterError> {
        let database = self.bound_database()?.to_string();
        self.run(
            format!("insert_rows {} ({} rows)", table, rows.len()),
            true,
            move |state, server| {
                insert_into(
                    table_of(state, server, &database, table)?,
                    columns,
                    rows,
                    keep_identity,
                )
            },
        )
        .await
    }

    async fn count_rows(
        &self,
        table: &TableName,
        filter: Option<&RowFilter>,
    ) -> Result<u64, AdapterError> {
        let database = self.bound_database()?.to_string();
        self.run(format!("count_rows {}", table), false, move |state, server| {
            let skew: i64 = state
                .count_skews
                .iter()
                .filter(|(s, t, _)| s == server && t.matches(table))
                .map(|(_, _, delta)| *delta)
                .sum();
            let t = table_of(state, server, &database, table)?;
            let count = t.rows.iter().filter(|r| t.row_matches(r, filter)).count() as i64;
            Ok((count + skew).max(0) as u64)
        })
        .await
    }

    async fn truncate_table(&self, table: &TableName) -> Result<(), AdapterError> {
        let database = self.bound_database()?.to_string();
        self.run(format!("truncate_table {}", table), true, move |state, server| {
            table_of(state, server, &database, table)?.rows.clear();
            Ok(())
        })
        .await
    }

    async fn delete_rows(
        &self,
        table: &TableName,
        filter: Option<&RowFilter>,
    ) -> Result<u64, AdapterError> {
        let database = self.bound_database()?.to_string();
        self.run(format!("delete_rows {}", table), true, move |state, server| {
            let t = table_of(state, server, &database, table)?;
            let before = t.rows.len();
            let kept: Vec<Vec<SqlValue>> = t
                .rows
                .iter()
                .filter(|r| !t.row_matches(r, filter))
                .cloned()
                .collect();
            t.rows = kept;
            Ok((before - t.rows.len()) as u64)
        })
        .await
    }

    async fn set_constraints_enabled(
        &self,
        tables: &[TableName],
        enabled: bool,
    ) -> Result<(), AdapterError> {
        let database = self.bound_database()?.to_string();
        let names: Vec<String> = tables.iter().map(|t| t.to_string()).collect();
        self.run(
            format!("set_constraints_enabled {} {}", enabled, names.join(",")),
            true,
            move |state, server| {
                for table in tables {
                    table_of(state, server, &database, table)?.constraints_enabled = enabled;
                }
                Ok(())
            },
        )
        .await
    }

    async fn list_remote_links(&self) -> Result<Vec<String>, AdapterError> {
        self.run("list_remote_links".to_string(), false, |state, server| {
            Ok(state.server(server)?.links.keys().cloned().collect())
        })
        .await
    }

    async fn test_remote_link(&self, link_name: &str) -> Result<(), AdapterError> {
        self.run(format!("test_remote_link {}", link_name), false, |state, server| {
            let remote = state
                .server(server)?
                .links
                .get(link_name)
                .cloned()
                .ok_or_else(|| {
                    AdapterError::Query(format!(
                        "Could not find server '{}' in sys.servers.",
                        link_name
                    ))
                })?;
            state.server(&remote).map(|_| ())
        })
        .await
    }

    async fn list_remote_databases(&self, link_name: &str) -> Result<Vec<String>, AdapterError> {
        self.run(
            format!("list_remote_databases {}", link_name),
            false,
            |state, server| {
                let remote = remote_server(state, server, link_name)?;
                Ok(state
                    .server(&remote)?
                    .databases
                    .values()
                    .map(|db| db.name.clone())
                    .collect())
            },
        )
        .await
    }

    async fn list_remote_tables(
        &self,
        link_name: &str,
        database: &str,
    ) -> Result<Vec<TableInfo>, AdapterError> {
        self.run(
            format!("list_remote_tables {}.{}", link_name, database),
            false,
            |state, server| {
                let remote = remote_server(state, server, link_name)?;
                let db = database_of(state, &remote, database)?;
                Ok(db.tables.iter().map(table_info).collect())
            },
        )
        .await
    }

    async fn insert_from_remote(&self, insert: &RemoteInsert) -> Result<u64, AdapterError> {
        let database = self.bound_database()?.to_string();
        self.run(
            format!(
                "insert_from_remote {} FROM {}.{}",
                insert.table, insert.link_name, insert.remote_database
            ),
            true,
            move |state, server| {
                let remote = remote_server(state, server, &insert.link_name)?;
                let source = select_from(
                    table_of(state, &remote, &insert.remote_database, &insert.table)?,
                    &insert.columns,
                )?;
                insert_into(
                    table_of(state, server, &database, &insert.table)?,
                    &source.columns,
                    &source.rows,
                    insert.keep_identity,
                )
            },
        )
        .await
    }
}

fn remote_server(state: &ClusterState, server: &str, link_name: &str) -> Result<String, AdapterError> {
    state
        .server(server)?
        .links
        .get(link_name)
        .cloned()
        .ok_or_else(|| {
            AdapterError::Query(format!(
                "Could not find server '{}' in sys.servers.",
                link_name
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> MemoryCluster {
        let cluster = MemoryCluster::new();
        cluster.add_server("src", DbKind::Mssql);
        cluster.create_database("src", "TPL01");
        cluster.add_table(
            "src",
            "TPL01",
            TableDef {
                table: TableName::with_schema("dbo", "TB_DEPT"),
                columns: vec![
                    ColumnDef::new("SEQ", "int").identity(),
                    ColumnDef::new("CORP_CD", "varchar(10)").not_null(),
                    ColumnDef::new("DEPT_NM", "nvarchar(50)"),
                ],
            },
            vec![
                vec![SqlValue::Int(1), "0000".into(), "Sales".into()],
                vec![SqlValue::Int(2), "0000".into(), "Finance".into()],
            ],
        );
        cluster
    }

    #[tokio::test]
    async fn test_open_missing_database_is_connection_error() {
        let cluster = cluster();
        let err = cluster.open("src", Some("NOPE")).await.err().unwrap();
        assert!(err.is_connection());
        assert!(cluster.open("other", None).await.is_err());
    }

    #[tokio::test]
    async fn test_create_database_statement_and_duplicate() {
        let cluster = cluster();
        let adapter = cluster.open("src", None).await.unwrap();
        adapter
            .execute("CREATE DATABASE [CORP1001] ON PRIMARY (NAME = N'CORP1001')")
            .await
            .unwrap();
        assert!(cluster.database_exists("src", "corp1001"));

        let err = adapter
            .execute("CREATE DATABASE [CORP1001]")
            .await
            .unwrap_err();
        assert!(err.raw_message().contains("already exists"));
    }

    #[tokio::test]
    async fn test_insert_assigns_identity_and_rejects_explicit_values() {
        let cluster = cluster();
        let adapter = cluster.open("src", Some("TPL01")).await.unwrap();
        let table = TableName::new("TB_DEPT");

        let columns = vec!["CORP_CD".to_string(), "DEPT_NM".to_string()];
        adapter
            .insert_rows(&table, &columns, &[vec!["1001".into(), "Ops".into()]], false)
            .await
            .unwrap();
        let rows = cluster.rows("src", "TPL01", "TB_DEPT");
        assert_eq!(rows.value(2, "SEQ"), Some(&SqlValue::Int(3)));

        let all = vec!["SEQ".to_string(), "CORP_CD".to_string(), "DEPT_NM".to_string()];
        let row = vec![SqlValue::Int(10), "1001".into(), "Legal".into()];
        assert!(adapter
            .insert_rows(&table, &all, &[row.clone()], false)
            .await
            .is_err());
        assert_eq!(
            adapter.insert_rows(&table, &all, &[row], true).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_count_and_delete_with_filter() {
        let cluster = cluster();
        let adapter = cluster.open("src", Some("TPL01")).await.unwrap();
        let table = TableName::new("TB_DEPT");
        let filter = RowFilter::equals("corp_cd", "0000");

        assert_eq!(adapter.count_rows(&table, Some(&filter)).await.unwrap(), 2);
        assert_eq!(adapter.delete_rows(&table, Some(&filter)).await.unwrap(), 2);
        assert_eq!(adapter.count_rows(&table, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failure_rule_counts_down() {
        let cluster = cluster();
        cluster.fail_times("count_rows", AdapterError::Query("boom".into()), 1);
        let adapter = cluster.open("src", Some("TPL01")).await.unwrap();
        let table = TableName::new("TB_DEPT");

        assert_eq!(
            adapter.count_rows(&table, None).await.unwrap_err(),
            AdapterError::Query("boom".into())
        );
        assert_eq!(adapter.count_rows(&table, None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failure_rule_can_skip_first_matches() {
        let cluster = cluster();
        cluster.fail_after("count_rows", AdapterError::Query("boom".into()), 1, 1);
        let adapter = cluster.open("src", Some("TPL01")).await.unwrap();
        let table = TableName::new("TB_DEPT");

        assert_eq!(adapter.count_rows(&table, None).await.unwrap(), 2);
        assert!(adapter.count_rows(&table, None).await.is_err());
        assert_eq!(adapter.count_rows(&table, None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_user_mapping_removes_login() {
        let cluster = cluster();
        cluster.fail_on("create_user", AdapterError::Query("no mapping".into()));
        let adapter = cluster.open("src", None).await.unwrap();

        let result = adapter
            .create_login(&LoginSpec {
                login_name: "TPL01_user".to_string(),
                password: "pw".to_string(),
                database: "TPL01".to_string(),
                role: "db_owner".to_string(),
            })
            .await;

        assert!(result.is_err());
        assert!(!cluster.login_exists("src", "TPL01_user"));
    }

    #[tokio::test]
    async fn test_skewed_count_only_affects_its_server() {
        let cluster = cluster();
        cluster.skew_count("src", TableName::new("TB_DEPT"), 3);
        let adapter = cluster.open("src", Some("TPL01")).await.unwrap();
        assert_eq!(
            adapter.count_rows(&TableName::new("TB_DEPT"), None).await.unwrap(),
            5
        );
    }

    #[tokio::test]
    async fn test_insert_from_remote_copies_through_link() {
        let cluster = cluster();
        cluster.add_server("tgt", DbKind::Mssql);
        cluster.create_database("tgt", "CORP1001");
        cluster.add_link("tgt", "SRC_LINK", "src");
        let def = TableDef {
            table: TableName::with_schema("dbo", "TB_DEPT"),
            columns: vec![
                ColumnDef::new("SEQ", "int").identity(),
                ColumnDef::new("CORP_CD", "varchar(10)").not_null(),
                ColumnDef::new("DEPT_NM", "nvarchar(50)"),
            ],
        };
        cluster.add_table("tgt", "CORP1001", def, Vec::new());

        let adapter = cluster.open("tgt", Some("CORP1001")).await.unwrap();
        adapter.test_remote_link("SRC_LINK").await.unwrap();
        assert!(adapter.test_remote_link("NOPE").await.is_err());

        let copied = adapter
            .insert_from_remote(&RemoteInsert {
                link_name: "SRC_LINK".to_string(),
                remote_database: "TPL01".to_string(),
                table: TableName::with_schema("dbo", "TB_DEPT"),
                columns: vec!["SEQ".into(), "CORP_CD".into(), "DEPT_NM".into()],
                keep_identity: true,
            })
            .await
            .unwrap();
        assert_eq!(copied, 2);
        assert_eq!(cluster.rows("tgt", "CORP1001", "TB_DEPT").len(), 2);
        assert_eq!(cluster.writes("src").len(), 0);
    }
}

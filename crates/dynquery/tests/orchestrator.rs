use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use dynquery::{
    core::{
        context::SessionId,
        driver::{DbConnection, Driver, DriverSet},
        executor::SqlAccess,
        orchestrator::{AccessOrchestrator, OrchestratorConfig},
        registry::ConnectionRegistry,
        sqlite::SqliteDriver,
        types::{Credentials, Dialect, PageRequest},
    },
    error::{AppResult, ErrorKind, Verbosity},
};
use tempfile::TempDir;

/// Counts open attempts that reach the underlying driver.
#[derive(Clone, Default)]
struct CountingSqlite {
    inner: SqliteDriver,
    opens: Arc<AtomicUsize>,
}

#[async_trait]
impl Driver for CountingSqlite {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn open(&self, creds: &Credentials) -> AppResult<Arc<dyn DbConnection>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        self.inner.open(creds).await
    }
}

struct Fixture {
    _dir: TempDir,
    path: String,
    driver: CountingSqlite,
}

impl Fixture {
    /// `sales.db` with 3 customers and 5 orders.
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sales.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer TEXT NOT NULL, total REAL);
             CREATE TABLE customers (name TEXT PRIMARY KEY, city TEXT);
             INSERT INTO customers VALUES ('carol', 'Lyon'), ('alice', 'Oslo'), ('bob', NULL);
             INSERT INTO orders VALUES (5, 'bob', 1.0), (1, 'alice', 9.5), (3, 'carol', 4.0),
                                       (2, 'alice', 3.0), (4, 'bob', 7.25);",
        )
        .unwrap();
        Self {
            path: path.to_string_lossy().into_owned(),
            _dir: dir,
            driver: CountingSqlite::default(),
        }
    }

    fn creds(&self) -> Credentials {
        Credentials::new("db1", self.path.clone(), "a", "b").with_dialect(Dialect::Sqlite)
    }

    fn orchestrator(&self, config: OrchestratorConfig) -> AccessOrchestrator {
        let registry = ConnectionRegistry::new(DriverSet::new().with(self.driver.clone()));
        AccessOrchestrator::new(Arc::new(registry), config)
    }

    fn opens(&self) -> usize {
        self.driver.opens.load(Ordering::SeqCst)
    }
}

fn session(id: &str) -> SessionId {
    SessionId::new(id)
}

#[tokio::test]
async fn connect_list_and_page_scenario() {
    let fx = Fixture::new();
    let orch = fx.orchestrator(OrchestratorConfig::default());
    let s = session("s1");

    let connected = orch.connect(&s, &fx.creds()).await.unwrap();
    assert_eq!(connected.database_name, fx.path);
    assert!(connected.message.starts_with("Connected successfully to database: "));

    let tables: Vec<_> = orch
        .list_tables(&s)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(tables, vec!["customers", "orders"]);

    let page = orch
        .get_page(&s, &PageRequest { table: "orders".into(), page: 0, size: 10 })
        .await
        .unwrap();
    assert_eq!(page.total_rows, 5);
    assert_eq!(page.rows.len(), 5);
    assert_eq!(page.table_name, "orders");
    assert_eq!(page.current_page, 0);
    assert_eq!(page.page_size, 10);
    let ids: Vec<_> = page.rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    let cols: Vec<_> = page.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(cols, vec!["id", "customer", "total"]);
}

#[tokio::test]
async fn page_size_bounds_rows_and_total_is_stable() {
    let fx = Fixture::new();
    let orch = fx.orchestrator(OrchestratorConfig::default());
    let s = session("s1");
    orch.connect(&s, &fx.creds()).await.unwrap();

    let mut seen = Vec::new();
    for page in 0..4 {
        let res = orch
            .get_page(&s, &PageRequest { table: "orders".into(), page, size: 2 })
            .await
            .unwrap();
        assert!(res.rows.len() <= 2);
        assert_eq!(res.total_rows, 5);
        seen.extend(res.rows.iter().map(|r| r["id"].as_i64().unwrap()));
    }
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);

    // Tables keyed by a text primary key page in key order.
    let res = orch
        .get_page(&s, &PageRequest { table: "customers".into(), page: 0, size: 3 })
        .await
        .unwrap();
    let names: Vec<_> = res.rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["alice", "bob", "carol"]);
}

#[tokio::test]
async fn page_past_the_end_is_empty_not_an_error() {
    let fx = Fixture::new();
    let orch = fx.orchestrator(OrchestratorConfig::default());
    let s = session("s1");
    orch.connect(&s, &fx.creds()).await.unwrap();

    let res = orch
        .get_page(&s, &PageRequest { table: "orders".into(), page: 1000, size: 10 })
        .await
        .unwrap();
    assert!(res.rows.is_empty());
    assert_eq!(res.total_rows, 5);
    assert_eq!(res.current_page, 1000);
}

#[tokio::test]
async fn page_size_is_clamped_and_zero_rejected() {
    let fx = Fixture::new();
    let orch = fx.orchestrator(OrchestratorConfig {
        max_page_size: 3,
        ..OrchestratorConfig::default()
    });
    let s = session("s1");
    orch.connect(&s, &fx.creds()).await.unwrap();

    let res = orch
        .get_page(&s, &PageRequest { table: "orders".into(), page: 0, size: 50 })
        .await
        .unwrap();
    assert_eq!(res.rows.len(), 3);
    assert_eq!(res.page_size, 3);

    let err = orch
        .get_page(&s, &PageRequest { table: "orders".into(), page: 0, size: 0 })
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn unknown_table_is_not_found() {
    let fx = Fixture::new();
    let orch = fx.orchestrator(OrchestratorConfig::default());
    let s = session("s1");
    orch.connect(&s, &fx.creds()).await.unwrap();

    let err = orch.list_columns(&s, "nonexistent_table").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let err = orch
        .get_page(&s, &PageRequest { table: "nonexistent_table".into(), page: 0, size: 5 })
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn columns_describe_type_nullability_and_position() {
    let fx = Fixture::new();
    let orch = fx.orchestrator(OrchestratorConfig::default());
    let s = session("s1");
    orch.connect(&s, &fx.creds()).await.unwrap();

    let cols = orch.list_columns(&s, "orders").await.unwrap();
    assert_eq!(cols.len(), 3);
    assert_eq!(cols[0].name, "id");
    assert_eq!(cols[0].data_type, "INTEGER");
    assert_eq!(cols[0].position, 1);
    assert_eq!(cols[1].name, "customer");
    assert!(!cols[1].nullable);
    assert!(cols[2].nullable);
}

#[tokio::test]
async fn operations_before_connect_fail_precondition() {
    let fx = Fixture::new();
    let orch = fx.orchestrator(OrchestratorConfig::default());
    let s = session("fresh");

    let kinds = [
        orch.list_tables(&s).await.unwrap_err().kind,
        orch.list_columns(&s, "orders").await.unwrap_err().kind,
        orch.get_page(&s, &PageRequest { table: "orders".into(), page: 0, size: 1 })
            .await
            .unwrap_err()
            .kind,
        orch.execute_query(&s, "SELECT 1").await.unwrap_err().kind,
    ];
    assert!(kinds.iter().all(|k| *k == ErrorKind::Precondition));
    assert_eq!(fx.opens(), 0);
}

#[tokio::test]
async fn invalid_credentials_never_reach_the_driver() {
    let fx = Fixture::new();
    let orch = fx.orchestrator(OrchestratorConfig::default());
    let s = session("s1");

    let valid = fx.creds();
    let mut cases = Vec::new();
    for field in 0..4 {
        let mut c = valid.clone();
        match field {
            0 => c.host = " ".into(),
            1 => c.database_name = String::new(),
            2 => c.username = String::new(),
            _ => c.password = String::new(),
        }
        cases.push(c);
    }
    for creds in &cases {
        let err = orch.connect(&s, creds).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
    assert_eq!(fx.opens(), 0);
    assert!(orch.registry().is_empty());
}

#[tokio::test]
async fn unreachable_database_is_a_connection_error() {
    let fx = Fixture::new();
    let orch = fx.orchestrator(OrchestratorConfig::default());
    let s = session("s1");
    let mut creds = fx.creds();
    creds.database_name = format!("{}.missing", fx.path);

    let err = orch.connect(&s, &creds).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Connection);
    // No connection was installed.
    assert_eq!(
        orch.list_tables(&s).await.unwrap_err().kind,
        ErrorKind::Precondition
    );
}

#[tokio::test]
async fn reconnecting_reuses_the_cached_connection() {
    let fx = Fixture::new();
    let orch = fx.orchestrator(OrchestratorConfig::default());
    let s = session("s1");

    let a = orch.connect(&s, &fx.creds()).await.unwrap();
    let b = orch.connect(&s, &fx.creds()).await.unwrap();
    assert_eq!(a.fingerprint, b.fingerprint);
    assert_eq!(orch.registry().len(), 1);
    assert_eq!(fx.opens(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_connects_open_once() {
    let fx = Fixture::new();
    let orch = Arc::new(fx.orchestrator(OrchestratorConfig::default()));

    let tasks: Vec<_> = (0..12)
        .map(|i| {
            let orch = orch.clone();
            let creds = fx.creds();
            tokio::spawn(async move { orch.connect(&session(&format!("s{i}")), &creds).await })
        })
        .collect();
    for t in tasks {
        t.await.unwrap().unwrap();
    }
    assert_eq!(fx.opens(), 1);
    assert_eq!(orch.registry().len(), 1);
    assert_eq!(orch.router().sessions(), 12);
}

#[tokio::test]
async fn sessions_keep_independent_active_connections() {
    let fx = Fixture::new();
    let other = Fixture::new();
    let registry = ConnectionRegistry::new(DriverSet::new().with(fx.driver.clone()));
    let orch = AccessOrchestrator::new(Arc::new(registry), OrchestratorConfig::default());

    orch.execute_query(&session("x"), "SELECT 1").await.unwrap_err();
    orch.connect(&session("x"), &fx.creds()).await.unwrap();
    orch.connect(&session("y"), &other.creds()).await.unwrap();
    orch.execute_query(&session("y"), "DELETE FROM orders WHERE id > 2")
        .await
        .unwrap();

    let x_total = orch
        .get_page(&session("x"), &PageRequest { table: "orders".into(), page: 0, size: 1 })
        .await
        .unwrap()
        .total_rows;
    let y_total = orch
        .get_page(&session("y"), &PageRequest { table: "orders".into(), page: 0, size: 1 })
        .await
        .unwrap()
        .total_rows;
    assert_eq!(x_total, 5);
    assert_eq!(y_total, 2);
    assert_eq!(orch.registry().len(), 2);
}

#[tokio::test]
async fn execute_query_returns_rows_in_column_order() {
    let fx = Fixture::new();
    let orch = fx.orchestrator(OrchestratorConfig::default());
    let s = session("s1");
    orch.connect(&s, &fx.creds()).await.unwrap();

    let rows = orch
        .execute_query(&s, "SELECT total, customer FROM orders WHERE id = 4")
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let keys: Vec<_> = rows[0].keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["total", "customer"]);
    assert_eq!(rows[0]["total"], 7.25);

    let err = orch.execute_query(&s, "SELEC oops").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Query);
    assert!(err.message.starts_with("Error executing query: "));
}

#[tokio::test]
async fn opaque_verbosity_hides_driver_text() {
    let fx = Fixture::new();
    let orch = fx.orchestrator(OrchestratorConfig {
        verbosity: Verbosity::Opaque,
        ..OrchestratorConfig::default()
    });
    let s = session("s1");
    orch.connect(&s, &fx.creds()).await.unwrap();

    let err = orch
        .execute_query(&s, "SELECT * FROM no_such_table")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Query);
    assert!(!err.message.contains("no_such_table"));
}

#[tokio::test]
async fn sql_access_policy_is_enforced() {
    let fx = Fixture::new();
    let s = session("s1");

    let disabled = fx.orchestrator(OrchestratorConfig {
        sql_access: SqlAccess::Disabled,
        ..OrchestratorConfig::default()
    });
    disabled.connect(&s, &fx.creds()).await.unwrap();
    let err = disabled.execute_query(&s, "SELECT 1").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::CapabilityDisabled);
    // Introspection is unaffected.
    assert!(disabled.list_tables(&s).await.is_ok());

    let read_only = fx.orchestrator(OrchestratorConfig {
        sql_access: SqlAccess::ReadOnly,
        ..OrchestratorConfig::default()
    });
    read_only.connect(&s, &fx.creds()).await.unwrap();
    assert_eq!(
        read_only
            .execute_query(&s, "SELECT COUNT(*) AS n FROM orders")
            .await
            .unwrap()[0]["n"],
        5
    );
    let err = read_only
        .execute_query(&s, "DELETE FROM orders")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::CapabilityDisabled);
}

#[tokio::test]
async fn session_keeps_its_connection_after_eviction() {
    let fx = Fixture::new();
    let orch = fx.orchestrator(OrchestratorConfig::default());
    let s = session("s1");

    let connected = orch.connect(&s, &fx.creds()).await.unwrap();
    assert!(orch.registry().evict(&connected.fingerprint).is_some());
    assert!(orch.registry().is_empty());

    let tables = orch.list_tables(&s).await.unwrap();
    assert_eq!(tables.len(), 2);
}

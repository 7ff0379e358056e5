//! SQLite 레코드 스토어
//!
//! [`RecordStore`] trait의 SQLite 구현입니다. 캡처 파일 하나가
//! 트랜잭션 하나에 대응하며, 커밋 전의 레코드는 조회에 노출되지
//! 않습니다. `hash_id`의 unique 인덱스가 중복 삽입의 최종
//! 방어선입니다 (`INSERT OR IGNORE`).

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};

use logpond_core::error::StorageError;
use logpond_core::store::{RecordQuery, RecordStore, RecordWriter};
use logpond_core::types::{Action, CimRecord, CANONICAL_FIELDS};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    hostname TEXT,
    log_source TEXT NOT NULL,
    process_name TEXT,
    pid INTEGER,
    uid INTEGER,
    gid INTEGER,
    action TEXT NOT NULL,
    status TEXT,
    user TEXT,
    src_ip TEXT,
    dest_ip TEXT,
    src_port INTEGER,
    dest_port INTEGER,
    command TEXT,
    object TEXT,
    message TEXT,
    raw_message TEXT NOT NULL,
    hash_id TEXT,
    fields TEXT NOT NULL DEFAULT '[]'
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_records_hash_id
    ON records(hash_id) WHERE hash_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_records_timestamp ON records(timestamp);
CREATE INDEX IF NOT EXISTS idx_records_log_source ON records(log_source);
CREATE INDEX IF NOT EXISTS idx_records_action ON records(action);

CREATE VIEW IF NOT EXISTS sudo_usage AS
    SELECT timestamp, hostname, user, command
    FROM records
    WHERE process_name = 'sudo' AND command IS NOT NULL;

CREATE VIEW IF NOT EXISTS log_count_by_hour AS
    SELECT strftime('%Y-%m-%d %H:00', timestamp) AS hour,
           log_source,
           COUNT(*) AS record_count
    FROM records
    GROUP BY hour, log_source;
"#;

const INSERT_SQL: &str = r#"
INSERT OR IGNORE INTO records (
    timestamp, hostname, log_source, process_name, pid, uid, gid,
    action, status, user, src_ip, dest_ip, src_port, dest_port,
    command, object, message, raw_message, hash_id, fields
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

/// SQLite 레코드 스토어
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// 데이터베이스에 연결하고 스키마를 초기화합니다.
    ///
    /// 파일이 없으면 생성합니다.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// 인메모리 데이터베이스를 생성합니다.
    ///
    /// 인메모리 SQLite는 연결마다 별개의 DB이므로 풀을 연결 하나로
    /// 제한합니다.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::SchemaFailed(e.to_string()))?;
        Ok(())
    }

    /// 저장된 전체 레코드 수를 반환합니다.
    pub async fn count(&self) -> Result<i64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;
        row.try_get("n")
            .map_err(|e| StorageError::QueryFailed(e.to_string()))
    }
}

impl RecordStore for SqliteStore {
    type Writer = SqliteWriter;

    async fn begin(&self) -> Result<SqliteWriter, StorageError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::TransactionFailed(e.to_string()))?;
        Ok(SqliteWriter { tx })
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<CimRecord>, StorageError> {
        let (sql, binds) = build_query_sql(query)?;

        let mut q = sqlx::query(&sql);
        for bind in &binds {
            q = q.bind(bind);
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        rows.iter().map(row_to_record).collect()
    }
}

/// 캡처 파일 하나에 대응하는 쓰기 트랜잭션
pub struct SqliteWriter {
    tx: Transaction<'static, Sqlite>,
}

impl RecordWriter for SqliteWriter {
    async fn append(&mut self, batch: &[CimRecord]) -> Result<(), StorageError> {
        for record in batch {
            let fields_json = serde_json::to_string(&record.fields)
                .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

            sqlx::query(INSERT_SQL)
                .bind(record.timestamp)
                .bind(&record.hostname)
                .bind(&record.log_source)
                .bind(&record.process_name)
                .bind(record.pid)
                .bind(record.uid)
                .bind(record.gid)
                .bind(record.action.as_str())
                .bind(&record.status)
                .bind(&record.user)
                .bind(&record.src_ip)
                .bind(&record.dest_ip)
                .bind(record.src_port)
                .bind(record.dest_port)
                .bind(&record.command)
                .bind(&record.object)
                .bind(&record.message)
                .bind(&record.raw_message)
                .bind(&record.hash_id)
                .bind(fields_json)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| StorageError::QueryFailed(e.to_string()))?;
        }
        Ok(())
    }

    async fn commit(self) -> Result<(), StorageError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StorageError::TransactionFailed(e.to_string()))
    }

    async fn rollback(self) -> Result<(), StorageError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StorageError::TransactionFailed(e.to_string()))
    }
}

/// 조회 조건을 SQL과 바인딩 값으로 변환합니다.
///
/// 필드명은 canonical 목록에 있는 것만 허용됩니다. 값은 전부
/// 바인딩으로 전달되어 SQL에 섞이지 않습니다.
fn build_query_sql(query: &RecordQuery) -> Result<(String, Vec<String>), StorageError> {
    let allowed: HashSet<&str> = CANONICAL_FIELDS.iter().copied().collect();

    let mut sql = String::from("SELECT * FROM records");
    let mut conditions: Vec<String> = Vec::new();
    let mut binds: Vec<String> = Vec::new();

    for (field, value) in &query.filters {
        if !allowed.contains(field.as_str()) {
            return Err(StorageError::QueryFailed(format!(
                "unknown filter field: '{field}'"
            )));
        }
        conditions.push(format!("{field} = ?"));
        binds.push(value.clone());
    }

    if let Some(source) = &query.log_source {
        conditions.push("log_source = ?".to_owned());
        binds.push(source.clone());
    }

    if let Some(pattern) = &query.pattern {
        conditions.push(r"message LIKE ? ESCAPE '\'".to_owned());
        binds.push(wildcard_to_like(pattern));
    }

    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    sql.push_str(" ORDER BY timestamp");

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    Ok((sql, binds))
}

/// `*`/`?` 와일드카드 패턴을 SQL LIKE 패턴으로 변환합니다.
///
/// 패턴 내의 LIKE 메타문자(`%`, `_`, `\`)는 이스케이프합니다.
fn wildcard_to_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        match ch {
            '*' => out.push('%'),
            '?' => out.push('_'),
            '%' => out.push_str(r"\%"),
            '_' => out.push_str(r"\_"),
            '\\' => out.push_str(r"\\"),
            other => out.push(other),
        }
    }
    out
}

fn row_to_record(row: &SqliteRow) -> Result<CimRecord, StorageError> {
    let map_err = |e: sqlx::Error| StorageError::QueryFailed(e.to_string());

    let fields_json: String = row.try_get("fields").map_err(map_err)?;
    let fields: Vec<(String, String)> = serde_json::from_str(&fields_json)
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

    let action: String = row.try_get("action").map_err(map_err)?;
    let src_port: Option<i64> = row.try_get("src_port").map_err(map_err)?;
    let dest_port: Option<i64> = row.try_get("dest_port").map_err(map_err)?;

    Ok(CimRecord {
        timestamp: row
            .try_get::<DateTime<Utc>, _>("timestamp")
            .map_err(map_err)?,
        hostname: row.try_get("hostname").map_err(map_err)?,
        log_source: row.try_get("log_source").map_err(map_err)?,
        process_name: row.try_get("process_name").map_err(map_err)?,
        pid: row.try_get("pid").map_err(map_err)?,
        uid: row.try_get("uid").map_err(map_err)?,
        gid: row.try_get("gid").map_err(map_err)?,
        action: Action::from(action.as_str()),
        status: row.try_get("status").map_err(map_err)?,
        user: row.try_get("user").map_err(map_err)?,
        src_ip: row.try_get("src_ip").map_err(map_err)?,
        dest_ip: row.try_get("dest_ip").map_err(map_err)?,
        src_port: src_port.and_then(|p| u16::try_from(p).ok()),
        dest_port: dest_port.and_then(|p| u16::try_from(p).ok()),
        command: row.try_get("command").map_err(map_err)?,
        object: row.try_get("object").map_err(map_err)?,
        message: row.try_get("message").map_err(map_err)?,
        raw_message: row.try_get("raw_message").map_err(map_err)?,
        hash_id: row.try_get("hash_id").map_err(map_err)?,
        fields,
    })
}

//! `SQLite`-backed [`DocumentStore`].

use super::{acquire_lock, configure_connection, in_transaction, is_unique_violation, sql_error, timed};
use crate::filename::slugify;
use crate::matching::validate_rule;
use crate::models::{
    Correspondent, Document, DocumentId, EntityId, MatchRule, MatchingAlgorithm, NewDocument,
    NewEntity, StorageMode, Tag,
};
use crate::storage::traits::{DocumentStore, Finalize};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::instrument;

const BACKEND: &str = "sqlite";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS correspondents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        slug TEXT NOT NULL UNIQUE,
        match_pattern TEXT NOT NULL DEFAULT '',
        matching_algorithm INTEGER NOT NULL DEFAULT 1,
        is_insensitive INTEGER NOT NULL DEFAULT 1
    );
    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        slug TEXT NOT NULL UNIQUE,
        match_pattern TEXT NOT NULL DEFAULT '',
        matching_algorithm INTEGER NOT NULL DEFAULT 1,
        is_insensitive INTEGER NOT NULL DEFAULT 1,
        colour INTEGER NOT NULL DEFAULT 1
    );
    CREATE TABLE IF NOT EXISTS documents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        checksum TEXT NOT NULL UNIQUE,
        title TEXT,
        content TEXT NOT NULL,
        file_type TEXT NOT NULL,
        correspondent_id INTEGER REFERENCES correspondents(id),
        created TEXT NOT NULL,
        added TEXT NOT NULL,
        storage_type TEXT NOT NULL,
        page_count INTEGER,
        archive_checksum TEXT
    );
    CREATE TABLE IF NOT EXISTS document_tags (
        document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        tag_id INTEGER NOT NULL REFERENCES tags(id),
        PRIMARY KEY (document_id, tag_id)
    );
    CREATE INDEX IF NOT EXISTS idx_documents_created ON documents(created DESC);
    CREATE INDEX IF NOT EXISTS idx_document_tags_tag ON document_tags(tag_id);
";

/// Which entity table a query targets.
#[derive(Debug, Clone, Copy)]
enum EntityTable {
    Tags,
    Correspondents,
}

impl EntityTable {
    const fn select_all(self) -> &'static str {
        match self {
            Self::Tags => {
                "SELECT id, name, slug, match_pattern, matching_algorithm, is_insensitive, colour
                 FROM tags ORDER BY name"
            },
            Self::Correspondents => {
                "SELECT id, name, slug, match_pattern, matching_algorithm, is_insensitive, 1
                 FROM correspondents ORDER BY name"
            },
        }
    }

    const fn select_by_slug(self) -> &'static str {
        match self {
            Self::Tags => {
                "SELECT id, name, slug, match_pattern, matching_algorithm, is_insensitive, colour
                 FROM tags WHERE slug = ?1"
            },
            Self::Correspondents => {
                "SELECT id, name, slug, match_pattern, matching_algorithm, is_insensitive, 1
                 FROM correspondents WHERE slug = ?1"
            },
        }
    }

    const fn insert(self) -> &'static str {
        match self {
            Self::Tags => {
                "INSERT INTO tags (name, slug, match_pattern, matching_algorithm, is_insensitive)
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            },
            Self::Correspondents => {
                "INSERT INTO correspondents (name, slug, match_pattern, matching_algorithm, is_insensitive)
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            },
        }
    }
}

/// Raw entity columns; decoded into a rule outside the row callback so an
/// unknown algorithm code surfaces as a configuration error.
struct EntityRow {
    id: i64,
    name: String,
    slug: String,
    pattern: String,
    algorithm: i64,
    insensitive: bool,
    colour: i64,
}

impl EntityRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            slug: row.get(2)?,
            pattern: row.get(3)?,
            algorithm: row.get(4)?,
            insensitive: row.get(5)?,
            colour: row.get(6)?,
        })
    }

    fn rule(&self) -> Result<MatchRule> {
        Ok(MatchRule {
            pattern: self.pattern.clone(),
            algorithm: MatchingAlgorithm::from_code(self.algorithm)?,
            case_sensitive: !self.insensitive,
        })
    }

    fn into_tag(self) -> Result<Tag> {
        let rule = self.rule()?;
        Ok(Tag {
            id: EntityId::new(self.id),
            name: self.name,
            slug: self.slug,
            rule,
            colour: u8::try_from(self.colour).unwrap_or(1),
        })
    }

    fn into_correspondent(self) -> Result<Correspondent> {
        let rule = self.rule()?;
        Ok(Correspondent {
            id: EntityId::new(self.id),
            name: self.name,
            slug: self.slug,
            rule,
        })
    }
}

/// `SQLite`-based document store.
///
/// # Concurrency Model
///
/// Uses a `Mutex<Connection>` for thread-safe access. Writes run inside
/// `BEGIN IMMEDIATE` so two writers never interleave, and the `UNIQUE`
/// checksum constraint rejects a duplicate even if two ingestions of the same
/// bytes race past the pre-check.
///
/// # Schema
///
/// - `correspondents`, `tags`: name, slug, match rule (pattern, algorithm code, case flag)
/// - `documents`: checksum (unique), title, content, file type, correspondent,
///   created / added (RFC 3339), storage type, page count
/// - `document_tags`: document/tag links
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteDocumentStore {
    /// Opens (or creates) a store at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::io("create_database_dir", parent, &e))?;
        }
        let conn = Connection::open(&db_path).map_err(sql_error("open_sqlite"))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sql_error("open_sqlite_in_memory"))?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub const fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        configure_connection(&conn)?;
        conn.execute_batch(SCHEMA)
            .map_err(sql_error("create_schema"))
    }

    fn list_entities(&self, table: EntityTable) -> Result<Vec<EntityRow>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(table.select_all())
            .map_err(sql_error("prepare_list_entities"))?;
        let rows = stmt
            .query_map([], EntityRow::from_row)
            .map_err(sql_error("list_entities"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql_error("read_entity_row"))?;
        Ok(rows)
    }

    fn create_entity(&self, table: EntityTable, entity: &NewEntity) -> Result<EntityRow> {
        let name = entity.name.trim();
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(Error::InvalidInput(format!(
                "entity name '{}' has no usable characters",
                entity.name
            )));
        }
        validate_rule(&entity.rule)?;

        let conn = acquire_lock(&self.conn);
        in_transaction(&conn, |c| {
            insert_entity(c, table, name, &slug, &entity.rule)?;
            fetch_by_slug(c, table, &slug)?.ok_or_else(|| Error::OperationFailed {
                operation: "create_entity".to_string(),
                cause: format!("inserted entity '{slug}' not found"),
            })
        })
    }

    fn entity_for_name(&self, table: EntityTable, name: &str) -> Result<EntityRow> {
        let name = name.trim();
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(Error::InvalidInput(format!(
                "entity name '{name}' has no usable characters"
            )));
        }

        let conn = acquire_lock(&self.conn);
        in_transaction(&conn, |c| {
            if let Some(existing) = fetch_by_slug(c, table, &slug)? {
                return Ok(existing);
            }
            tracing::debug!(name, slug = %slug, ?table, "Creating entity from filename");
            insert_entity(c, table, name, &slug, &MatchRule::default())?;
            fetch_by_slug(c, table, &slug)?.ok_or_else(|| Error::OperationFailed {
                operation: "entity_for_name".to_string(),
                cause: format!("inserted entity '{slug}' not found"),
            })
        })
    }
}

fn insert_entity(
    conn: &Connection,
    table: EntityTable,
    name: &str,
    slug: &str,
    rule: &MatchRule,
) -> Result<()> {
    conn.execute(
        table.insert(),
        params![
            name,
            slug,
            rule.pattern,
            rule.algorithm.code(),
            !rule.case_sensitive
        ],
    )
    .map_err(sql_error("insert_entity"))?;
    Ok(())
}

fn fetch_by_slug(conn: &Connection, table: EntityTable, slug: &str) -> Result<Option<EntityRow>> {
    conn.query_row(table.select_by_slug(), params![slug], EntityRow::from_row)
        .optional()
        .map_err(sql_error("fetch_entity"))
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::OperationFailed {
            operation: "read_document".to_string(),
            cause: format!("invalid {column} timestamp '{value}': {e}"),
        })
}

fn load_document(conn: &Connection, id: DocumentId) -> Result<Option<Document>> {
    type Row = (
        String,
        Option<String>,
        String,
        String,
        Option<i64>,
        String,
        String,
        String,
        Option<i64>,
        Option<String>,
    );

    let row: Option<Row> = conn
        .query_row(
            "SELECT checksum, title, content, file_type, correspondent_id, created, added,
                    storage_type, page_count, archive_checksum
             FROM documents WHERE id = ?1",
            params![id.get()],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                    r.get(7)?,
                    r.get(8)?,
                    r.get(9)?,
                ))
            },
        )
        .optional()
        .map_err(sql_error("get_document"))?;

    let Some((
        checksum,
        title,
        content,
        file_type,
        correspondent,
        created,
        added,
        storage,
        pages,
        archive_checksum,
    )) = row
    else {
        return Ok(None);
    };

    let mut stmt = conn
        .prepare("SELECT tag_id FROM document_tags WHERE document_id = ?1 ORDER BY tag_id")
        .map_err(sql_error("prepare_document_tags"))?;
    let tags = stmt
        .query_map(params![id.get()], |r| r.get::<_, i64>(0).map(EntityId::new))
        .map_err(sql_error("document_tags"))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(sql_error("read_document_tag"))?;

    let storage_mode = StorageMode::parse(&storage).ok_or_else(|| Error::OperationFailed {
        operation: "read_document".to_string(),
        cause: format!("unknown storage type '{storage}'"),
    })?;

    Ok(Some(Document {
        id,
        checksum,
        title,
        content,
        file_type,
        correspondent: correspondent.map(EntityId::new),
        tags,
        created: parse_timestamp(&created, "created")?,
        added: parse_timestamp(&added, "added")?,
        storage_mode,
        page_count: pages.and_then(|p| u32::try_from(p).ok()),
        archive_checksum,
    }))
}

impl DocumentStore for SqliteDocumentStore {
    #[instrument(skip(self), fields(operation = "checksum_exists", backend = BACKEND))]
    fn checksum_exists(&self, checksum: &str) -> Result<bool> {
        timed(BACKEND, "checksum_exists", || {
            let conn = acquire_lock(&self.conn);
            let found: Option<i64> = conn
                .query_row(
                    "SELECT id FROM documents WHERE checksum = ?1",
                    params![checksum],
                    |r| r.get(0),
                )
                .optional()
                .map_err(sql_error("checksum_exists"))?;
            Ok(found.is_some())
        })
    }

    #[instrument(skip(self), fields(operation = "tags", backend = BACKEND))]
    fn tags(&self) -> Result<Vec<Tag>> {
        timed(BACKEND, "tags", || {
            self.list_entities(EntityTable::Tags)?
                .into_iter()
                .map(EntityRow::into_tag)
                .collect()
        })
    }

    #[instrument(skip(self), fields(operation = "correspondents", backend = BACKEND))]
    fn correspondents(&self) -> Result<Vec<Correspondent>> {
        timed(BACKEND, "correspondents", || {
            self.list_entities(EntityTable::Correspondents)?
                .into_iter()
                .map(EntityRow::into_correspondent)
                .collect()
        })
    }

    #[instrument(skip(self, tag), fields(operation = "create_tag", backend = BACKEND, name = %tag.name))]
    fn create_tag(&self, tag: &NewEntity) -> Result<Tag> {
        timed(BACKEND, "create_tag", || {
            self.create_entity(EntityTable::Tags, tag)?.into_tag()
        })
    }

    #[instrument(skip(self, correspondent), fields(operation = "create_correspondent", backend = BACKEND, name = %correspondent.name))]
    fn create_correspondent(&self, correspondent: &NewEntity) -> Result<Correspondent> {
        timed(BACKEND, "create_correspondent", || {
            self.create_entity(EntityTable::Correspondents, correspondent)?
                .into_correspondent()
        })
    }

    #[instrument(skip(self), fields(operation = "tag_for_name", backend = BACKEND))]
    fn tag_for_name(&self, name: &str) -> Result<Tag> {
        timed(BACKEND, "tag_for_name", || {
            self.entity_for_name(EntityTable::Tags, name)?.into_tag()
        })
    }

    #[instrument(skip(self), fields(operation = "correspondent_for_name", backend = BACKEND))]
    fn correspondent_for_name(&self, name: &str) -> Result<Correspondent> {
        timed(BACKEND, "correspondent_for_name", || {
            self.entity_for_name(EntityTable::Correspondents, name)?
                .into_correspondent()
        })
    }

    #[instrument(
        skip(self, document, finalize),
        fields(operation = "insert_document", backend = BACKEND, checksum = %document.checksum)
    )]
    fn insert_document(
        &self,
        document: &NewDocument,
        finalize: &mut Finalize<'_>,
    ) -> Result<Document> {
        timed(BACKEND, "insert_document", || {
            let mut tags = document.tags.clone();
            tags.sort_unstable();
            tags.dedup();
            let added = Utc::now();

            let conn = acquire_lock(&self.conn);
            in_transaction(&conn, |c| {
                c.execute(
                    "INSERT INTO documents (checksum, title, content, file_type, correspondent_id,
                                            created, added, storage_type, page_count,
                                            archive_checksum)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        document.checksum,
                        document.title,
                        document.content,
                        document.file_type,
                        document.correspondent.map(EntityId::get),
                        document.created.to_rfc3339(),
                        added.to_rfc3339(),
                        document.storage_mode.as_str(),
                        document.page_count,
                        document.archive_checksum,
                    ],
                )
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        Error::Duplicate {
                            checksum: document.checksum.clone(),
                        }
                    } else {
                        sql_error("insert_document")(e)
                    }
                })?;
                let id = DocumentId::new(c.last_insert_rowid());

                for tag in &tags {
                    c.execute(
                        "INSERT INTO document_tags (document_id, tag_id) VALUES (?1, ?2)",
                        params![id.get(), tag.get()],
                    )
                    .map_err(sql_error("link_document_tag"))?;
                }

                let stored = Document {
                    id,
                    checksum: document.checksum.clone(),
                    title: document.title.clone(),
                    content: document.content.clone(),
                    file_type: document.file_type.clone(),
                    correspondent: document.correspondent,
                    tags,
                    created: document.created,
                    added,
                    storage_mode: document.storage_mode,
                    page_count: document.page_count,
                    archive_checksum: document.archive_checksum.clone(),
                };

                finalize(&stored)?;
                Ok(stored)
            })
        })
    }

    #[instrument(skip(self), fields(operation = "get_document", backend = BACKEND, document.id = %id))]
    fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
        timed(BACKEND, "get_document", || {
            let conn = acquire_lock(&self.conn);
            load_document(&conn, id)
        })
    }

    #[instrument(skip(self), fields(operation = "document_count", backend = BACKEND))]
    fn document_count(&self) -> Result<usize> {
        timed(BACKEND, "document_count", || {
            let conn = acquire_lock(&self.conn);
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))
                .map_err(sql_error("document_count"))?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
    }
}

//! SQL statement builder.
//!
//! Table and column names come from [`Table`] and static strings; values are
//! always bound as positional parameters.

use rusqlite::types::Value;
use textbench_core::ElementType;

/// Tables of the corpus schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Document,
    Paragraph,
    Sentence,
    Token,
    Lemma,
    Pos,
    TokenLemma,
    TokenPos,
}

impl Table {
    /// Deletion order: join tables, then the containment tree bottom-up,
    /// then the value tables.
    pub const CLEAR_ORDER: [Table; 8] = [
        Table::TokenPos,
        Table::TokenLemma,
        Table::Token,
        Table::Sentence,
        Table::Paragraph,
        Table::Document,
        Table::Lemma,
        Table::Pos,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Paragraph => "paragraph",
            Self::Sentence => "sentence",
            Self::Token => "token",
            Self::Lemma => "lemma",
            Self::Pos => "pos",
            Self::TokenLemma => "token_lemma",
            Self::TokenPos => "token_pos",
        }
    }

    pub fn for_element(element: ElementType) -> Self {
        match element {
            ElementType::Document => Self::Document,
            ElementType::Paragraph => Self::Paragraph,
            ElementType::Sentence => Self::Sentence,
            ElementType::Token => Self::Token,
            ElementType::Lemma => Self::Lemma,
            ElementType::Pos => Self::Pos,
        }
    }

    /// Whether rows link to their predecessor through `previous_id`.
    pub fn has_previous(self) -> bool {
        matches!(self, Self::Paragraph | Self::Sentence | Self::Token)
    }
}

/// The schema, created on open.
pub const SCHEMA: &str = r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS document (
        id INTEGER PRIMARY KEY,
        external_id TEXT NOT NULL UNIQUE,
        text TEXT NOT NULL,
        language TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS paragraph (
        id INTEGER PRIMARY KEY,
        document_id INTEGER NOT NULL REFERENCES document(id),
        begin_offset INTEGER NOT NULL,
        end_offset INTEGER NOT NULL,
        previous_id INTEGER REFERENCES paragraph(id)
    );

    CREATE TABLE IF NOT EXISTS sentence (
        id INTEGER PRIMARY KEY,
        document_id INTEGER NOT NULL REFERENCES document(id),
        paragraph_id INTEGER NOT NULL REFERENCES paragraph(id),
        begin_offset INTEGER NOT NULL,
        end_offset INTEGER NOT NULL,
        previous_id INTEGER REFERENCES sentence(id)
    );

    CREATE TABLE IF NOT EXISTS token (
        id INTEGER PRIMARY KEY,
        document_id INTEGER NOT NULL REFERENCES document(id),
        paragraph_id INTEGER NOT NULL REFERENCES paragraph(id),
        sentence_id INTEGER NOT NULL REFERENCES sentence(id),
        begin_offset INTEGER NOT NULL,
        end_offset INTEGER NOT NULL,
        value TEXT NOT NULL,
        previous_id INTEGER REFERENCES token(id)
    );

    CREATE TABLE IF NOT EXISTS lemma (
        id INTEGER PRIMARY KEY,
        value TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS pos (
        id INTEGER PRIMARY KEY,
        value TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS token_lemma (
        token_id INTEGER PRIMARY KEY REFERENCES token(id),
        lemma_id INTEGER NOT NULL REFERENCES lemma(id)
    );

    CREATE TABLE IF NOT EXISTS token_pos (
        token_id INTEGER PRIMARY KEY REFERENCES token(id),
        pos_id INTEGER NOT NULL REFERENCES pos(id)
    );

    CREATE INDEX IF NOT EXISTS idx_paragraph_document ON paragraph(document_id);
    CREATE INDEX IF NOT EXISTS idx_sentence_document ON sentence(document_id);
    CREATE INDEX IF NOT EXISTS idx_token_document ON token(document_id);
    CREATE INDEX IF NOT EXISTS idx_token_value ON token(value);
    CREATE INDEX IF NOT EXISTS idx_token_previous ON token(previous_id);
    CREATE INDEX IF NOT EXISTS idx_token_lemma_lemma ON token_lemma(lemma_id);
    CREATE INDEX IF NOT EXISTS idx_token_pos_pos ON token_pos(pos_id);
"#;

/// A statement with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    sql: String,
    params: Vec<Value>,
    filtered: bool,
}

impl SqlQuery {
    fn raw(sql: String) -> Self {
        Self {
            sql,
            params: Vec::new(),
            filtered: false,
        }
    }

    /// `SELECT {columns} FROM {table}`
    pub fn select(columns: &str, from: Table) -> Self {
        Self::raw(format!("SELECT {columns} FROM {}", from.as_str()))
    }

    /// `SELECT {columns} FROM {table} {alias}`
    pub fn select_as(columns: &str, from: Table, alias: &str) -> Self {
        Self::raw(format!("SELECT {columns} FROM {} {alias}", from.as_str()))
    }

    /// `INSERT INTO {table} ({columns}) VALUES (?, ...)`
    pub fn insert(table: Table, columns: &[&str], values: Vec<Value>) -> Self {
        Self::insert_with("INSERT", table, columns, values)
    }

    /// `INSERT OR IGNORE INTO ...`, used to merge value rows.
    pub fn insert_or_ignore(table: Table, columns: &[&str], values: Vec<Value>) -> Self {
        Self::insert_with("INSERT OR IGNORE", table, columns, values)
    }

    fn insert_with(verb: &str, table: Table, columns: &[&str], values: Vec<Value>) -> Self {
        let placeholders = vec!["?"; columns.len()].join(", ");
        let mut query = Self::raw(format!(
            "{verb} INTO {} ({}) VALUES ({placeholders})",
            table.as_str(),
            columns.join(", ")
        ));
        query.params = values;
        query
    }

    /// `DELETE FROM {table}`
    pub fn delete(table: Table) -> Self {
        Self::raw(format!("DELETE FROM {}", table.as_str()))
    }

    /// `UPDATE {table} SET previous_id = NULL`
    pub fn unlink_previous(table: Table) -> Self {
        Self::raw(format!("UPDATE {} SET previous_id = NULL", table.as_str()))
    }

    pub fn join(self, table: Table, on: &str) -> Self {
        self.push(&format!(" JOIN {} ON {on}", table.as_str()))
    }

    pub fn join_as(self, table: Table, alias: &str, on: &str) -> Self {
        self.push(&format!(" JOIN {} {alias} ON {on}", table.as_str()))
    }

    pub fn left_join(self, table: Table, on: &str) -> Self {
        self.push(&format!(" LEFT JOIN {} ON {on}", table.as_str()))
    }

    /// `WHERE {column} = ?` (or `AND ...` after the first filter).
    pub fn filter(mut self, column: &str, value: impl Into<Value>) -> Self {
        let keyword = if self.filtered { "AND" } else { "WHERE" };
        self.filtered = true;
        self.params.push(value.into());
        self.push(&format!(" {keyword} {column} = ?"))
    }

    pub fn group_by(self, expr: &str) -> Self {
        self.push(&format!(" GROUP BY {expr}"))
    }

    pub fn order_by(self, expr: &str) -> Self {
        self.push(&format!(" ORDER BY {expr}"))
    }

    fn push(mut self, fragment: &str) -> Self {
        self.sql.push_str(fragment);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_with_joins_and_filters() {
        let query = SqlQuery::select("COUNT(*)", Table::Token)
            .join(Table::TokenLemma, "token_lemma.token_id = token.id")
            .join(Table::Lemma, "lemma.id = token_lemma.lemma_id")
            .filter("token.document_id", 7i64)
            .filter("lemma.value", "cat".to_string());
        assert_eq!(
            query.sql(),
            "SELECT COUNT(*) FROM token \
             JOIN token_lemma ON token_lemma.token_id = token.id \
             JOIN lemma ON lemma.id = token_lemma.lemma_id \
             WHERE token.document_id = ? AND lemma.value = ?"
        );
        assert_eq!(
            query.params(),
            &[Value::Integer(7), Value::Text("cat".to_string())]
        );
    }

    #[test]
    fn test_fragments_appended_in_order() {
        let query = SqlQuery::select_as("t1.value, COUNT(*)", Table::Token, "t1")
            .join_as(Table::Token, "t2", "t2.previous_id = t1.id")
            .left_join(Table::Document, "document.id = t1.document_id")
            .group_by("t1.value")
            .order_by("t1.value");
        assert_eq!(
            query.sql(),
            "SELECT t1.value, COUNT(*) FROM token t1 \
             JOIN token t2 ON t2.previous_id = t1.id \
             LEFT JOIN document ON document.id = t1.document_id \
             GROUP BY t1.value ORDER BY t1.value"
        );
    }

    #[test]
    fn test_values_are_bound_not_inlined() {
        let hostile = "x'; DROP TABLE token; --".to_string();
        let query = SqlQuery::select("COUNT(*)", Table::Token).filter("value", hostile.clone());
        assert!(!query.sql().contains(&hostile));
        assert_eq!(query.params(), &[Value::Text(hostile)]);
    }

    #[test]
    fn test_insert() {
        let query = SqlQuery::insert_or_ignore(
            Table::Lemma,
            &["value"],
            vec![Value::Text("run".to_string())],
        );
        assert_eq!(query.sql(), "INSERT OR IGNORE INTO lemma (value) VALUES (?)");
    }

    #[test]
    fn test_clear_order_respects_foreign_keys() {
        let position = |t| Table::CLEAR_ORDER.iter().position(|x| *x == t).unwrap();
        assert!(position(Table::TokenLemma) < position(Table::Token));
        assert!(position(Table::Token) < position(Table::Sentence));
        assert!(position(Table::Sentence) < position(Table::Paragraph));
        assert!(position(Table::Paragraph) < position(Table::Document));
        assert!(position(Table::TokenLemma) < position(Table::Lemma));
    }
}

//! Relational backend on SQLite.
//!
//! One table per entity with foreign keys for containment and a
//! self-referencing `previous_id` for reading order. Lemma and POS values
//! live in their own tables and are attached to tokens through the
//! `token_lemma` and `token_pos` join tables.

pub mod sql;

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use textbench_core::{
    ingest, AnnotatedDocument, BackendKind, CorpusBackend, CorpusError, Document, ElementType,
    EntityId, Paragraph, Result, Sentence, Token, TtrCounts,
};

use crate::error::NativeResultExt;
use sql::{SqlQuery, Table, SCHEMA};

const KIND: BackendKind = BackendKind::Relational;

const TOKEN_LEMMA_JOIN: &str = "token_lemma.token_id = token.id";
const LEMMA_JOIN: &str = "lemma.id = token_lemma.lemma_id";
const TOKEN_POS_JOIN: &str = "token_pos.token_id = token.id";
const POS_JOIN: &str = "pos.id = token_pos.pos_id";

/// Relational adapter.
pub struct RelationalAdapter {
    conn: Connection,
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

/// `token` joined to its annotation table for `element`.
fn annotated_tokens(columns: &str, element: ElementType) -> SqlQuery {
    let query = SqlQuery::select(columns, Table::Token);
    if element == ElementType::Pos {
        query
            .join(Table::TokenPos, TOKEN_POS_JOIN)
            .join(Table::Pos, POS_JOIN)
    } else {
        query
            .join(Table::TokenLemma, TOKEN_LEMMA_JOIN)
            .join(Table::Lemma, LEMMA_JOIN)
    }
}

/// Self-join of `n` consecutive tokens `t1 .. tn` through `previous_id`.
fn token_windows(n: usize, with_document: bool) -> SqlQuery {
    let mut columns: Vec<String> = Vec::with_capacity(n + 1);
    if with_document {
        columns.push("document.external_id".to_string());
    }
    columns.extend((1..=n).map(|i| format!("t{i}.value")));

    let mut query = SqlQuery::select_as(&columns.join(", "), Table::Token, "t1");
    for i in 2..=n {
        let alias = format!("t{i}");
        let on = format!("{alias}.previous_id = t{}.id", i - 1);
        query = query.join_as(Table::Token, &alias, &on);
    }
    if with_document {
        query = query.join(Table::Document, "document.id = t1.document_id");
    }
    query
}

impl RelationalAdapter {
    /// Open the database file at `path`, or an in-memory database.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let conn = match path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .native(KIND)?;
        conn.execute_batch(SCHEMA).native(KIND)?;
        tracing::debug!(backend = %KIND, path = ?path, "opened sqlite database");
        Ok(Self { conn })
    }

    fn execute(&self, query: &SqlQuery) -> Result<usize> {
        tracing::trace!(sql = query.sql(), "execute");
        let mut stmt = self.conn.prepare_cached(query.sql()).native(KIND)?;
        stmt.execute(params_from_iter(query.params())).native(KIND)
    }

    fn insert(&self, query: &SqlQuery) -> Result<i64> {
        self.execute(query)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn rows<T>(&self, query: &SqlQuery, map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>) -> Result<Vec<T>> {
        tracing::trace!(sql = query.sql(), "query");
        let mut stmt = self.conn.prepare_cached(query.sql()).native(KIND)?;
        let rows = stmt
            .query_map(params_from_iter(query.params()), map)
            .native(KIND)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .native(KIND)?;
        Ok(rows)
    }

    fn optional_i64(&self, query: &SqlQuery) -> Result<Option<i64>> {
        let mut stmt = self.conn.prepare_cached(query.sql()).native(KIND)?;
        stmt.query_row(params_from_iter(query.params()), |row| row.get(0))
            .optional()
            .native(KIND)
    }

    fn count(&self, query: SqlQuery) -> Result<u64> {
        Ok(self.optional_i64(&query)?.unwrap_or(0).max(0) as u64)
    }

    fn string_counts(&self, query: SqlQuery) -> Result<BTreeMap<String, u64>> {
        let rows = self.rows(&query, |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        Ok(rows.into_iter().map(|(k, n)| (k, n.max(0) as u64)).collect())
    }

    fn strings(&self, query: SqlQuery) -> Result<Vec<Vec<String>>> {
        self.rows(&query, |row| {
            (0..row.as_ref().column_count())
                .map(|i| row.get::<_, String>(i))
                .collect()
        })
    }

    fn find_document(&self, id: &str) -> Result<Option<i64>> {
        self.optional_i64(&SqlQuery::select("id", Table::Document).filter("external_id", text(id)))
    }

    fn require_document(&self, id: &str) -> Result<i64> {
        self.find_document(id)?
            .ok_or_else(|| CorpusError::DocumentNotFound(id.to_string()))
    }

    /// Resolve `id` to a row of `table` stored in `document` and, when
    /// given, under the parent row `container` (`column`, row id).
    fn contained_row(
        &self,
        table: Table,
        id: &EntityId,
        document: (i64, &EntityId),
        container: Option<(&str, i64)>,
    ) -> Result<i64> {
        let (document_row, external) = document;
        let invalid = || {
            CorpusError::invalid_document(
                external.as_str(),
                format!("no {} {id} in this container", table.as_str()),
            )
        };
        let row: i64 = id.as_str().parse().map_err(|_| invalid())?;
        let mut query = SqlQuery::select("id", table)
            .filter("id", row)
            .filter("document_id", document_row);
        if let Some((column, parent)) = container {
            query = query.filter(column, parent);
        }
        self.optional_i64(&query)?.ok_or_else(invalid)
    }

    fn previous_row(
        &self,
        table: Table,
        previous: Option<&EntityId>,
        document: (i64, &EntityId),
        container: Option<(&str, i64)>,
    ) -> Result<Value> {
        match previous {
            Some(id) => Ok(Value::Integer(self.contained_row(table, id, document, container)?)),
            None => Ok(Value::Null),
        }
    }

    /// Insert a value row if absent and return its id.
    fn merge_value(&self, table: Table, value: &str) -> Result<i64> {
        self.execute(&SqlQuery::insert_or_ignore(table, &["value"], vec![text(value)]))?;
        self.optional_i64(&SqlQuery::select("id", table).filter("value", text(value)))?
            .ok_or_else(|| CorpusError::native(KIND, format!("{} row vanished", table.as_str())))
    }
}

impl CorpusBackend for RelationalAdapter {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn store_document(&self, document: &Document) -> Result<EntityId> {
        if self.find_document(&document.id)?.is_some() {
            return Err(CorpusError::DuplicateDocument(document.id.clone()));
        }
        self.insert(&SqlQuery::insert(
            Table::Document,
            &["external_id", "text", "language"],
            vec![text(&document.id), text(&document.text), text(&document.language)],
        ))?;
        Ok(EntityId::new(&document.id))
    }

    fn store_paragraph(&self, paragraph: &Paragraph, previous: Option<&EntityId>) -> Result<EntityId> {
        let document = self.require_document(paragraph.document.as_str())?;
        let scope = (document, &paragraph.document);
        let previous = self.previous_row(Table::Paragraph, previous, scope, None)?;
        let id = self.insert(&SqlQuery::insert(
            Table::Paragraph,
            &["document_id", "begin_offset", "end_offset", "previous_id"],
            vec![
                Value::Integer(document),
                Value::from(paragraph.begin),
                Value::from(paragraph.end),
                previous,
            ],
        ))?;
        Ok(EntityId::from(id))
    }

    fn store_sentence(&self, sentence: &Sentence, previous: Option<&EntityId>) -> Result<EntityId> {
        let document = self.require_document(sentence.document.as_str())?;
        let scope = (document, &sentence.document);
        let paragraph = self.contained_row(Table::Paragraph, &sentence.paragraph, scope, None)?;
        let previous =
            self.previous_row(Table::Sentence, previous, scope, Some(("paragraph_id", paragraph)))?;
        let id = self.insert(&SqlQuery::insert(
            Table::Sentence,
            &["document_id", "paragraph_id", "begin_offset", "end_offset", "previous_id"],
            vec![
                Value::Integer(document),
                Value::Integer(paragraph),
                Value::from(sentence.begin),
                Value::from(sentence.end),
                previous,
            ],
        ))?;
        Ok(EntityId::from(id))
    }

    fn store_token(&self, token: &Token, previous: Option<&EntityId>) -> Result<EntityId> {
        let document = self.require_document(token.document.as_str())?;
        let scope = (document, &token.document);
        let paragraph = self.contained_row(Table::Paragraph, &token.paragraph, scope, None)?;
        let sentence = self.contained_row(
            Table::Sentence,
            &token.sentence,
            scope,
            Some(("paragraph_id", paragraph)),
        )?;
        let previous =
            self.previous_row(Table::Token, previous, scope, Some(("sentence_id", sentence)))?;
        let id = self.insert(&SqlQuery::insert(
            Table::Token,
            &[
                "document_id",
                "paragraph_id",
                "sentence_id",
                "begin_offset",
                "end_offset",
                "value",
                "previous_id",
            ],
            vec![
                Value::Integer(document),
                Value::Integer(paragraph),
                Value::Integer(sentence),
                Value::from(token.begin),
                Value::from(token.end),
                text(&token.value),
                previous,
            ],
        ))?;

        let lemma = self.merge_value(Table::Lemma, &token.lemma)?;
        let pos = self.merge_value(Table::Pos, &token.pos)?;
        self.execute(&SqlQuery::insert(
            Table::TokenLemma,
            &["token_id", "lemma_id"],
            vec![Value::Integer(id), Value::Integer(lemma)],
        ))?;
        self.execute(&SqlQuery::insert(
            Table::TokenPos,
            &["token_id", "pos_id"],
            vec![Value::Integer(id), Value::Integer(pos)],
        ))?;
        Ok(EntityId::from(id))
    }

    /// Top-down ingestion inside one transaction.
    fn store_annotated_document(&self, document: &AnnotatedDocument) -> Result<EntityId> {
        let tx = self.conn.unchecked_transaction().native(KIND)?;
        let id = ingest::store_top_down(self, document)?;
        tx.commit().native(KIND)?;
        Ok(id)
    }

    fn document_exists(&self, id: &str) -> Result<bool> {
        Ok(self.find_document(id)?.is_some())
    }

    fn document_ids(&self) -> Result<Vec<String>> {
        let rows = self.strings(
            SqlQuery::select("external_id", Table::Document).order_by("external_id"),
        )?;
        Ok(rows.into_iter().flatten().collect())
    }

    fn lemmata_for_document(&self, id: &str) -> Result<Vec<String>> {
        let document = self.require_document(id)?;
        let rows = self.strings(
            annotated_tokens("DISTINCT lemma.value", ElementType::Lemma)
                .filter("token.document_id", document)
                .order_by("lemma.value"),
        )?;
        Ok(rows.into_iter().flatten().collect())
    }

    fn count_of_type(&self, element: ElementType) -> Result<u64> {
        self.count(SqlQuery::select("COUNT(*)", Table::for_element(element)))
    }

    fn count_of_type_in_document(&self, document: &str, element: ElementType) -> Result<u64> {
        let document = self.require_document(document)?;
        let query = match element {
            ElementType::Document => return Ok(1),
            ElementType::Lemma => {
                annotated_tokens("COUNT(DISTINCT token_lemma.lemma_id)", element)
                    .filter("token.document_id", document)
            }
            ElementType::Pos => annotated_tokens("COUNT(DISTINCT token_pos.pos_id)", element)
                .filter("token.document_id", document),
            ElementType::Paragraph | ElementType::Sentence | ElementType::Token => {
                SqlQuery::select("COUNT(*)", Table::for_element(element))
                    .filter("document_id", document)
            }
        };
        self.count(query)
    }

    fn count_of_type_with_value(&self, element: ElementType, value: &str) -> Result<u64> {
        let query = match element {
            ElementType::Token => SqlQuery::select("COUNT(*)", Table::Token).filter("value", text(value)),
            ElementType::Lemma => {
                annotated_tokens("COUNT(*)", element).filter("lemma.value", text(value))
            }
            ElementType::Pos => annotated_tokens("COUNT(*)", element).filter("pos.value", text(value)),
            _ => return Err(CorpusError::TypeHasNoValue(element)),
        };
        self.count(query)
    }

    fn count_of_type_with_value_in_document(
        &self,
        document: &str,
        element: ElementType,
        value: &str,
    ) -> Result<u64> {
        let document = self.require_document(document)?;
        let query = match element {
            ElementType::Token => SqlQuery::select("COUNT(*)", Table::Token)
                .filter("document_id", document)
                .filter("value", text(value)),
            ElementType::Lemma => annotated_tokens("COUNT(*)", element)
                .filter("token.document_id", document)
                .filter("lemma.value", text(value)),
            ElementType::Pos => annotated_tokens("COUNT(*)", element)
                .filter("token.document_id", document)
                .filter("pos.value", text(value)),
            _ => return Err(CorpusError::TypeHasNoValue(element)),
        };
        self.count(query)
    }

    fn count_documents_containing_lemma(&self, lemma: &str) -> Result<u64> {
        self.count(
            annotated_tokens("COUNT(DISTINCT token.document_id)", ElementType::Lemma)
                .filter("lemma.value", text(lemma)),
        )
    }

    fn occurrence_count_per_lemma(&self) -> Result<BTreeMap<String, u64>> {
        self.string_counts(
            SqlQuery::select("lemma.value, COUNT(*)", Table::TokenLemma)
                .join(Table::Lemma, LEMMA_JOIN)
                .group_by("lemma.value"),
        )
    }

    fn raw_term_frequencies(&self, document: &str) -> Result<BTreeMap<String, u64>> {
        let document = self.require_document(document)?;
        self.string_counts(
            annotated_tokens("lemma.value, COUNT(*)", ElementType::Lemma)
                .filter("token.document_id", document)
                .group_by("lemma.value"),
        )
    }

    fn ttr_counts_for_all(&self) -> Result<BTreeMap<String, TtrCounts>> {
        let query = SqlQuery::select(
            "document.external_id, COUNT(token.id), COUNT(DISTINCT token_lemma.lemma_id)",
            Table::Document,
        )
        .left_join(Table::Token, "token.document_id = document.id")
        .left_join(Table::TokenLemma, TOKEN_LEMMA_JOIN)
        .group_by("document.id");
        let rows = self.rows(&query, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        Ok(rows
            .into_iter()
            .map(|(id, tokens, lemmata)| {
                let counts = TtrCounts {
                    lemmata: lemmata.max(0) as u64,
                    tokens: tokens.max(0) as u64,
                };
                (id, counts)
            })
            .collect())
    }

    fn ngrams(&self, document: &str, n: usize) -> Result<Vec<Vec<String>>> {
        let document = self.require_document(document)?;
        self.strings(
            token_windows(n.max(1), false)
                .filter("t1.document_id", document)
                .order_by("t1.id"),
        )
    }

    fn ngrams_for_all(&self, n: usize) -> Result<Vec<Vec<String>>> {
        let rows = self.strings(token_windows(n.max(1), true).order_by("document.external_id, t1.id"))?;
        Ok(rows
            .into_iter()
            .map(|row| row.into_iter().skip(1).collect())
            .collect())
    }

    fn clear(&self) -> Result<()> {
        let tx = self.conn.unchecked_transaction().native(KIND)?;
        for table in Table::CLEAR_ORDER {
            if table.has_previous() {
                self.execute(&SqlQuery::unlink_previous(table))?;
            }
            let deleted = self.execute(&SqlQuery::delete(table))?;
            tracing::debug!(backend = %KIND, table = table.as_str(), deleted, "cleared table");
        }
        tx.commit().native(KIND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> RelationalAdapter {
        RelationalAdapter::open(None).unwrap()
    }

    fn sample(id: &str) -> AnnotatedDocument {
        AnnotatedDocument::builder(id)
            .sentence()
            .token("The", "the", "DET")
            .token("cats", "cat", "NOUN")
            .sentence()
            .token("the", "the", "DET")
            .build()
    }

    #[test]
    fn test_join_tables_and_counts() {
        let db = adapter();
        db.store_annotated_document(&sample("d1")).unwrap();

        assert_eq!(db.count_of_type(ElementType::Token).unwrap(), 3);
        assert_eq!(db.count_of_type(ElementType::Lemma).unwrap(), 2);
        assert_eq!(db.count_of_type_in_document("d1", ElementType::Sentence).unwrap(), 2);
        assert_eq!(db.count_of_type_with_value(ElementType::Pos, "DET").unwrap(), 2);
        assert_eq!(
            db.count_of_type_with_value_in_document("d1", ElementType::Token, "the")
                .unwrap(),
            1
        );
        assert_eq!(db.raw_term_frequencies("d1").unwrap()["the"], 2);
    }

    #[test]
    fn test_previous_links_stay_inside_sentences() {
        let db = adapter();
        db.store_annotated_document(&sample("d1")).unwrap();
        assert_eq!(
            db.ngrams("d1", 2).unwrap(),
            vec![vec!["The".to_string(), "cats".to_string()]]
        );
        assert!(db.ngrams("d1", 3).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_document_leaves_no_rows() {
        let db = adapter();
        db.store_document(&Document::new("d1", "", "en")).unwrap();
        let err = db.store_annotated_document(&sample("d1")).unwrap_err();
        assert!(matches!(err, CorpusError::DuplicateDocument(_)));
        assert_eq!(db.count_of_type(ElementType::Document).unwrap(), 1);
        assert_eq!(db.count_of_type(ElementType::Token).unwrap(), 0);
    }

    #[test]
    fn test_clear_unlinks_self_references() {
        let db = adapter();
        db.store_annotated_document(&sample("d1")).unwrap();
        db.store_annotated_document(&sample("d2")).unwrap();
        db.clear().unwrap();
        for element in ElementType::ALL {
            assert_eq!(db.count_of_type(element).unwrap(), 0, "{element}");
        }
        assert!(db.document_ids().unwrap().is_empty());
    }

    #[test]
    fn test_ttr_counts_include_empty_documents() {
        let db = adapter();
        db.store_annotated_document(&sample("d1")).unwrap();
        db.store_document(&Document::new("empty", "", "en")).unwrap();
        let counts = db.ttr_counts_for_all().unwrap();
        assert_eq!(counts["d1"], TtrCounts { lemmata: 2, tokens: 3 });
        assert_eq!(counts["empty"], TtrCounts::default());
    }
}

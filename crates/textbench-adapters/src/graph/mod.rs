//! Graph backend.
//!
//! Every entity is a labelled node. Containment is expressed with
//! `IN_DOCUMENT`, `IN_PARAGRAPH` and `IN_SENTENCE` edges, annotations with
//! `HAS_LEMMA` and `HAS_POS` edges to value nodes merged by value, and
//! reading order with `NEXT` edges between siblings.

pub mod query;
pub mod store;

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use textbench_core::{
    BackendKind, CorpusBackend, CorpusError, Document, ElementType, EntityId, Paragraph, Result,
    Sentence, Token, TtrCounts,
};

use crate::config::AdapterOptions;
use crate::error::NativeResultExt;
use crate::kv;
use query::{Direction, Label, MatchQuery, NodePattern, Rel, Return};
use store::{ClearStats, GraphStore, Props, QueryOutput};

const KIND: BackendKind = BackendKind::Graph;

/// Graph adapter over a sled-backed [`GraphStore`].
pub struct GraphAdapter {
    store: GraphStore,
    clear_batch_size: usize,
}

fn document_node(id: &str) -> NodePattern {
    NodePattern::new(Label::Document).with("id", "document", id)
}

/// `(d:Document {id: $document})<-[:IN_DOCUMENT]-(t:Token)`
fn tokens_of(document: &str) -> MatchQuery {
    MatchQuery::node(document_node(document))
        .incoming(Rel::InDocument, NodePattern::new(Label::Token))
}

fn annotation(element: ElementType) -> Option<(Rel, Label)> {
    match element {
        ElementType::Lemma => Some((Rel::HasLemma, Label::Lemma)),
        ElementType::Pos => Some((Rel::HasPos, Label::Pos)),
        _ => None,
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn count_column(row: &[Value], column: usize) -> u64 {
    row.get(column).and_then(Value::as_u64).unwrap_or(0)
}

fn props<const N: usize>(entries: [(&str, Value); N]) -> Props {
    entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

impl GraphAdapter {
    /// Open the graph at `path`, or a temporary one.
    pub fn open(path: Option<&Path>, options: &AdapterOptions) -> Result<Self> {
        let db = kv::open_db(path).native(KIND)?;
        let store = GraphStore::open(&db).native(KIND)?;
        tracing::debug!(backend = %KIND, path = ?path, "opened graph store");
        Ok(Self {
            store,
            clear_batch_size: options.clear_batch_size,
        })
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Delete the whole graph in capped batches.
    pub fn clear_in_batches(&self) -> Result<ClearStats> {
        let stats = self
            .store
            .clear_in_batches(self.clear_batch_size)
            .native(KIND)?;
        tracing::info!(
            backend = %KIND,
            edges = stats.edges,
            nodes = stats.nodes,
            batches = stats.batches,
            "cleared graph"
        );
        Ok(stats)
    }

    fn run(&self, query: &MatchQuery) -> Result<QueryOutput> {
        self.store.execute(query).native(KIND)
    }

    fn count(&self, query: MatchQuery) -> Result<u64> {
        Ok(self.run(&query)?.scalar())
    }

    fn require_document(&self, id: &str) -> Result<u64> {
        self.store
            .find_nodes(Label::Document, id)
            .native(KIND)?
            .first()
            .copied()
            .ok_or_else(|| CorpusError::DocumentNotFound(id.to_string()))
    }

    /// Resolve `id` to a node labelled `label` that is `IN_DOCUMENT`
    /// `document` and, when given, linked to `container` through its rel.
    fn contained_node(
        &self,
        id: &EntityId,
        label: Label,
        document: (u64, &EntityId),
        container: Option<(Rel, u64)>,
    ) -> Result<u64> {
        let (document_node, external) = document;
        let invalid = || {
            CorpusError::invalid_document(
                external.as_str(),
                format!("no {} {id} in this container", label.as_str()),
            )
        };
        let node = id.as_u64().ok_or_else(invalid)?;
        let record = self.store.node(node).native(KIND)?.ok_or_else(invalid)?;
        if record.label != label {
            return Err(invalid());
        }
        let parents = std::iter::once((Rel::InDocument, document_node)).chain(container);
        for (rel, parent) in parents {
            let linked = self
                .store
                .neighbors(node, rel, Direction::Outgoing)
                .native(KIND)?;
            if !linked.contains(&parent) {
                return Err(invalid());
            }
        }
        Ok(node)
    }

    fn previous_node(
        &self,
        previous: Option<&EntityId>,
        label: Label,
        document: (u64, &EntityId),
        container: Option<(Rel, u64)>,
    ) -> Result<Option<u64>> {
        previous
            .map(|id| self.contained_node(id, label, document, container))
            .transpose()
    }

    fn link_previous(&self, previous: Option<u64>, node: u64) -> Result<()> {
        if let Some(previous) = previous {
            self.store.create_edge(previous, Rel::Next, node).native(KIND)?;
        }
        Ok(())
    }

    /// Rows `[key, paths, distinct]` of a grouped pattern.
    fn grouped(&self, query: MatchQuery) -> Result<Vec<Vec<Value>>> {
        Ok(self.run(&query)?.into_rows())
    }

    /// Extend a pattern ending at a token with `n - 1` `NEXT` hops.
    fn windows(query: MatchQuery, n: usize) -> MatchQuery {
        let mut query = query;
        for _ in 1..n {
            query = query.out(Rel::Next, NodePattern::new(Label::Token));
        }
        query
    }
}

impl CorpusBackend for GraphAdapter {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn store_document(&self, document: &Document) -> Result<EntityId> {
        if !self
            .store
            .find_nodes(Label::Document, &document.id)
            .native(KIND)?
            .is_empty()
        {
            return Err(CorpusError::DuplicateDocument(document.id.clone()));
        }
        self.store
            .create_node(
                Label::Document,
                props([
                    ("id", Value::from(document.id.as_str())),
                    ("text", Value::from(document.text.as_str())),
                    ("language", Value::from(document.language.as_str())),
                ]),
            )
            .native(KIND)?;
        Ok(EntityId::new(&document.id))
    }

    fn store_paragraph(&self, paragraph: &Paragraph, previous: Option<&EntityId>) -> Result<EntityId> {
        let document = self.require_document(paragraph.document.as_str())?;
        let scope = (document, &paragraph.document);
        let previous = self.previous_node(previous, Label::Paragraph, scope, None)?;
        let node = self
            .store
            .create_node(
                Label::Paragraph,
                props([
                    ("begin", Value::from(paragraph.begin)),
                    ("end", Value::from(paragraph.end)),
                ]),
            )
            .native(KIND)?;
        self.store
            .create_edge(node, Rel::InDocument, document)
            .native(KIND)?;
        self.link_previous(previous, node)?;
        Ok(EntityId::from(node))
    }

    fn store_sentence(&self, sentence: &Sentence, previous: Option<&EntityId>) -> Result<EntityId> {
        let document = self.require_document(sentence.document.as_str())?;
        let scope = (document, &sentence.document);
        let paragraph = self.contained_node(&sentence.paragraph, Label::Paragraph, scope, None)?;
        let previous = self.previous_node(
            previous,
            Label::Sentence,
            scope,
            Some((Rel::InParagraph, paragraph)),
        )?;
        let node = self
            .store
            .create_node(
                Label::Sentence,
                props([
                    ("begin", Value::from(sentence.begin)),
                    ("end", Value::from(sentence.end)),
                ]),
            )
            .native(KIND)?;
        self.store
            .create_edge(node, Rel::InDocument, document)
            .native(KIND)?;
        self.store
            .create_edge(node, Rel::InParagraph, paragraph)
            .native(KIND)?;
        self.link_previous(previous, node)?;
        Ok(EntityId::from(node))
    }

    fn store_token(&self, token: &Token, previous: Option<&EntityId>) -> Result<EntityId> {
        let document = self.require_document(token.document.as_str())?;
        let scope = (document, &token.document);
        let paragraph = self.contained_node(&token.paragraph, Label::Paragraph, scope, None)?;
        let sentence = self.contained_node(
            &token.sentence,
            Label::Sentence,
            scope,
            Some((Rel::InParagraph, paragraph)),
        )?;
        let previous =
            self.previous_node(previous, Label::Token, scope, Some((Rel::InSentence, sentence)))?;
        let node = self
            .store
            .create_node(
                Label::Token,
                props([
                    ("value", Value::from(token.value.as_str())),
                    ("begin", Value::from(token.begin)),
                    ("end", Value::from(token.end)),
                ]),
            )
            .native(KIND)?;
        let lemma = self
            .store
            .merge_node(Label::Lemma, &token.lemma)
            .native(KIND)?;
        let pos = self.store.merge_node(Label::Pos, &token.pos).native(KIND)?;

        for (rel, target) in [
            (Rel::InDocument, document),
            (Rel::InParagraph, paragraph),
            (Rel::InSentence, sentence),
            (Rel::HasLemma, lemma),
            (Rel::HasPos, pos),
        ] {
            self.store.create_edge(node, rel, target).native(KIND)?;
        }
        self.link_previous(previous, node)?;
        Ok(EntityId::from(node))
    }

    fn document_exists(&self, id: &str) -> Result<bool> {
        Ok(!self
            .store
            .find_nodes(Label::Document, id)
            .native(KIND)?
            .is_empty())
    }

    fn document_ids(&self) -> Result<Vec<String>> {
        let query = MatchQuery::node(NodePattern::new(Label::Document))
            .returning(Return::Columns(vec![(0, "id")]));
        let mut ids: Vec<String> = self
            .run(&query)?
            .into_rows()
            .iter()
            .filter_map(|row| row.first().map(text))
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn lemmata_for_document(&self, id: &str) -> Result<Vec<String>> {
        self.require_document(id)?;
        let query = tokens_of(id)
            .out(Rel::HasLemma, NodePattern::new(Label::Lemma))
            .returning(Return::GroupBy {
                key: (2, "value"),
                distinct: 1,
            });
        Ok(self
            .grouped(query)?
            .iter()
            .filter_map(|row| row.first().map(text))
            .collect())
    }

    fn count_of_type(&self, element: ElementType) -> Result<u64> {
        self.count(MatchQuery::node(NodePattern::new(element.into())))
    }

    fn count_of_type_in_document(&self, document: &str, element: ElementType) -> Result<u64> {
        self.require_document(document)?;
        let query = match (element, annotation(element)) {
            (ElementType::Document, _) => return Ok(1),
            (_, Some((rel, label))) => tokens_of(document)
                .out(rel, NodePattern::new(label))
                .returning(Return::CountDistinct(2)),
            (_, None) => MatchQuery::node(document_node(document))
                .incoming(Rel::InDocument, NodePattern::new(element.into())),
        };
        self.count(query)
    }

    fn count_of_type_with_value(&self, element: ElementType, value: &str) -> Result<u64> {
        let query = match (element, annotation(element)) {
            (ElementType::Token, _) => {
                MatchQuery::node(NodePattern::new(Label::Token).with("value", "value", value))
            }
            (_, Some((rel, label))) => {
                MatchQuery::node(NodePattern::new(label).with("value", "value", value))
                    .incoming(rel, NodePattern::new(Label::Token))
            }
            (_, None) => return Err(CorpusError::TypeHasNoValue(element)),
        };
        self.count(query)
    }

    fn count_of_type_with_value_in_document(
        &self,
        document: &str,
        element: ElementType,
        value: &str,
    ) -> Result<u64> {
        self.require_document(document)?;
        let query = match (element, annotation(element)) {
            (ElementType::Token, _) => MatchQuery::node(document_node(document)).incoming(
                Rel::InDocument,
                NodePattern::new(Label::Token).with("value", "value", value),
            ),
            (_, Some((rel, label))) => {
                tokens_of(document).out(rel, NodePattern::new(label).with("value", "value", value))
            }
            (_, None) => return Err(CorpusError::TypeHasNoValue(element)),
        };
        self.count(query)
    }

    fn count_documents_containing_lemma(&self, lemma: &str) -> Result<u64> {
        let query = MatchQuery::node(NodePattern::new(Label::Lemma).with("value", "lemma", lemma))
            .incoming(Rel::HasLemma, NodePattern::new(Label::Token))
            .out(Rel::InDocument, NodePattern::new(Label::Document))
            .returning(Return::CountDistinct(2));
        self.count(query)
    }

    fn occurrence_count_per_lemma(&self) -> Result<BTreeMap<String, u64>> {
        let query = MatchQuery::node(NodePattern::new(Label::Lemma))
            .incoming(Rel::HasLemma, NodePattern::new(Label::Token))
            .returning(Return::GroupBy {
                key: (0, "value"),
                distinct: 1,
            });
        Ok(self
            .grouped(query)?
            .iter()
            .filter_map(|row| Some((text(row.first()?), count_column(row, 1))))
            .collect())
    }

    fn raw_term_frequencies(&self, document: &str) -> Result<BTreeMap<String, u64>> {
        self.require_document(document)?;
        let query = tokens_of(document)
            .out(Rel::HasLemma, NodePattern::new(Label::Lemma))
            .returning(Return::GroupBy {
                key: (2, "value"),
                distinct: 1,
            });
        Ok(self
            .grouped(query)?
            .iter()
            .filter_map(|row| Some((text(row.first()?), count_column(row, 1))))
            .collect())
    }

    fn ttr_counts_for_all(&self) -> Result<BTreeMap<String, TtrCounts>> {
        let query = MatchQuery::node(NodePattern::new(Label::Document))
            .incoming(Rel::InDocument, NodePattern::new(Label::Token))
            .out(Rel::HasLemma, NodePattern::new(Label::Lemma))
            .returning(Return::GroupBy {
                key: (0, "id"),
                distinct: 2,
            });
        let mut counts: BTreeMap<String, TtrCounts> = self
            .document_ids()?
            .into_iter()
            .map(|id| (id, TtrCounts::default()))
            .collect();
        for row in self.grouped(query)? {
            let Some(id) = row.first().map(text) else { continue };
            counts.insert(
                id,
                TtrCounts {
                    lemmata: count_column(&row, 2),
                    tokens: count_column(&row, 1),
                },
            );
        }
        Ok(counts)
    }

    fn ngrams(&self, document: &str, n: usize) -> Result<Vec<Vec<String>>> {
        self.require_document(document)?;
        let n = n.max(1);
        let query = Self::windows(tokens_of(document), n)
            .returning(Return::Columns((1..=n).map(|p| (p, "value")).collect()));
        Ok(self
            .run(&query)?
            .into_rows()
            .iter()
            .map(|row| row.iter().map(text).collect())
            .collect())
    }

    fn ngrams_for_all(&self, n: usize) -> Result<Vec<Vec<String>>> {
        let n = n.max(1);
        let mut columns = vec![(0, "id")];
        columns.extend((1..=n).map(|p| (p, "value")));
        let query = Self::windows(
            MatchQuery::node(NodePattern::new(Label::Document))
                .incoming(Rel::InDocument, NodePattern::new(Label::Token)),
            n,
        )
        .returning(Return::Columns(columns));

        // Group by external id so the output follows document id order.
        let mut by_document: BTreeMap<String, Vec<Vec<String>>> = BTreeMap::new();
        for row in self.run(&query)?.into_rows() {
            let Some((id, values)) = row.split_first() else { continue };
            by_document
                .entry(text(id))
                .or_default()
                .push(values.iter().map(text).collect());
        }
        Ok(by_document.into_values().flatten().collect())
    }

    fn clear(&self) -> Result<()> {
        self.clear_in_batches().map(|_| ())
    }
}

//! Native-XML backend.
//!
//! Each document is stored as one serialized XML unit in a sled tree keyed
//! by external id:
//!
//! ```xml
//! <document id="d1" language="en">
//!   <text>...</text>
//!   <paragraph begin="0" end="9">
//!     <sentence begin="0" end="9">
//!       <token begin="0" end="3" lemma="the" pos="DET">The</token>
//!     </sentence>
//!   </paragraph>
//! </document>
//! ```
//!
//! Documents are written whole. The per-entity stores are not supported.

pub mod path;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use sled::Tree;
use textbench_core::{
    AnnotatedDocument, BackendKind, CorpusBackend, CorpusError, Document, ElementType, EntityId,
    Paragraph, Result, Sentence, Token,
};

use crate::error::NativeResultExt;
use crate::kv;
use path::{Aggregate, Element, Field, PathQuery, PathValue};

const KIND: BackendKind = BackendKind::Xml;

const COLLECTION_TREE: &str = "xml:collection";

/// Native-XML adapter.
pub struct XmlAdapter {
    collection: Tree,
}

fn element_for(element: ElementType) -> Option<Element> {
    match element {
        ElementType::Document => Some(Element::Document),
        ElementType::Paragraph => Some(Element::Paragraph),
        ElementType::Sentence => Some(Element::Sentence),
        ElementType::Token => Some(Element::Token),
        ElementType::Lemma | ElementType::Pos => None,
    }
}

/// Field of a `<token>` carrying the value of `element`.
fn value_field(element: ElementType) -> Option<Field> {
    match element {
        ElementType::Token => Some(Field::Text),
        ElementType::Lemma => Some(Field::Attribute("lemma")),
        ElementType::Pos => Some(Field::Attribute("pos")),
        _ => None,
    }
}

fn tally(values: Vec<String>) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    counts
}

/// Serialize a document header and its annotation tree.
pub fn to_xml(document: &AnnotatedDocument) -> Result<String> {
    let mut writer = Writer::new(Vec::new());

    let mut root = BytesStart::new("document");
    root.push_attribute(("id", document.id.as_str()));
    root.push_attribute(("language", document.language.as_str()));
    writer.write_event(Event::Start(root)).native(KIND)?;
    write_text(&mut writer, BytesStart::new("text"), &document.text)?;

    for paragraph in &document.paragraphs {
        writer
            .write_event(Event::Start(span("paragraph", paragraph.begin, paragraph.end)))
            .native(KIND)?;
        for sentence in &paragraph.sentences {
            writer
                .write_event(Event::Start(span("sentence", sentence.begin, sentence.end)))
                .native(KIND)?;
            for token in &sentence.tokens {
                let mut element = span("token", token.begin, token.end);
                element.push_attribute(("lemma", token.lemma.as_str()));
                element.push_attribute(("pos", token.pos.as_str()));
                write_text(&mut writer, element, &token.value)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("sentence")))
                .native(KIND)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("paragraph")))
            .native(KIND)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("document")))
        .native(KIND)?;
    String::from_utf8(writer.into_inner()).native(KIND)
}

fn span(name: &'static str, begin: u32, end: u32) -> BytesStart<'static> {
    let mut element = BytesStart::new(name);
    element.push_attribute(("begin", begin.to_string().as_str()));
    element.push_attribute(("end", end.to_string().as_str()));
    element
}

fn write_text(writer: &mut Writer<Vec<u8>>, start: BytesStart<'_>, text: &str) -> Result<()> {
    let end = start.to_end().into_owned();
    writer.write_event(Event::Start(start)).native(KIND)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .native(KIND)?;
    writer.write_event(Event::End(end)).native(KIND)?;
    Ok(())
}

impl XmlAdapter {
    /// Open the collection at `path`, or a temporary one.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let db = kv::open_db(path).native(KIND)?;
        let collection = db.open_tree(COLLECTION_TREE).native(KIND)?;
        tracing::debug!(backend = %KIND, path = ?path, "opened xml collection");
        Ok(Self { collection })
    }

    /// Stored XML text of one document.
    pub fn document_xml(&self, id: &str) -> Result<String> {
        let bytes = self
            .collection
            .get(id)
            .native(KIND)?
            .ok_or_else(|| CorpusError::DocumentNotFound(id.to_string()))?;
        String::from_utf8(bytes.to_vec()).native(KIND)
    }

    fn put(&self, id: &str, xml: String) -> Result<EntityId> {
        let swapped = self
            .collection
            .compare_and_swap(id, None as Option<&[u8]>, Some(xml.into_bytes()))
            .native(KIND)?;
        if swapped.is_err() {
            return Err(CorpusError::DuplicateDocument(id.to_string()));
        }
        Ok(EntityId::new(id))
    }

    /// Evaluate `query` against one stored document.
    fn query_document(&self, id: &str, query: &PathQuery) -> Result<PathValue> {
        let xml = self.document_xml(id)?;
        Self::evaluate(&xml, query)
    }

    /// Evaluate `query` against every stored document, in id order.
    fn query_collection(&self, query: &PathQuery) -> Result<Vec<PathValue>> {
        tracing::trace!(xpath = %query.to_xpath(), params = ?query.params(), "collection query");
        let mut results = Vec::new();
        for entry in self.collection.iter().values() {
            let bytes = entry.native(KIND)?;
            let xml = std::str::from_utf8(&bytes).native(KIND)?;
            results.push(Self::evaluate(xml, query)?);
        }
        Ok(results)
    }

    fn evaluate(xml: &str, query: &PathQuery) -> Result<PathValue> {
        let parsed = roxmltree::Document::parse(xml).native(KIND)?;
        Ok(query.evaluate(&parsed))
    }

    fn count_document(&self, id: &str, query: PathQuery) -> Result<u64> {
        tracing::trace!(xpath = %query.to_xpath(), params = ?query.params(), "document query");
        Ok(self.query_document(id, &query)?.count())
    }

    fn sum_collection(&self, query: PathQuery) -> Result<u64> {
        Ok(self.query_collection(&query)?.iter().map(PathValue::count).sum())
    }

    fn values(value: PathValue) -> Vec<String> {
        match value {
            PathValue::Values(values) => values,
            PathValue::Distinct(set) => set.into_iter().collect(),
            PathValue::Windows(windows) => windows.into_iter().flatten().collect(),
            PathValue::Count(_) => Vec::new(),
        }
    }
}

impl CorpusBackend for XmlAdapter {
    fn kind(&self) -> BackendKind {
        KIND
    }

    /// Store a header-only document with an empty body.
    fn store_document(&self, document: &Document) -> Result<EntityId> {
        let header = AnnotatedDocument {
            id: document.id.clone(),
            text: document.text.clone(),
            language: document.language.clone(),
            paragraphs: Vec::new(),
        };
        self.put(&document.id, to_xml(&header)?)
    }

    fn store_paragraph(&self, _: &Paragraph, _: Option<&EntityId>) -> Result<EntityId> {
        Err(CorpusError::unsupported(KIND, "store_paragraph"))
    }

    fn store_sentence(&self, _: &Sentence, _: Option<&EntityId>) -> Result<EntityId> {
        Err(CorpusError::unsupported(KIND, "store_sentence"))
    }

    fn store_token(&self, _: &Token, _: Option<&EntityId>) -> Result<EntityId> {
        Err(CorpusError::unsupported(KIND, "store_token"))
    }

    fn store_annotated_document(&self, document: &AnnotatedDocument) -> Result<EntityId> {
        document.validate()?;
        let id = self.put(&document.id, to_xml(document)?)?;
        tracing::debug!(
            backend = %KIND,
            document = %id,
            tokens = document.token_count(),
            "stored document"
        );
        Ok(id)
    }

    fn document_exists(&self, id: &str) -> Result<bool> {
        self.collection.contains_key(id).native(KIND)
    }

    fn document_ids(&self) -> Result<Vec<String>> {
        self.collection
            .iter()
            .keys()
            .map(|key| Ok(String::from_utf8_lossy(&key.native(KIND)?).into_owned()))
            .collect()
    }

    fn lemmata_for_document(&self, id: &str) -> Result<Vec<String>> {
        let query = PathQuery::document(id)
            .descendant(Element::Token)
            .returning(Aggregate::DistinctCount(Field::Attribute("lemma")));
        Ok(Self::values(self.query_document(id, &query)?))
    }

    fn count_of_type(&self, element: ElementType) -> Result<u64> {
        match (element_for(element), value_field(element)) {
            (Some(Element::Document), _) => Ok(self.collection.len() as u64),
            (Some(target), _) => self.sum_collection(PathQuery::collection().descendant(target)),
            (None, Some(field)) => {
                let query = PathQuery::collection()
                    .descendant(Element::Token)
                    .returning(Aggregate::DistinctCount(field));
                let distinct: BTreeSet<String> = self
                    .query_collection(&query)?
                    .into_iter()
                    .flat_map(Self::values)
                    .collect();
                Ok(distinct.len() as u64)
            }
            (None, None) => Err(CorpusError::TypeNotCountable {
                element,
                backend: KIND,
            }),
        }
    }

    fn count_of_type_in_document(&self, document: &str, element: ElementType) -> Result<u64> {
        let query = match (element_for(element), value_field(element)) {
            (Some(Element::Document), _) => PathQuery::document(document),
            (Some(target), _) => PathQuery::document(document).descendant(target),
            (None, Some(field)) => PathQuery::document(document)
                .descendant(Element::Token)
                .returning(Aggregate::DistinctCount(field)),
            (None, None) => {
                return Err(CorpusError::TypeNotCountable {
                    element,
                    backend: KIND,
                })
            }
        };
        self.count_document(document, query)
    }

    fn count_of_type_with_value(&self, element: ElementType, value: &str) -> Result<u64> {
        let field = value_field(element).ok_or(CorpusError::TypeHasNoValue(element))?;
        self.sum_collection(
            PathQuery::collection()
                .descendant(Element::Token)
                .filter(field, "value", value),
        )
    }

    fn count_of_type_with_value_in_document(
        &self,
        document: &str,
        element: ElementType,
        value: &str,
    ) -> Result<u64> {
        let field = value_field(element).ok_or(CorpusError::TypeHasNoValue(element))?;
        self.count_document(
            document,
            PathQuery::document(document)
                .descendant(Element::Token)
                .filter(field, "value", value),
        )
    }

    fn count_documents_containing_lemma(&self, lemma: &str) -> Result<u64> {
        let query = PathQuery::collection()
            .descendant(Element::Token)
            .filter(Field::Attribute("lemma"), "lemma", lemma);
        Ok(self
            .query_collection(&query)?
            .iter()
            .filter(|value| value.count() > 0)
            .count() as u64)
    }

    fn occurrence_count_per_lemma(&self) -> Result<BTreeMap<String, u64>> {
        let query = PathQuery::collection()
            .descendant(Element::Token)
            .returning(Aggregate::Values(Field::Attribute("lemma")));
        Ok(tally(
            self.query_collection(&query)?
                .into_iter()
                .flat_map(Self::values)
                .collect(),
        ))
    }

    fn raw_term_frequencies(&self, document: &str) -> Result<BTreeMap<String, u64>> {
        let query = PathQuery::document(document)
            .descendant(Element::Token)
            .returning(Aggregate::Values(Field::Attribute("lemma")));
        Ok(tally(Self::values(self.query_document(document, &query)?)))
    }

    fn ngrams(&self, document: &str, n: usize) -> Result<Vec<Vec<String>>> {
        let query = PathQuery::document(document)
            .descendant(Element::Sentence)
            .child(Element::Token)
            .returning(Aggregate::Windows(n.max(1), Field::Text));
        match self.query_document(document, &query)? {
            PathValue::Windows(windows) => Ok(windows),
            _ => Ok(Vec::new()),
        }
    }

    fn clear(&self) -> Result<()> {
        self.collection.clear().native(KIND)?;
        tracing::info!(backend = %KIND, "cleared xml collection");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> XmlAdapter {
        XmlAdapter::open(None).unwrap()
    }

    #[test]
    fn test_serialized_layout_escapes_values() {
        let doc = AnnotatedDocument::builder("d<1>")
            .token("AT&T", "at&t", "PROPN")
            .build();
        let xml = to_xml(&doc).unwrap();
        assert_eq!(
            xml,
            "<document id=\"d&lt;1&gt;\" language=\"en\"><text>AT&amp;T</text>\
             <paragraph begin=\"0\" end=\"4\"><sentence begin=\"0\" end=\"4\">\
             <token begin=\"0\" end=\"4\" lemma=\"at&amp;t\" pos=\"PROPN\">AT&amp;T</token>\
             </sentence></paragraph></document>"
        );
        let parsed = roxmltree::Document::parse(&xml).unwrap();
        assert_eq!(parsed.root_element().attribute("id"), Some("d<1>"));
    }

    #[test]
    fn test_queries_over_collection() {
        let xml = adapter();
        xml.store_annotated_document(&AnnotatedDocument::builder("a").words("the cat the").build())
            .unwrap();
        xml.store_annotated_document(&AnnotatedDocument::builder("b").words("a cat").build())
            .unwrap();

        assert_eq!(xml.count_of_type(ElementType::Lemma).unwrap(), 3);
        assert_eq!(xml.count_of_type(ElementType::Token).unwrap(), 5);
        assert_eq!(xml.count_documents_containing_lemma("cat").unwrap(), 2);
        assert_eq!(xml.raw_term_frequencies("a").unwrap()["the"], 2);
        assert_eq!(xml.occurrence_count_per_lemma().unwrap()["cat"], 2);
        assert_eq!(xml.lemmata_for_document("a").unwrap(), vec!["cat", "the"]);
    }

    #[test]
    fn test_per_entity_stores_unsupported() {
        let xml = adapter();
        let id = xml.store_document(&Document::new("d1", "", "en")).unwrap();
        assert!(xml.document_exists("d1").unwrap());
        assert_eq!(xml.count_of_type_in_document("d1", ElementType::Token).unwrap(), 0);

        let err = xml
            .store_paragraph(
                &Paragraph {
                    document: id,
                    begin: 0,
                    end: 0,
                },
                None,
            )
            .unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_unknown_document() {
        let xml = adapter();
        assert!(matches!(
            xml.ngrams("missing", 2),
            Err(CorpusError::DocumentNotFound(_))
        ));
    }
}

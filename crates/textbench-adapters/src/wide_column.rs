//! Wide-column backend.
//!
//! Each entity lives in its own column family (a sled tree) partitioned by
//! document id. Everything a read needs is denormalized at write time into
//! mapping tables keyed by partition:
//!
//! | table                  | partition | clustering | value        |
//! |------------------------|-----------|------------|--------------|
//! | `token_lemma`          | lemma     | token id   | document id  |
//! | `document_lemma`       | document  | lemma      | occurrences  |
//! | `lemma_document`       | lemma     | document   | occurrences  |
//! | `document_token_value` | document  | value      | occurrences  |
//! | `document_pos`         | document  | pos        | occurrences  |
//!
//! Partition keys are length-prefixed, so no partition is a prefix of
//! another. Reads never join: every answer is a point lookup, a partition
//! scan or a family size.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use textbench_core::{
    BackendKind, CorpusBackend, CorpusError, Document, ElementType, EntityId, Paragraph, Result,
    Sentence, Token,
};

use crate::error::NativeResultExt;
use crate::kv;

const KIND: BackendKind = BackendKind::WideColumn;

#[derive(Debug, Serialize, Deserialize)]
struct DocumentRow {
    text: String,
    language: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ParagraphRow {
    begin: u32,
    end: u32,
    previous: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SentenceRow {
    paragraph: u64,
    begin: u32,
    end: u32,
    previous: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenRow {
    paragraph: u64,
    sentence: u64,
    begin: u32,
    end: u32,
    value: String,
    lemma: String,
    pos: String,
    previous: Option<u64>,
}

/// Wide-column adapter.
pub struct WideColumnAdapter {
    db: Db,
    document: Tree,
    paragraph: Tree,
    sentence: Tree,
    token: Tree,
    /// lemma -> corpus occurrences, one cell per distinct lemma
    lemma: Tree,
    /// pos -> corpus occurrences
    pos: Tree,
    /// token value -> corpus occurrences
    token_value: Tree,
    token_lemma: Tree,
    document_lemma: Tree,
    lemma_document: Tree,
    document_token_value: Tree,
    document_pos: Tree,
}

fn partition(key: &str) -> Vec<u8> {
    kv::partition(key.as_bytes())
}

fn row_key(document: &str, id: u64) -> Vec<u8> {
    let mut key = partition(document);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn cell(partition_key: &str, clustering: &str) -> Vec<u8> {
    let mut key = partition(partition_key);
    key.extend_from_slice(clustering.as_bytes());
    key
}

fn outside(entity: &str, id: &EntityId, document: &EntityId) -> CorpusError {
    CorpusError::invalid_document(
        document.as_str(),
        format!("no {entity} {id} in this container"),
    )
}

impl WideColumnAdapter {
    /// Open the column families at `path`, or in a temporary database.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let db = kv::open_db(path).native(KIND)?;
        let family = |name: &str| db.open_tree(format!("wide:{name}")).native(KIND);
        let adapter = Self {
            document: family("document")?,
            paragraph: family("paragraph")?,
            sentence: family("sentence")?,
            token: family("token")?,
            lemma: family("lemma")?,
            pos: family("pos")?,
            token_value: family("token_value")?,
            token_lemma: family("token_lemma")?,
            document_lemma: family("document_lemma")?,
            lemma_document: family("lemma_document")?,
            document_token_value: family("document_token_value")?,
            document_pos: family("document_pos")?,
            db,
        };
        tracing::debug!(backend = %KIND, path = ?path, "opened column families");
        Ok(adapter)
    }

    fn families(&self) -> [&Tree; 12] {
        [
            &self.document,
            &self.paragraph,
            &self.sentence,
            &self.token,
            &self.lemma,
            &self.pos,
            &self.token_value,
            &self.token_lemma,
            &self.document_lemma,
            &self.lemma_document,
            &self.document_token_value,
            &self.document_pos,
        ]
    }

    fn require_document(&self, id: &str) -> Result<()> {
        if self.document.contains_key(id).native(KIND)? {
            Ok(())
        } else {
            Err(CorpusError::DocumentNotFound(id.to_string()))
        }
    }

    /// Load row `id` of `family` from the partition of `document`.
    fn contained_row<T: DeserializeOwned>(
        family: &Tree,
        entity: &str,
        id: &EntityId,
        document: &EntityId,
    ) -> Result<(u64, T)> {
        let row_id = id.as_u64().ok_or_else(|| outside(entity, id, document))?;
        let bytes = family
            .get(row_key(document.as_str(), row_id))
            .native(KIND)?
            .ok_or_else(|| outside(entity, id, document))?;
        Ok((row_id, serde_json::from_slice(&bytes).native(KIND)?))
    }

    fn put_row<T: Serialize>(&self, family: &Tree, document: &str, row: &T) -> Result<u64> {
        let id = self.db.generate_id().native(KIND)?;
        let bytes = serde_json::to_vec(row).native(KIND)?;
        family.insert(row_key(document, id), bytes).native(KIND)?;
        Ok(id)
    }

    fn partition_size(family: &Tree, document: &str) -> Result<u64> {
        let mut count = 0;
        for key in family.scan_prefix(partition(document)).keys() {
            key.native(KIND)?;
            count += 1;
        }
        Ok(count)
    }

    /// `(clustering key, counter)` cells of one partition.
    fn partition_counters(family: &Tree, key: &str) -> Result<Vec<(String, u64)>> {
        let prefix = partition(key);
        family
            .scan_prefix(&prefix)
            .map(|entry| {
                let (key, value) = entry.native(KIND)?;
                let clustering = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
                Ok((clustering, kv::decode_u64(&value)))
            })
            .collect()
    }

    fn counter(family: &Tree, key: &[u8]) -> Result<u64> {
        kv::counter(family, key).native(KIND)
    }

    fn family_size(family: &Tree) -> u64 {
        family.len() as u64
    }

    fn tokens_in(&self, document: &str) -> Result<Vec<(u64, TokenRow)>> {
        self.token
            .scan_prefix(partition(document))
            .map(|entry| {
                let (key, value) = entry.native(KIND)?;
                let id = kv::trailing_u64(&key)
                    .ok_or_else(|| CorpusError::native(KIND, "malformed token key"))?;
                let row: TokenRow = serde_json::from_slice(&value).native(KIND)?;
                Ok((id, row))
            })
            .collect()
    }
}

impl CorpusBackend for WideColumnAdapter {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn store_document(&self, document: &Document) -> Result<EntityId> {
        let row = DocumentRow {
            text: document.text.clone(),
            language: document.language.clone(),
        };
        let bytes = serde_json::to_vec(&row).native(KIND)?;
        let previous = self
            .document
            .compare_and_swap(document.id.as_bytes(), None as Option<&[u8]>, Some(bytes))
            .native(KIND)?;
        if previous.is_err() {
            return Err(CorpusError::DuplicateDocument(document.id.clone()));
        }
        Ok(EntityId::new(&document.id))
    }

    fn store_paragraph(&self, paragraph: &Paragraph, previous: Option<&EntityId>) -> Result<EntityId> {
        let document = paragraph.document.as_str();
        self.require_document(document)?;
        let previous = match previous {
            Some(id) => {
                let (id, _) = Self::contained_row::<ParagraphRow>(
                    &self.paragraph,
                    "paragraph",
                    id,
                    &paragraph.document,
                )?;
                Some(id)
            }
            None => None,
        };
        let row = ParagraphRow {
            begin: paragraph.begin,
            end: paragraph.end,
            previous,
        };
        Ok(EntityId::from(self.put_row(&self.paragraph, document, &row)?))
    }

    fn store_sentence(&self, sentence: &Sentence, previous: Option<&EntityId>) -> Result<EntityId> {
        let document = sentence.document.as_str();
        self.require_document(document)?;
        let (paragraph, _) = Self::contained_row::<ParagraphRow>(
            &self.paragraph,
            "paragraph",
            &sentence.paragraph,
            &sentence.document,
        )?;
        let previous = match previous {
            Some(id) => {
                let (previous, row) = Self::contained_row::<SentenceRow>(
                    &self.sentence,
                    "sentence",
                    id,
                    &sentence.document,
                )?;
                if row.paragraph != paragraph {
                    return Err(outside("sentence", id, &sentence.document));
                }
                Some(previous)
            }
            None => None,
        };
        let row = SentenceRow {
            paragraph,
            begin: sentence.begin,
            end: sentence.end,
            previous,
        };
        Ok(EntityId::from(self.put_row(&self.sentence, document, &row)?))
    }

    fn store_token(&self, token: &Token, previous: Option<&EntityId>) -> Result<EntityId> {
        let document = token.document.as_str();
        self.require_document(document)?;
        let (paragraph, _) = Self::contained_row::<ParagraphRow>(
            &self.paragraph,
            "paragraph",
            &token.paragraph,
            &token.document,
        )?;
        let (sentence, sentence_row) = Self::contained_row::<SentenceRow>(
            &self.sentence,
            "sentence",
            &token.sentence,
            &token.document,
        )?;
        if sentence_row.paragraph != paragraph {
            return Err(outside("sentence", &token.sentence, &token.document));
        }
        let previous = match previous {
            Some(id) => {
                let (previous, row) =
                    Self::contained_row::<TokenRow>(&self.token, "token", id, &token.document)?;
                if row.sentence != sentence {
                    return Err(outside("token", id, &token.document));
                }
                Some(previous)
            }
            None => None,
        };
        let row = TokenRow {
            paragraph,
            sentence,
            begin: token.begin,
            end: token.end,
            value: token.value.clone(),
            lemma: token.lemma.clone(),
            pos: token.pos.clone(),
            previous,
        };
        let id = self.put_row(&self.token, document, &row)?;

        let mut token_lemma = partition(&token.lemma);
        token_lemma.extend_from_slice(&id.to_be_bytes());
        self.token_lemma
            .insert(token_lemma, document.as_bytes())
            .native(KIND)?;

        for (family, key) in [
            (&self.lemma, token.lemma.as_bytes().to_vec()),
            (&self.pos, token.pos.as_bytes().to_vec()),
            (&self.token_value, token.value.as_bytes().to_vec()),
            (&self.document_lemma, cell(document, &token.lemma)),
            (&self.lemma_document, cell(&token.lemma, document)),
            (&self.document_token_value, cell(document, &token.value)),
            (&self.document_pos, cell(document, &token.pos)),
        ] {
            kv::increment(family, key, 1).native(KIND)?;
        }
        Ok(EntityId::from(id))
    }

    fn document_exists(&self, id: &str) -> Result<bool> {
        self.document.contains_key(id).native(KIND)
    }

    fn document_ids(&self) -> Result<Vec<String>> {
        self.document
            .iter()
            .keys()
            .map(|key| Ok(String::from_utf8_lossy(&key.native(KIND)?).into_owned()))
            .collect()
    }

    fn lemmata_for_document(&self, id: &str) -> Result<Vec<String>> {
        self.require_document(id)?;
        Ok(Self::partition_counters(&self.document_lemma, id)?
            .into_iter()
            .map(|(lemma, _)| lemma)
            .collect())
    }

    fn count_of_type(&self, element: ElementType) -> Result<u64> {
        let family = match element {
            ElementType::Document => &self.document,
            ElementType::Paragraph => &self.paragraph,
            ElementType::Sentence => &self.sentence,
            ElementType::Token => &self.token,
            ElementType::Lemma => &self.lemma,
            ElementType::Pos => &self.pos,
        };
        Ok(Self::family_size(family))
    }

    fn count_of_type_in_document(&self, document: &str, element: ElementType) -> Result<u64> {
        self.require_document(document)?;
        let family = match element {
            ElementType::Document => return Ok(1),
            ElementType::Paragraph => &self.paragraph,
            ElementType::Sentence => &self.sentence,
            ElementType::Token => &self.token,
            ElementType::Lemma => &self.document_lemma,
            ElementType::Pos => &self.document_pos,
        };
        Self::partition_size(family, document)
    }

    fn count_of_type_with_value(&self, element: ElementType, value: &str) -> Result<u64> {
        let family = match element {
            ElementType::Token => &self.token_value,
            ElementType::Lemma => return Self::partition_size(&self.token_lemma, value),
            ElementType::Pos => &self.pos,
            _ => return Err(CorpusError::TypeHasNoValue(element)),
        };
        Self::counter(family, value.as_bytes())
    }

    fn count_of_type_with_value_in_document(
        &self,
        document: &str,
        element: ElementType,
        value: &str,
    ) -> Result<u64> {
        self.require_document(document)?;
        let family = match element {
            ElementType::Token => &self.document_token_value,
            ElementType::Lemma => &self.document_lemma,
            ElementType::Pos => &self.document_pos,
            _ => return Err(CorpusError::TypeHasNoValue(element)),
        };
        Self::counter(family, &cell(document, value))
    }

    fn count_documents_containing_lemma(&self, lemma: &str) -> Result<u64> {
        Self::partition_size(&self.lemma_document, lemma)
    }

    fn occurrence_count_per_lemma(&self) -> Result<BTreeMap<String, u64>> {
        self.lemma
            .iter()
            .map(|entry| {
                let (key, value) = entry.native(KIND)?;
                Ok((String::from_utf8_lossy(&key).into_owned(), kv::decode_u64(&value)))
            })
            .collect()
    }

    fn raw_term_frequencies(&self, document: &str) -> Result<BTreeMap<String, u64>> {
        self.require_document(document)?;
        Ok(Self::partition_counters(&self.document_lemma, document)?
            .into_iter()
            .collect())
    }

    fn ngrams(&self, document: &str, n: usize) -> Result<Vec<Vec<String>>> {
        self.require_document(document)?;
        let n = n.max(1);
        let tokens = self.tokens_in(document)?;
        let next: HashMap<u64, usize> = tokens
            .iter()
            .enumerate()
            .filter_map(|(index, (_, row))| row.previous.map(|previous| (previous, index)))
            .collect();

        let mut windows = Vec::new();
        for start in 0..tokens.len() {
            let mut window = Vec::with_capacity(n);
            let mut cursor = Some(start);
            while let Some(index) = cursor {
                let (id, row) = &tokens[index];
                window.push(row.value.clone());
                if window.len() == n {
                    break;
                }
                cursor = next.get(id).copied();
            }
            if window.len() == n {
                windows.push(window);
            }
        }
        Ok(windows)
    }

    fn clear(&self) -> Result<()> {
        kv::clear_trees(&self.families()).native(KIND)?;
        tracing::info!(backend = %KIND, "cleared column families");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use textbench_core::{AnnotatedDocument, TtrCounts};

    fn adapter() -> WideColumnAdapter {
        WideColumnAdapter::open(None).unwrap()
    }

    fn sample(id: &str) -> AnnotatedDocument {
        AnnotatedDocument::builder(id)
            .sentence()
            .token("Dogs", "dog", "NOUN")
            .token("bark", "bark", "VERB")
            .token("dogs", "dog", "NOUN")
            .sentence()
            .token("Run", "run", "VERB")
            .build()
    }

    #[test]
    fn test_mapping_tables_written_at_store_time() {
        let wide = adapter();
        wide.store_annotated_document(&sample("d1")).unwrap();
        wide.store_annotated_document(&sample("d2")).unwrap();

        assert_eq!(wide.count_documents_containing_lemma("dog").unwrap(), 2);
        assert_eq!(wide.count_of_type_with_value(ElementType::Lemma, "dog").unwrap(), 4);
        assert_eq!(wide.count_of_type(ElementType::Lemma).unwrap(), 3);
        assert_eq!(
            wide.count_of_type_with_value_in_document("d1", ElementType::Pos, "VERB")
                .unwrap(),
            2
        );
        assert_eq!(
            wide.ttr_counts("d1").unwrap(),
            TtrCounts {
                lemmata: 3,
                tokens: 4
            }
        );
        assert_eq!(wide.occurrence_count_per_lemma().unwrap()["run"], 2);
    }

    #[test]
    fn test_partitions_do_not_bleed_between_prefix_ids() {
        let wide = adapter();
        wide.store_annotated_document(&sample("d1")).unwrap();
        wide.store_annotated_document(&AnnotatedDocument::builder("d10").words("x").build())
            .unwrap();
        assert_eq!(wide.count_of_type_in_document("d1", ElementType::Token).unwrap(), 4);
        assert_eq!(wide.lemmata_for_document("d10").unwrap(), vec!["x"]);
    }

    #[test]
    fn test_ngrams_follow_previous_links() {
        let wide = adapter();
        wide.store_annotated_document(&sample("d1")).unwrap();
        assert_eq!(
            wide.ngrams("d1", 2).unwrap(),
            vec![
                vec!["Dogs".to_string(), "bark".to_string()],
                vec!["bark".to_string(), "dogs".to_string()],
            ]
        );
        assert_eq!(wide.ngrams("d1", 3).unwrap().len(), 1);
    }

    #[test]
    fn test_lemma_occurrences_come_from_token_lemma() {
        let wide = adapter();
        wide.store_annotated_document(&sample("d1")).unwrap();
        wide.lemma.clear().unwrap();
        assert_eq!(wide.count_of_type_with_value(ElementType::Lemma, "dog").unwrap(), 2);
        assert_eq!(wide.count_of_type_with_value(ElementType::Lemma, "cat").unwrap(), 0);
        assert_eq!(wide.token_lemma.len(), 4);
    }

    #[test]
    fn test_partitions_with_nul_bytes_stay_apart() {
        let wide = adapter();
        wide.store_annotated_document(&AnnotatedDocument::builder("a").words("x").build())
            .unwrap();
        wide.store_annotated_document(&AnnotatedDocument::builder("a\0b").words("y z").build())
            .unwrap();
        assert_eq!(wide.count_of_type_in_document("a", ElementType::Token).unwrap(), 1);
        assert_eq!(wide.lemmata_for_document("a").unwrap(), vec!["x"]);
        assert_eq!(wide.raw_term_frequencies("a").unwrap().len(), 1);
        assert_eq!(wide.ngrams("a\0b", 2).unwrap().len(), 1);
    }

    #[test]
    fn test_sentence_previous_must_share_paragraph() {
        let wide = adapter();
        wide.store_document(&Document::new("d1", "", "en")).unwrap();
        let paragraph = Paragraph {
            document: EntityId::new("d1"),
            begin: 0,
            end: 0,
        };
        let first = wide.store_paragraph(&paragraph, None).unwrap();
        let second = wide.store_paragraph(&paragraph, Some(&first)).unwrap();
        let sentence = |paragraph: &EntityId| Sentence {
            document: EntityId::new("d1"),
            paragraph: paragraph.clone(),
            begin: 0,
            end: 0,
        };
        let in_first = wide.store_sentence(&sentence(&first), None).unwrap();
        let err = wide
            .store_sentence(&sentence(&second), Some(&in_first))
            .unwrap_err();
        assert!(matches!(err, CorpusError::InvalidDocument { .. }));
        assert_eq!(wide.count_of_type(ElementType::Sentence).unwrap(), 1);
    }

    #[test]
    fn test_duplicate_and_clear() {
        let wide = adapter();
        wide.store_document(&Document::new("d1", "", "en")).unwrap();
        assert!(matches!(
            wide.store_document(&Document::new("d1", "", "en")),
            Err(CorpusError::DuplicateDocument(_))
        ));
        wide.clear().unwrap();
        assert!(wide.document_ids().unwrap().is_empty());
        assert!(!wide.document_exists("d1").unwrap());
    }
}

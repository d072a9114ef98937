//! Top-down ingestion of annotated documents.
//!
//! Siblings are linked through the id generated for the previous sibling.
//! The link is an accumulator threaded through a fold, so every level of
//! the tree is built by the same small function.

use crate::backend::CorpusBackend;
use crate::error::Result;
use crate::model::{
    AnnotatedDocument, AnnotatedParagraph, AnnotatedSentence, EntityId, Paragraph, Sentence,
    Token,
};

/// Store `items` in order, passing each the id generated for its
/// predecessor. Returns the id of the last stored item.
pub fn fold_siblings<T, F>(items: &[T], mut store: F) -> Result<Option<EntityId>>
where
    F: FnMut(&T, Option<&EntityId>) -> Result<EntityId>,
{
    items.iter().try_fold(None, |previous: Option<EntityId>, item| {
        store(item, previous.as_ref()).map(Some)
    })
}

/// Store a whole annotated document through the per-entity primitives.
pub fn store_top_down<B>(backend: &B, document: &AnnotatedDocument) -> Result<EntityId>
where
    B: CorpusBackend + ?Sized,
{
    document.validate()?;
    let document_id = backend.store_document(&document.document())?;

    fold_siblings(&document.paragraphs, |paragraph, previous| {
        store_paragraph(backend, &document_id, paragraph, previous)
    })?;

    tracing::debug!(
        backend = %backend.kind(),
        document = %document_id,
        tokens = document.token_count(),
        "stored document"
    );
    Ok(document_id)
}

fn store_paragraph<B>(
    backend: &B,
    document_id: &EntityId,
    paragraph: &AnnotatedParagraph,
    previous: Option<&EntityId>,
) -> Result<EntityId>
where
    B: CorpusBackend + ?Sized,
{
    let paragraph_id = backend.store_paragraph(
        &Paragraph {
            document: document_id.clone(),
            begin: paragraph.begin,
            end: paragraph.end,
        },
        previous,
    )?;

    fold_siblings(&paragraph.sentences, |sentence, previous| {
        store_sentence(backend, document_id, &paragraph_id, sentence, previous)
    })?;

    Ok(paragraph_id)
}

fn store_sentence<B>(
    backend: &B,
    document_id: &EntityId,
    paragraph_id: &EntityId,
    sentence: &AnnotatedSentence,
    previous: Option<&EntityId>,
) -> Result<EntityId>
where
    B: CorpusBackend + ?Sized,
{
    let sentence_id = backend.store_sentence(
        &Sentence {
            document: document_id.clone(),
            paragraph: paragraph_id.clone(),
            begin: sentence.begin,
            end: sentence.end,
        },
        previous,
    )?;

    fold_siblings(&sentence.tokens, |token, previous| {
        backend.store_token(
            &Token {
                document: document_id.clone(),
                paragraph: paragraph_id.clone(),
                sentence: sentence_id.clone(),
                begin: token.begin,
                end: token.end,
                value: token.value.clone(),
                lemma: token.lemma.clone(),
                pos: token.pos.clone(),
            },
            previous,
        )
    })?;

    Ok(sentence_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CorpusError;

    #[test]
    fn test_fold_siblings_threads_previous_id() {
        let mut seen = Vec::new();
        let last = fold_siblings(&["a", "b", "c"], |item, previous| {
            seen.push((item.to_string(), previous.cloned()));
            Ok(EntityId::new(format!("id-{item}")))
        })
        .unwrap();

        assert_eq!(last, Some(EntityId::new("id-c")));
        assert_eq!(
            seen,
            vec![
                ("a".to_string(), None),
                ("b".to_string(), Some(EntityId::new("id-a"))),
                ("c".to_string(), Some(EntityId::new("id-b"))),
            ]
        );
    }

    #[test]
    fn test_fold_siblings_empty() {
        let items: [u8; 0] = [];
        let last = fold_siblings(&items, |_, _| Ok(EntityId::new("never"))).unwrap();
        assert_eq!(last, None);
    }

    #[test]
    fn test_fold_siblings_stops_on_error() {
        let mut calls = 0;
        let result = fold_siblings(&[1, 2, 3], |item, _| {
            calls += 1;
            if *item == 2 {
                Err(CorpusError::DocumentNotFound("x".into()))
            } else {
                Ok(EntityId::from(*item as u64))
            }
        });
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }
}

//! Corpus document model.
//!
//! Every backend persists the same entity tree: a [`Document`] contains
//! paragraphs, paragraphs contain sentences, sentences contain tokens, and
//! each token points at one lemma and one part-of-speech value. Lemma
//! entities are shared by value across the whole corpus.
//!
//! Annotated input arrives as an [`AnnotatedDocument`] tree produced by an
//! upstream NLP pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CorpusError, Result};

/// Identifier of a stored entity.
///
/// Documents use their caller-supplied external id; every other entity
/// uses the id generated by the backend that stored it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create an id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the id as a numeric key (backends with generated integer ids).
    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// Entity types of the document model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementType {
    Document,
    Paragraph,
    Sentence,
    Token,
    Lemma,
    Pos,
}

impl ElementType {
    /// All element types, in containment order.
    pub const ALL: [ElementType; 6] = [
        ElementType::Document,
        ElementType::Paragraph,
        ElementType::Sentence,
        ElementType::Token,
        ElementType::Lemma,
        ElementType::Pos,
    ];

    /// Element types that carry a lookup value.
    pub const WITH_VALUE: [ElementType; 3] =
        [ElementType::Token, ElementType::Lemma, ElementType::Pos];

    /// Stable name of the type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "Document",
            Self::Paragraph => "Paragraph",
            Self::Sentence => "Sentence",
            Self::Token => "Token",
            Self::Lemma => "Lemma",
            Self::Pos => "Pos",
        }
    }

    /// Whether value-based counting is meaningful for this type.
    ///
    /// Tokens carry their surface text, lemmata and POS values carry the
    /// value itself. Structural containers carry nothing to look up.
    pub fn has_value(self) -> bool {
        matches!(self, Self::Token | Self::Lemma | Self::Pos)
    }

    /// Whether entities of this type are shared by value.
    pub fn is_value_node(self) -> bool {
        matches!(self, Self::Lemma | Self::Pos)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ElementType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown element type: {s}"))
    }
}

/// Storage categories compared by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Property graph (nodes + typed edges).
    Graph,
    /// Relational tables with foreign keys.
    Relational,
    /// Denormalized column families with mapping tables.
    WideColumn,
    /// One serialized XML unit per document.
    Xml,
    /// Flat indexed documents with postings.
    FullText,
}

impl BackendKind {
    /// All backend kinds.
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Graph,
        BackendKind::Relational,
        BackendKind::WideColumn,
        BackendKind::Xml,
        BackendKind::FullText,
    ];

    /// Stable identifier used in reports and file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Graph => "graph",
            Self::Relational => "relational",
            Self::WideColumn => "wide-column",
            Self::Xml => "xml",
            Self::FullText => "full-text",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        BackendKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| format!("unknown backend: {s}"))
    }
}

/// Document header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub language: String,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            language: language.into(),
        }
    }
}

/// Paragraph record as handed to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    pub document: EntityId,
    pub begin: u32,
    pub end: u32,
}

/// Sentence record as handed to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    pub document: EntityId,
    pub paragraph: EntityId,
    pub begin: u32,
    pub end: u32,
}

/// Token record as handed to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub document: EntityId,
    pub paragraph: EntityId,
    pub sentence: EntityId,
    pub begin: u32,
    pub end: u32,
    pub value: String,
    pub lemma: String,
    pub pos: String,
}

/// Annotated document produced by the NLP pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedDocument {
    pub id: String,
    pub text: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub paragraphs: Vec<AnnotatedParagraph>,
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedParagraph {
    pub begin: u32,
    pub end: u32,
    #[serde(default)]
    pub sentences: Vec<AnnotatedSentence>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedSentence {
    pub begin: u32,
    pub end: u32,
    #[serde(default)]
    pub tokens: Vec<TokenAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAnnotation {
    pub begin: u32,
    pub end: u32,
    pub value: String,
    pub lemma: String,
    pub pos: String,
}

impl AnnotatedDocument {
    /// Start building a document from token annotations.
    pub fn builder(id: impl Into<String>) -> DocumentBuilder {
        DocumentBuilder::new(id)
    }

    /// Document header of this annotated tree.
    pub fn document(&self) -> Document {
        Document::new(&self.id, &self.text, &self.language)
    }

    /// Iterate over every token in document order.
    pub fn tokens(&self) -> impl Iterator<Item = &TokenAnnotation> {
        self.paragraphs
            .iter()
            .flat_map(|p| p.sentences.iter())
            .flat_map(|s| s.tokens.iter())
    }

    /// Number of tokens in the document.
    pub fn token_count(&self) -> usize {
        self.tokens().count()
    }

    /// Check offsets and containment.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(CorpusError::invalid_document("", "empty document id"));
        }
        let doc_end = self.text.len() as u32;
        for (pi, paragraph) in self.paragraphs.iter().enumerate() {
            check_span(&self.id, "paragraph", pi, paragraph.begin, paragraph.end, 0, doc_end)?;
            for (si, sentence) in paragraph.sentences.iter().enumerate() {
                check_span(
                    &self.id,
                    "sentence",
                    si,
                    sentence.begin,
                    sentence.end,
                    paragraph.begin,
                    paragraph.end,
                )?;
                for (ti, token) in sentence.tokens.iter().enumerate() {
                    check_span(
                        &self.id,
                        "token",
                        ti,
                        token.begin,
                        token.end,
                        sentence.begin,
                        sentence.end,
                    )?;
                    if token.lemma.is_empty() {
                        return Err(CorpusError::invalid_document(
                            &self.id,
                            format!("token {ti} has an empty lemma"),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

fn check_span(
    id: &str,
    what: &str,
    index: usize,
    begin: u32,
    end: u32,
    outer_begin: u32,
    outer_end: u32,
) -> Result<()> {
    if begin > end {
        return Err(CorpusError::invalid_document(
            id,
            format!("{what} {index} begins after it ends ({begin} > {end})"),
        ));
    }
    if begin < outer_begin || end > outer_end {
        return Err(CorpusError::invalid_document(
            id,
            format!("{what} {index} [{begin}, {end}) escapes its container [{outer_begin}, {outer_end})"),
        ));
    }
    Ok(())
}

/// Builds an [`AnnotatedDocument`] from token annotations, computing text
/// and offsets as it goes.
///
/// Tokens are separated by single spaces, sentences too, and paragraphs by
/// a blank line.
#[derive(Debug)]
pub struct DocumentBuilder {
    id: String,
    language: String,
    text: String,
    paragraphs: Vec<AnnotatedParagraph>,
}

impl DocumentBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            language: default_language(),
            text: String::new(),
            paragraphs: Vec::new(),
        }
    }

    /// Set the language code.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Start a new paragraph.
    pub fn paragraph(mut self) -> Self {
        if !self.paragraphs.is_empty() {
            self.text.push_str("\n\n");
        }
        let begin = self.offset();
        self.paragraphs.push(AnnotatedParagraph {
            begin,
            end: begin,
            sentences: Vec::new(),
        });
        self
    }

    /// Start a new sentence in the current paragraph.
    pub fn sentence(mut self) -> Self {
        if self.paragraphs.is_empty() {
            self = self.paragraph();
        }
        let has_sentences = self
            .paragraphs
            .last()
            .is_some_and(|p| !p.sentences.is_empty());
        if has_sentences {
            self.text.push(' ');
        }
        let begin = self.offset();
        if let Some(paragraph) = self.paragraphs.last_mut() {
            paragraph.sentences.push(AnnotatedSentence {
                begin,
                end: begin,
                tokens: Vec::new(),
            });
            paragraph.end = begin;
        }
        self
    }

    /// Append a token to the current sentence.
    pub fn token(mut self, value: &str, lemma: &str, pos: &str) -> Self {
        let needs_sentence = self
            .paragraphs
            .last()
            .map_or(true, |p| p.sentences.is_empty());
        if needs_sentence {
            self = self.sentence();
        }
        let has_tokens = self
            .paragraphs
            .last()
            .and_then(|p| p.sentences.last())
            .is_some_and(|s| !s.tokens.is_empty());
        if has_tokens {
            self.text.push(' ');
        }
        let begin = self.offset();
        self.text.push_str(value);
        let end = self.offset();
        if let Some(paragraph) = self.paragraphs.last_mut() {
            paragraph.end = end;
            if let Some(sentence) = paragraph.sentences.last_mut() {
                sentence.end = end;
                sentence.tokens.push(TokenAnnotation {
                    begin,
                    end,
                    value: value.to_string(),
                    lemma: lemma.to_string(),
                    pos: pos.to_string(),
                });
            }
        }
        self
    }

    /// Append tokens whose lemma is the lowercased surface form.
    pub fn words(mut self, text: &str) -> Self {
        for word in text.split_whitespace() {
            let lemma = word.to_lowercase();
            self = self.token(word, &lemma, "X");
        }
        self
    }

    pub fn build(self) -> AnnotatedDocument {
        AnnotatedDocument {
            id: self.id,
            text: self.text,
            language: self.language,
            paragraphs: self.paragraphs,
        }
    }

    fn offset(&self) -> u32 {
        self.text.len() as u32
    }
}

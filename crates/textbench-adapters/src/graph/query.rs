//! Pattern queries over the corpus graph.
//!
//! A [`MatchQuery`] describes a linear path pattern: a start node, a chain
//! of typed hops and an aggregate. Labels, relationship types and property
//! names come from enums and static strings; every caller-supplied value is
//! a named parameter. [`MatchQuery::to_cypher`] renders the pattern as
//! Cypher text for logs and shape tests; [`super::store::GraphStore`]
//! executes it.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use textbench_core::ElementType;

/// Node labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    Document,
    Paragraph,
    Sentence,
    Token,
    Lemma,
    Pos,
}

impl Label {
    pub const ALL: [Label; 6] = [
        Label::Document,
        Label::Paragraph,
        Label::Sentence,
        Label::Token,
        Label::Lemma,
        Label::Pos,
    ];

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

    /// One-byte tag used in index keys.
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Document => 1,
            Self::Paragraph => 2,
            Self::Sentence => 3,
            Self::Token => 4,
            Self::Lemma => 5,
            Self::Pos => 6,
        }
    }

    /// Property merged on and indexed for lookups.
    pub fn key_property(self) -> Option<&'static str> {
        match self {
            Self::Document => Some("id"),
            Self::Token | Self::Lemma | Self::Pos => Some("value"),
            Self::Paragraph | Self::Sentence => None,
        }
    }
}

impl From<ElementType> for Label {
    fn from(element: ElementType) -> Self {
        match element {
            ElementType::Document => Self::Document,
            ElementType::Paragraph => Self::Paragraph,
            ElementType::Sentence => Self::Sentence,
            ElementType::Token => Self::Token,
            ElementType::Lemma => Self::Lemma,
            ElementType::Pos => Self::Pos,
        }
    }
}

/// Relationship types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rel {
    InDocument,
    InParagraph,
    InSentence,
    HasLemma,
    HasPos,
    Next,
}

impl Rel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InDocument => "IN_DOCUMENT",
            Self::InParagraph => "IN_PARAGRAPH",
            Self::InSentence => "IN_SENTENCE",
            Self::HasLemma => "HAS_LEMMA",
            Self::HasPos => "HAS_POS",
            Self::Next => "NEXT",
        }
    }

    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::InDocument => 1,
            Self::InParagraph => 2,
            Self::InSentence => 3,
            Self::HasLemma => 4,
            Self::HasPos => 5,
            Self::Next => 6,
        }
    }
}

/// Direction of a hop relative to the previous node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// A node in the pattern, optionally constrained by one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePattern {
    pub label: Label,
    pub property: Option<PropertyParam>,
}

/// `property: $param` with the parameter's bound value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyParam {
    pub property: &'static str,
    pub param: &'static str,
    pub value: String,
}

impl NodePattern {
    pub fn new(label: Label) -> Self {
        Self {
            label,
            property: None,
        }
    }

    /// Constrain the node's key property to a parameter.
    pub fn with(mut self, property: &'static str, param: &'static str, value: &str) -> Self {
        self.property = Some(PropertyParam {
            property,
            param,
            value: value.to_string(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub rel: Rel,
    pub direction: Direction,
    pub node: NodePattern,
}

/// Aggregate returned by a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Return {
    /// Number of matched paths.
    Count,
    /// Number of distinct nodes at a path position.
    CountDistinct(usize),
    /// One row per path with the given node properties.
    Columns(Vec<(usize, &'static str)>),
    /// Rows `[key, paths, distinct nodes at position]` grouped by key.
    GroupBy {
        key: (usize, &'static str),
        distinct: usize,
    },
}

/// Linear path pattern query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchQuery {
    pub start: NodePattern,
    pub hops: Vec<Hop>,
    pub ret: Return,
}

impl MatchQuery {
    /// `MATCH (n0:label)`
    pub fn node(start: NodePattern) -> Self {
        Self {
            start,
            hops: Vec::new(),
            ret: Return::Count,
        }
    }

    /// `-[:rel]->(node)`
    pub fn out(mut self, rel: Rel, node: NodePattern) -> Self {
        self.hops.push(Hop {
            rel,
            direction: Direction::Outgoing,
            node,
        });
        self
    }

    /// `<-[:rel]-(node)`
    pub fn incoming(mut self, rel: Rel, node: NodePattern) -> Self {
        self.hops.push(Hop {
            rel,
            direction: Direction::Incoming,
            node,
        });
        self
    }

    pub fn returning(mut self, ret: Return) -> Self {
        self.ret = ret;
        self
    }

    /// Node pattern at a path position.
    pub fn pattern_at(&self, position: usize) -> Option<&NodePattern> {
        if position == 0 {
            Some(&self.start)
        } else {
            self.hops.get(position - 1).map(|hop| &hop.node)
        }
    }

    /// Bound parameters, in pattern order.
    pub fn params(&self) -> Vec<(&'static str, &str)> {
        std::iter::once(&self.start)
            .chain(self.hops.iter().map(|hop| &hop.node))
            .filter_map(|node| node.property.as_ref())
            .map(|p| (p.param, p.value.as_str()))
            .collect()
    }

    /// Render the pattern as parameterized Cypher text.
    pub fn to_cypher(&self) -> String {
        let mut out = String::from("MATCH ");
        write_node(&mut out, 0, &self.start);
        for (i, hop) in self.hops.iter().enumerate() {
            match hop.direction {
                Direction::Outgoing => {
                    let _ = write!(out, "-[:{}]->", hop.rel.as_str());
                }
                Direction::Incoming => {
                    let _ = write!(out, "<-[:{}]-", hop.rel.as_str());
                }
            }
            write_node(&mut out, i + 1, &hop.node);
        }
        out.push_str(" RETURN ");
        match &self.ret {
            Return::Count => out.push_str("count(*)"),
            Return::CountDistinct(pos) => {
                let _ = write!(out, "count(DISTINCT n{pos})");
            }
            Return::Columns(columns) => {
                let rendered: Vec<String> = columns
                    .iter()
                    .map(|(pos, prop)| format!("n{pos}.{prop}"))
                    .collect();
                out.push_str(&rendered.join(", "));
                out.push_str(" ORDER BY id(n0)");
            }
            Return::GroupBy { key, distinct } => {
                let _ = write!(
                    out,
                    "n{}.{}, count(*), count(DISTINCT n{})",
                    key.0, key.1, distinct
                );
            }
        }
        out
    }
}

fn write_node(out: &mut String, position: usize, node: &NodePattern) {
    let _ = write!(out, "(n{position}:{}", node.label.as_str());
    if let Some(p) = &node.property {
        let _ = write!(out, " {{{}: ${}}}", p.property, p.param);
    }
    out.push(')');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_count_distinct_lemmata() {
        let query = MatchQuery::node(NodePattern::new(Label::Document).with("id", "document", "d1"))
            .incoming(Rel::InDocument, NodePattern::new(Label::Token))
            .out(Rel::HasLemma, NodePattern::new(Label::Lemma))
            .returning(Return::CountDistinct(2));

        assert_eq!(
            query.to_cypher(),
            "MATCH (n0:Document {id: $document})<-[:IN_DOCUMENT]-(n1:Token)\
             -[:HAS_LEMMA]->(n2:Lemma) RETURN count(DISTINCT n2)"
        );
        assert_eq!(query.params(), vec![("document", "d1")]);
    }

    #[test]
    fn test_values_never_rendered_inline() {
        let hostile = "x'}) DETACH DELETE n //";
        let query = MatchQuery::node(NodePattern::new(Label::Lemma).with("value", "lemma", hostile));
        let cypher = query.to_cypher();
        assert!(!cypher.contains(hostile));
        assert_eq!(cypher, "MATCH (n0:Lemma {value: $lemma}) RETURN count(*)");
        assert_eq!(query.params(), vec![("lemma", hostile)]);
    }

    #[test]
    fn test_render_ngram_columns() {
        let query = MatchQuery::node(NodePattern::new(Label::Token))
            .out(Rel::Next, NodePattern::new(Label::Token))
            .returning(Return::Columns(vec![(0, "value"), (1, "value")]));
        assert_eq!(
            query.to_cypher(),
            "MATCH (n0:Token)-[:NEXT]->(n1:Token) RETURN n0.value, n1.value ORDER BY id(n0)"
        );
    }

    #[test]
    fn test_pattern_at() {
        let query = MatchQuery::node(NodePattern::new(Label::Document))
            .incoming(Rel::InDocument, NodePattern::new(Label::Token));
        assert_eq!(query.pattern_at(0).unwrap().label, Label::Document);
        assert_eq!(query.pattern_at(1).unwrap().label, Label::Token);
        assert!(query.pattern_at(2).is_none());
    }
}

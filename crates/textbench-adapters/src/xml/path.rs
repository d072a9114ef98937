//! Path queries over stored XML documents.
//!
//! A [`PathQuery`] is a chain of child/descendant steps with optional
//! equality predicates, closed by an aggregate. It renders as XPath text
//! with named parameters and evaluates directly over a parsed
//! [`roxmltree::Document`].

use std::collections::BTreeSet;
use std::fmt::Write as _;

use roxmltree::Node;

/// Element names of the stored layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Document,
    Paragraph,
    Sentence,
    Token,
}

impl Element {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Paragraph => "paragraph",
            Self::Sentence => "sentence",
            Self::Token => "token",
        }
    }
}

/// A value read from a selected node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Attribute(&'static str),
    Text,
}

impl Field {
    fn read<'a>(self, node: &Node<'a, '_>) -> Option<&'a str> {
        match self {
            Self::Attribute(name) => node.attribute(name),
            Self::Text => Some(node.text().unwrap_or("")),
        }
    }

    fn render(self) -> String {
        match self {
            Self::Attribute(name) => format!("@{name}"),
            Self::Text => ".".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Predicate {
    field: Field,
    param: &'static str,
    value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    element: Element,
    predicates: Vec<Predicate>,
}

/// What a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// `count(path)`
    Count,
    /// `count(distinct-values(path/field))`
    DistinctCount(Field),
    /// `path/field`, one value per node in document order.
    Values(Field),
    /// Each selected node with its next `n - 1` same-named siblings.
    Windows(usize, Field),
}

/// Result of evaluating a [`PathQuery`] over one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathValue {
    Count(u64),
    Distinct(BTreeSet<String>),
    Values(Vec<String>),
    Windows(Vec<Vec<String>>),
}

impl PathValue {
    pub fn count(&self) -> u64 {
        match self {
            Self::Count(n) => *n,
            Self::Distinct(set) => set.len() as u64,
            Self::Values(values) => values.len() as u64,
            Self::Windows(windows) => windows.len() as u64,
        }
    }
}

/// Linear XPath-style query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery {
    steps: Vec<Step>,
    aggregate: Aggregate,
}

impl PathQuery {
    /// `/document`
    pub fn collection() -> Self {
        Self {
            steps: vec![Step {
                axis: Axis::Child,
                element: Element::Document,
                predicates: Vec::new(),
            }],
            aggregate: Aggregate::Count,
        }
    }

    /// `/document[@id = $document]`
    pub fn document(id: &str) -> Self {
        Self::collection().filter(Field::Attribute("id"), "document", id)
    }

    /// `.../element`
    pub fn child(mut self, element: Element) -> Self {
        self.steps.push(Step {
            axis: Axis::Child,
            element,
            predicates: Vec::new(),
        });
        self
    }

    /// `...//element`
    pub fn descendant(mut self, element: Element) -> Self {
        self.steps.push(Step {
            axis: Axis::Descendant,
            element,
            predicates: Vec::new(),
        });
        self
    }

    /// Add `[field = $param]` to the last step.
    pub fn filter(mut self, field: Field, param: &'static str, value: &str) -> Self {
        if let Some(step) = self.steps.last_mut() {
            step.predicates.push(Predicate {
                field,
                param,
                value: value.to_string(),
            });
        }
        self
    }

    pub fn returning(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = aggregate;
        self
    }

    /// Bound parameters, in query order.
    pub fn params(&self) -> Vec<(&'static str, &str)> {
        self.steps
            .iter()
            .flat_map(|step| step.predicates.iter())
            .map(|p| (p.param, p.value.as_str()))
            .collect()
    }

    fn render_path(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            out.push_str(match step.axis {
                Axis::Child => "/",
                Axis::Descendant => "//",
            });
            out.push_str(step.element.as_str());
            for p in &step.predicates {
                let _ = write!(out, "[{} = ${}]", p.field.render(), p.param);
            }
        }
        out
    }

    /// Render as XPath text.
    pub fn to_xpath(&self) -> String {
        let path = self.render_path();
        match self.aggregate {
            Aggregate::Count => format!("count({path})"),
            Aggregate::DistinctCount(field) => {
                format!("count(distinct-values({path}/{}))", field.render())
            }
            Aggregate::Values(field) => format!("{path}/{}", field.render()),
            Aggregate::Windows(n, field) => {
                let last = self
                    .steps
                    .last()
                    .map_or("node()", |step| step.element.as_str());
                format!(
                    "{path}/({0}, following-sibling::{last}[position() < {n}]/{0})",
                    field.render()
                )
            }
        }
    }

    /// Nodes selected by the steps, in document order.
    pub fn select<'a, 'input>(&self, document: &'a roxmltree::Document<'input>) -> Vec<Node<'a, 'input>> {
        let mut current = vec![document.root()];
        for step in &self.steps {
            let mut next = Vec::new();
            for node in &current {
                let candidates: Vec<Node<'a, 'input>> = match step.axis {
                    Axis::Child => node.children().collect(),
                    Axis::Descendant => node.descendants().skip(1).collect(),
                };
                next.extend(candidates.into_iter().filter(|n| step.matches(n)));
            }
            current = next;
        }
        current
    }

    /// Evaluate over one parsed document.
    pub fn evaluate(&self, document: &roxmltree::Document<'_>) -> PathValue {
        let nodes = self.select(document);
        match self.aggregate {
            Aggregate::Count => PathValue::Count(nodes.len() as u64),
            Aggregate::DistinctCount(field) => PathValue::Distinct(
                nodes
                    .iter()
                    .filter_map(|n| field.read(n))
                    .map(str::to_string)
                    .collect(),
            ),
            Aggregate::Values(field) => PathValue::Values(
                nodes
                    .iter()
                    .filter_map(|n| field.read(n))
                    .map(str::to_string)
                    .collect(),
            ),
            Aggregate::Windows(n, field) => {
                let n = n.max(1);
                let windows = nodes
                    .iter()
                    .filter_map(|start| {
                        let window: Vec<String> = std::iter::once(*start)
                            .chain(
                                start
                                    .next_siblings()
                                    .skip(1)
                                    .filter(|s| s.is_element() && s.tag_name() == start.tag_name()),
                            )
                            .take(n)
                            .filter_map(|node| field.read(&node).map(str::to_string))
                            .collect();
                        (window.len() == n).then_some(window)
                    })
                    .collect();
                PathValue::Windows(windows)
            }
        }
    }
}

impl Step {
    fn matches(&self, node: &Node<'_, '_>) -> bool {
        node.is_element()
            && node.has_tag_name(self.element.as_str())
            && self
                .predicates
                .iter()
                .all(|p| p.field.read(node) == Some(p.value.as_str()))
    }
}

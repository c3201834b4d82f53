// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

/// IRI of the type predicate.
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum LiteralTag {
    Plain,
    Lang(String),
    Datatype(String),
}

#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Node {
    Iri(String),
    Blank(String),
    Literal { lexical: String, tag: LiteralTag },
}

impl Node {
    pub fn iri(iri: impl Into<String>) -> Self {
        Node::Iri(iri.into())
    }

    pub fn blank(label: impl Into<String>) -> Self {
        Node::Blank(label.into())
    }

    pub fn literal(lexical: impl Into<String>) -> Self {
        Node::Literal {
            lexical: lexical.into(),
            tag: LiteralTag::Plain,
        }
    }

    /// IRIs and blank nodes.
    pub fn is_resource(&self) -> bool {
        !self.is_literal()
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Node::Literal { .. })
    }

    pub fn is_type(&self) -> bool {
        matches!(self, Node::Iri(iri) if iri == RDF_TYPE)
    }
}

/// Formats the node in N-Triples syntax.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Iri(iri) => write!(f, "<{iri}>"),
            Node::Blank(label) => write!(f, "_:{label}"),
            Node::Literal { lexical, tag } => {
                f.write_str("\"")?;
                for c in lexical.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\r' => f.write_str("\\r")?,
                        '\t' => f.write_str("\\t")?,
                        c => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")?;

                match tag {
                    LiteralTag::Plain => Ok(()),
                    LiteralTag::Lang(lang) => write!(f, "@{lang}"),
                    LiteralTag::Datatype(dt) => write!(f, "^^<{dt}>"),
                }
            }
        }
    }
}

#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Statement {
    pub subject: Node,
    pub predicate: Node,
    pub object: Node,
}

impl Statement {
    pub fn new(subject: Node, predicate: Node, object: Node) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// Canonical byte form, the N-Triples line without the newline.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// True if `node` is the subject, the predicate or a resource
    /// object of this statement.
    pub fn mentions(&self, node: &Node) -> bool {
        &self.subject == node
            || &self.predicate == node
            || (self.object.is_resource() && &self.object == node)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

/// Set of statements in a fixed order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset(BTreeSet<Statement>);

/// Subset of a dataset produced by the partitioner.
pub type Fragment = Dataset;

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the statement was already present.
    pub fn insert(&mut self, statement: Statement) -> bool {
        self.0.insert(statement)
    }

    pub fn contains(&self, statement: &Statement) -> bool {
        self.0.contains(statement)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Statement> + '_ {
        self.0.iter()
    }

    pub fn is_subset(&self, other: &Dataset) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn union(&self, other: &Dataset) -> Dataset {
        Dataset(self.0.union(&other.0).cloned().collect())
    }

    pub fn intersection(&self, other: &Dataset) -> Dataset {
        Dataset(self.0.intersection(&other.0).cloned().collect())
    }

    /// Every distinct subject, predicate and resource object.
    pub fn resources(&self) -> BTreeSet<&Node> {
        let mut out = BTreeSet::new();
        for st in &self.0 {
            out.insert(&st.subject);
            out.insert(&st.predicate);
            if st.object.is_resource() {
                out.insert(&st.object);
            }
        }

        out
    }

    pub fn extend<I: IntoIterator<Item = Statement>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

impl FromIterator<Statement> for Dataset {
    fn from_iter<I: IntoIterator<Item = Statement>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Statement;
    type IntoIter = std::collections::btree_set::Iter<'a, Statement>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Dataset {
    type Item = Statement;
    type IntoIter = std::collections::btree_set::IntoIter<Statement>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_escapes() {
        let node = Node::Literal {
            lexical: "say \"hi\"\n".into(),
            tag: LiteralTag::Lang("en".into()),
        };
        assert_eq!(node.to_string(), r#""say \"hi\"\n"@en"#);
    }

    #[test]
    fn statement_line() {
        let st = Statement::new(
            Node::iri("s"),
            Node::iri(RDF_TYPE),
            Node::blank("b0"),
        );
        assert_eq!(
            st.to_string(),
            format!("<s> <{RDF_TYPE}> _:b0 .")
        );
        assert!(st.predicate.is_type());
        assert!(st.mentions(&Node::blank("b0")));
        assert!(!st.mentions(&Node::iri("o")));
    }

    #[test]
    fn dataset_has_set_semantics() {
        let st = Statement::new(Node::iri("s"), Node::iri("p"), Node::literal("o"));
        let mut ds = Dataset::new();

        assert!(ds.insert(st.clone()));
        assert!(!ds.insert(st.clone()));
        assert_eq!(ds.len(), 1);

        // literal objects are not resources
        assert_eq!(ds.resources().len(), 2);
    }
}

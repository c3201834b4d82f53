// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! Line oriented N-Triples subset: IRIs, blank nodes, literals with an
//! optional language tag or datatype, one statement per line.

use std::{fs, iter::Peekable, path::Path, str::Chars};

use crate::{Dataset, GraphError, LiteralTag, Node, Statement};

/// Parse a document. Empty lines and `#` comment lines are skipped.
pub fn parse_ntriples(input: &str) -> Result<Dataset, GraphError> {
    let mut dataset = Dataset::new();

    for (idx, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let statement = parse_line(line).map_err(|reason| GraphError::Parse {
            line: idx + 1,
            reason,
        })?;
        dataset.insert(statement);
    }

    Ok(dataset)
}

/// One statement per line, in dataset order.
pub fn to_ntriples(dataset: &Dataset) -> String {
    let mut out = String::new();
    for st in dataset {
        out.push_str(&st.to_string());
        out.push('\n');
    }

    out
}

pub fn load_ntriples<P: AsRef<Path>>(path: P) -> Result<Dataset, GraphError> {
    let text = fs::read_to_string(path.as_ref())?;
    let dataset = parse_ntriples(&text)?;

    tracing::debug!(
        path = %path.as_ref().display(),
        statements = dataset.len(),
        "dataset loaded"
    );

    Ok(dataset)
}

type Cursor<'a> = Peekable<Chars<'a>>;

fn parse_line(line: &str) -> Result<Statement, String> {
    let mut cur = line.chars().peekable();

    let subject = term(&mut cur)?;
    if subject.is_literal() {
        return Err("literal in subject position".into());
    }

    let predicate = term(&mut cur)?;
    if !matches!(predicate, Node::Iri(_)) {
        return Err("predicate must be an IRI".into());
    }

    let object = term(&mut cur)?;

    skip_ws(&mut cur);
    if cur.next() != Some('.') {
        return Err("missing terminating '.'".into());
    }
    skip_ws(&mut cur);
    match cur.next() {
        None | Some('#') => Ok(Statement::new(subject, predicate, object)),
        Some(c) => Err(format!("unexpected {c:?} after '.'")),
    }
}

fn skip_ws(cur: &mut Cursor<'_>) {
    while cur.next_if(|c| c.is_whitespace()).is_some() {}
}

fn term(cur: &mut Cursor<'_>) -> Result<Node, String> {
    skip_ws(cur);

    match cur.next() {
        Some('<') => Ok(Node::Iri(iri(cur)?)),

        Some('_') => {
            if cur.next() != Some(':') {
                return Err("expected ':' after '_'".into());
            }
            let label = word(cur);
            if label.is_empty() {
                return Err("empty blank node label".into());
            }
            Ok(Node::Blank(label))
        }

        Some('"') => {
            let lexical = quoted(cur)?;
            let tag = match cur.peek() {
                Some('@') => {
                    cur.next();
                    LiteralTag::Lang(word(cur))
                }
                Some('^') => {
                    cur.next();
                    if cur.next() != Some('^') || cur.next() != Some('<') {
                        return Err("malformed datatype".into());
                    }
                    LiteralTag::Datatype(iri(cur)?)
                }
                _ => LiteralTag::Plain,
            };
            Ok(Node::Literal { lexical, tag })
        }

        Some(c) => Err(format!("unexpected {c:?}")),
        None => Err("unexpected end of line".into()),
    }
}

fn iri(cur: &mut Cursor<'_>) -> Result<String, String> {
    let mut out = String::new();
    for c in cur.by_ref() {
        if c == '>' {
            return Ok(out);
        }
        out.push(c);
    }

    Err("unterminated IRI".into())
}

fn word(cur: &mut Cursor<'_>) -> String {
    let mut out = String::new();
    while let Some(c) =
        cur.next_if(|c| c.is_alphanumeric() || matches!(c, '-' | '_'))
    {
        out.push(c);
    }

    out
}

fn quoted(cur: &mut Cursor<'_>) -> Result<String, String> {
    let mut out = String::new();
    while let Some(c) = cur.next() {
        match c {
            '"' => return Ok(out),
            '\\' => match cur.next() {
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some(c) => return Err(format!("unknown escape \\{c}")),
                None => break,
            },
            c => out.push(c),
        }
    }

    Err("unterminated literal".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
# people
<http://ex.org/alice> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://ex.org/Person> .
<http://ex.org/alice> <http://ex.org/name> "Alice \"A\""@en .
_:b1 <http://ex.org/age> "42"^^<http://www.w3.org/2001/XMLSchema#integer> .
<http://ex.org/alice> <http://ex.org/knows> _:b1 . # trailing comment
"#;

    #[test]
    fn parse_document() {
        let ds = parse_ntriples(DOC).unwrap();
        assert_eq!(ds.len(), 4);

        let name = ds
            .iter()
            .find(|st| st.predicate == Node::iri("http://ex.org/name"))
            .unwrap();
        assert_eq!(
            name.object,
            Node::Literal {
                lexical: "Alice \"A\"".into(),
                tag: LiteralTag::Lang("en".into()),
            }
        );
    }

    #[test]
    fn print_then_parse_is_stable() {
        let ds = parse_ntriples(DOC).unwrap();
        let text = to_ntriples(&ds);

        assert_eq!(parse_ntriples(&text).unwrap(), ds);
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn errors_carry_line_numbers() {
        let bad = "<a> <b> <c> .\n<a> <b> \"open .\n";
        match parse_ntriples(bad) {
            Err(GraphError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {other:?}"),
        }

        assert!(parse_ntriples("\"lit\" <p> <o> .").is_err());
        assert!(parse_ntriples("<s> _:p <o> .").is_err());
        assert!(parse_ntriples("<s> <p> <o>").is_err());
        assert!(parse_ntriples("<s> <p> <o> . extra").is_err());
    }
}

//! A small compound-selector engine.
//!
//! Supports what the perception layer needs: tag names, `#id`, `.class`,
//! attribute presence/equality/prefix tests, `:not(...)`, and comma-separated
//! lists. Combinators are rejected.

use thiserror::Error;

use crate::dom::Element;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unsupported selector syntax at '{0}'")]
    Unsupported(String),
    #[error("unterminated '{0}' in selector")]
    Unterminated(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrTest {
    Exists,
    Equals(String),
    Prefix(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Condition {
    Attr { name: String, test: AttrTest },
    Id(String),
    Class(String),
    Not(Box<Compound>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    conditions: Vec<Condition>,
}

impl Compound {
    fn matches(&self, el: &Element) -> bool {
        if let Some(tag) = &self.tag
            && !el.tag().eq_ignore_ascii_case(tag)
        {
            return false;
        }
        self.conditions.iter().all(|c| match c {
            Condition::Attr { name, test } => match (el.attribute(name), test) {
                (None, _) => false,
                (Some(_), AttrTest::Exists) => true,
                (Some(v), AttrTest::Equals(want)) => v == want,
                (Some(v), AttrTest::Prefix(want)) => v.starts_with(want.as_str()),
            },
            Condition::Id(id) => el.attribute("id") == Some(id.as_str()),
            Condition::Class(class) => el
                .attribute("class")
                .is_some_and(|v| v.split_whitespace().any(|c| c == class)),
            Condition::Not(inner) => !inner.matches(el),
        })
    }
}

/// Parsed, comma-separated selector list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    compounds: Vec<Compound>,
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let mut compounds = Vec::new();
        for part in split_top_level(input)? {
            let part = part.trim();
            if part.is_empty() {
                return Err(SelectorError::Empty);
            }
            let mut parser = Parser {
                chars: part.chars().collect(),
                pos: 0,
            };
            let compound = parser.compound()?;
            if parser.pos < parser.chars.len() {
                return Err(SelectorError::Unsupported(parser.rest()));
            }
            compounds.push(compound);
        }
        if compounds.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Self { compounds })
    }

    pub fn matches(&self, el: &Element) -> bool {
        self.compounds.iter().any(|c| c.matches(el))
    }
}

fn split_top_level(input: &str) -> Result<Vec<&str>, SelectorError> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, ch) in input.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if let Some(q) = quote {
        return Err(SelectorError::Unterminated(q));
    }
    parts.push(&input[start..]);
    Ok(parts)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn rest(&self) -> String {
        self.chars[self.pos..].iter().collect()
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn expect(&mut self, want: char) -> Result<(), SelectorError> {
        if self.peek() == Some(want) {
            self.pos += 1;
            Ok(())
        } else {
            Err(SelectorError::Unterminated(want))
        }
    }

    fn compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        match self.peek() {
            Some('*') => self.pos += 1,
            Some(c) if c.is_alphabetic() => compound.tag = Some(self.ident().to_ascii_lowercase()),
            _ => {}
        }
        while let Some(c) = self.peek() {
            match c {
                '#' => {
                    self.pos += 1;
                    compound.conditions.push(Condition::Id(self.ident()));
                }
                '.' => {
                    self.pos += 1;
                    compound.conditions.push(Condition::Class(self.ident()));
                }
                '[' => {
                    self.pos += 1;
                    compound.conditions.push(self.attribute()?);
                }
                ':' => {
                    self.pos += 1;
                    let name = self.ident();
                    if name != "not" {
                        return Err(SelectorError::Unsupported(format!(":{}", name)));
                    }
                    self.expect('(')?;
                    let inner = self.compound()?;
                    self.expect(')')?;
                    compound.conditions.push(Condition::Not(Box::new(inner)));
                }
                ')' => break,
                _ => return Err(SelectorError::Unsupported(self.rest())),
            }
        }
        if compound.tag.is_none() && compound.conditions.is_empty() && self.pos == 0 {
            return Err(SelectorError::Unsupported(self.rest()));
        }
        Ok(compound)
    }

    fn attribute(&mut self) -> Result<Condition, SelectorError> {
        let name = self.ident().to_ascii_lowercase();
        if name.is_empty() {
            return Err(SelectorError::Unsupported(self.rest()));
        }
        let test = match self.peek() {
            Some(']') => AttrTest::Exists,
            Some('=') => {
                self.pos += 1;
                AttrTest::Equals(self.value()?)
            }
            Some('^') => {
                self.pos += 1;
                self.expect('=')?;
                AttrTest::Prefix(self.value()?)
            }
            _ => return Err(SelectorError::Unsupported(self.rest())),
        };
        self.expect(']')?;
        Ok(Condition::Attr { name, test })
    }

    fn value(&mut self) -> Result<String, SelectorError> {
        match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != q) {
                    self.pos += 1;
                }
                let value = self.chars[start..self.pos].iter().collect();
                self.expect(q)?;
                Ok(value)
            }
            _ => Ok(self.ident()),
        }
    }
}

#[cfg(test)]
#[path = "selector_test.rs"]
mod selector_test;

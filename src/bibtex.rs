//! BibTeX reader for Web of Science exports.
//!
//! Only what an export needs is understood: regular entries, `@string`
//! macros, `#` concatenation and the `@comment` / `@preamble` blocks that are
//! skipped. Anything outside an entry is treated as a comment.

use std::collections::HashMap;

use tracing::{debug, warn};

/// A parsed entry. Field names are lower-cased, values cleaned of
/// protective braces and LaTeX escapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
  pub kind: String,
  pub key: String,
  pub fields: Vec<(String, String)>,
}

impl Entry {
  pub fn get(&self, name: &str) -> Option<&str> {
    self
      .fields
      .iter()
      .find(|(field, _)| field == name)
      .map(|(_, value)| value.as_str())
  }

  pub fn has(&self, name: &str) -> bool {
    self.get(name).map_or(false, |value| !value.is_empty())
  }
}

/// Parse result: the entries in file order and how many were dropped.
#[derive(Debug, Clone, Default)]
pub struct Bibliography {
  pub entries: Vec<Entry>,
  pub skipped: usize,
}

pub fn parse(input: &str) -> Bibliography {
  let mut parser = Parser {
    src: input,
    pos: 0,
    macros: HashMap::new(),
  };
  let mut bib = Bibliography::default();

  while let Some(start) = next_entry(input, parser.pos) {
    parser.pos = start + 1;
    match parser.item() {
      Ok(Some(entry)) => bib.entries.push(entry),
      Ok(None) => {}
      Err(reason) => {
        let line = input[..start].matches('\n').count() + 1;
        warn!(line, reason, "skipping malformed BibTeX entry");
        bib.skipped += 1;
        parser.pos = start + 1;
      }
    }
  }
  debug!(entries = bib.entries.len(), skipped = bib.skipped, "parsed BibTeX");
  bib
}

/// Offset of the next `@` that can open an entry. Text between entries is
/// a comment: `%` lines are skipped, and so is an `@` inside a word such as
/// an e-mail address.
fn next_entry(src: &str, from: usize) -> Option<usize> {
  let in_word = |c: char| c.is_alphanumeric() || "._-+".contains(c);
  let mut prev = src[..from].chars().next_back();
  let mut chars = src[from..].char_indices();
  while let Some((i, c)) = chars.next() {
    match c {
      '%' => {
        for (_, c) in chars.by_ref() {
          if c == '\n' {
            break;
          }
        }
        prev = Some('\n');
        continue;
      }
      '@' if !prev.map_or(false, in_word) => return Some(from + i),
      _ => {}
    }
    prev = Some(c);
  }
  None
}

struct Parser<'a> {
  src: &'a str,
  pos: usize,
  macros: HashMap<String, String>,
}

type Step<T> = Result<T, &'static str>;

impl<'a> Parser<'a> {
  fn peek(&self) -> Option<char> {
    self.src[self.pos..].chars().next()
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.peek()?;
    self.pos += c.len_utf8();
    Some(c)
  }

  fn skip_ws(&mut self) {
    while let Some(c) = self.peek() {
      if c.is_whitespace() {
        self.bump();
      } else {
        break;
      }
    }
  }

  fn expect(&mut self, wanted: char, reason: &'static str) -> Step<()> {
    self.skip_ws();
    if self.bump() == Some(wanted) {
      Ok(())
    } else {
      Err(reason)
    }
  }

  fn ident(&mut self) -> String {
    let start = self.pos;
    while let Some(c) = self.peek() {
      if c.is_alphanumeric() || "_-:.+/".contains(c) {
        self.bump();
      } else {
        break;
      }
    }
    self.src[start..self.pos].to_string()
  }

  /// Parses whatever follows an `@`. Returns `None` for non-entry blocks.
  fn item(&mut self) -> Step<Option<Entry>> {
    self.skip_ws();
    let kind = self.ident().to_lowercase();
    if kind.is_empty() {
      return Err("missing entry type");
    }
    self.skip_ws();
    let close = match self.bump() {
      Some('{') => '}',
      Some('(') => ')',
      _ => return Err("expected '{' or '(' after entry type"),
    };

    match kind.as_str() {
      "comment" | "preamble" => {
        self.balanced(close)?;
        Ok(None)
      }
      "string" => {
        self.skip_ws();
        let name = self.ident().to_lowercase();
        self.expect('=', "expected '=' in @string")?;
        let value = self.value()?;
        self.expect(close, "unterminated @string")?;
        self.macros.insert(name, value);
        Ok(None)
      }
      _ => self.entry(kind, close).map(Some),
    }
  }

  fn entry(&mut self, kind: String, close: char) -> Step<Entry> {
    self.skip_ws();
    let start = self.pos;
    while let Some(c) = self.peek() {
      if c == ',' || c == close {
        break;
      }
      if c == '\n' || c == '@' {
        return Err("unterminated citation key");
      }
      self.bump();
    }
    let key = self.src[start..self.pos].trim().to_string();
    let mut entry = Entry {
      kind,
      key,
      fields: vec![],
    };

    loop {
      self.skip_ws();
      match self.peek() {
        Some(c) if c == close => {
          self.bump();
          return Ok(entry);
        }
        Some(',') => {
          self.bump();
        }
        Some(_) => {
          let name = self.ident().to_lowercase();
          if name.is_empty() {
            return Err("expected field name");
          }
          self.expect('=', "expected '=' after field name")?;
          let value = self.value()?;
          if entry.fields.iter().any(|(field, _)| *field == name) {
            warn!(key = %entry.key, field = %name, "repeated field, keeping the first value");
          } else {
            entry.fields.push((name, value));
          }
        }
        None => return Err("unexpected end of input"),
      }
    }
  }

  /// A field value: pieces joined with `#`.
  fn value(&mut self) -> Step<String> {
    let mut out = String::new();
    loop {
      self.skip_ws();
      match self.peek() {
        Some('{') => {
          self.bump();
          out.push_str(&self.balanced('}')?);
        }
        Some('"') => {
          self.bump();
          out.push_str(&self.quoted()?);
        }
        Some(c) if c.is_alphanumeric() => {
          let word = self.ident();
          match self.macros.get(&word.to_lowercase()) {
            Some(expansion) => out.push_str(expansion),
            None => out.push_str(&word),
          }
        }
        _ => return Err("expected field value"),
      }
      self.skip_ws();
      if self.peek() == Some('#') {
        self.bump();
      } else {
        return Ok(clean_value(&out));
      }
    }
  }

  /// Reads up to the `close` that balances an already consumed opener.
  fn balanced(&mut self, close: char) -> Step<String> {
    let open = if close == ')' { '(' } else { '{' };
    let start = self.pos;
    let mut depth = 1usize;
    while let Some(c) = self.bump() {
      match c {
        '\\' => {
          self.bump();
        }
        c if c == open => depth += 1,
        c if c == close => {
          depth -= 1;
          if depth == 0 {
            return Ok(self.src[start..self.pos - c.len_utf8()].to_string());
          }
        }
        _ => {}
      }
    }
    Err("unbalanced braces")
  }

  fn quoted(&mut self) -> Step<String> {
    let start = self.pos;
    let mut depth = 0usize;
    while let Some(c) = self.bump() {
      match c {
        '\\' => {
          self.bump();
        }
        '{' => depth += 1,
        '}' => depth = depth.saturating_sub(1),
        '"' if depth == 0 => return Ok(self.src[start..self.pos - 1].to_string()),
        _ => {}
      }
    }
    Err("unterminated quoted value")
  }
}

/// Drops grouping braces, resolves the common LaTeX escapes and collapses
/// whitespace (values in exports are wrapped across lines).
pub fn clean_value(raw: &str) -> String {
  let mut out = String::with_capacity(raw.len());
  let mut chars = raw.chars();
  while let Some(c) = chars.next() {
    match c {
      '\\' => match chars.next() {
        Some(next) if "&%_$#{}\"'".contains(next) => out.push(next),
        Some(next) => {
          out.push('\\');
          out.push(next);
        }
        None => out.push('\\'),
      },
      '{' | '}' => {}
      '“' | '”' => out.push('"'),
      _ => out.push(c),
    }
  }
  out.split_whitespace().collect::<Vec<_>>().join(" ")
}

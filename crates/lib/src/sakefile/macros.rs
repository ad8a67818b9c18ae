//! `#! NAME = value` macro definitions and `$NAME` / `${NAME}` expansion.

use std::collections::BTreeMap;

use super::SakefileError;

/// Collect macro definitions from the raw file text.
///
/// Only lines starting with `#!` in the first column count. Later
/// definitions override earlier ones, and `overrides` (from `-D`)
/// override everything. A definition's value is expanded with the macros
/// defined before it.
pub fn collect(source: &str, overrides: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>, SakefileError> {
  let mut macros = BTreeMap::new();

  for (lineno, line) in source.lines().enumerate() {
    // Indented `#!` lines belong to block scalars such as a formula.
    let Some(rest) = line.strip_prefix("#!") else {
      continue;
    };
    let Some((name, value)) = rest.split_once('=') else {
      return Err(SakefileError::InvalidMacro {
        line: lineno + 1,
        text: line.trim().to_string(),
      });
    };
    let name = name.trim();
    if !is_macro_name(name) {
      return Err(SakefileError::InvalidMacro {
        line: lineno + 1,
        text: line.trim().to_string(),
      });
    }
    let value = expand(value.trim(), &macros);
    macros.insert(name.to_string(), value);
  }

  for (name, value) in overrides {
    macros.insert(name.clone(), value.clone());
  }

  Ok(macros)
}

/// Parse a `NAME=value` override as given on the command line.
pub fn parse_override(definition: &str) -> Result<(String, String), SakefileError> {
  match definition.split_once('=') {
    Some((name, value)) if is_macro_name(name.trim()) => Ok((name.trim().to_string(), value.to_string())),
    _ => Err(SakefileError::InvalidMacro {
      line: 0,
      text: definition.to_string(),
    }),
  }
}

fn is_macro_name(name: &str) -> bool {
  let mut chars = name.chars();
  matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Substitute defined macros. Undefined references are left for the shell.
pub fn expand(text: &str, macros: &BTreeMap<String, String>) -> String {
  if macros.is_empty() || !text.contains('$') {
    return text.to_string();
  }

  let mut out = String::with_capacity(text.len());
  let mut rest = text;

  while let Some(at) = rest.find('$') {
    out.push_str(&rest[..at]);
    let after = &rest[at + 1..];

    if let Some(braced) = after.strip_prefix('{')
      && let Some(end) = braced.find('}')
      && let Some(value) = macros.get(&braced[..end])
    {
      out.push_str(value);
      rest = &braced[end + 1..];
      continue;
    }

    let len = after
      .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
      .unwrap_or(after.len());
    if let Some(value) = macros.get(&after[..len]) {
      out.push_str(value);
      rest = &after[len..];
    } else {
      out.push('$');
      rest = after;
    }
  }

  out.push_str(rest);
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  fn defs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  #[test]
  fn collects_definitions_and_overrides() {
    let source = "#! CC = gcc\n#!FLAGS=-O2 -Wall\nbuild:\n  formula: x\n";
    let macros = collect(source, &defs(&[("CC", "clang")])).unwrap();
    assert_eq!(macros["CC"], "clang");
    assert_eq!(macros["FLAGS"], "-O2 -Wall");
  }

  #[test]
  fn later_definitions_see_earlier_ones() {
    let macros = collect("#! DIR = out\n#! FILE = $DIR/data.csv\n", &BTreeMap::new()).unwrap();
    assert_eq!(macros["FILE"], "out/data.csv");
  }

  #[test]
  fn indented_shebang_is_not_a_definition() {
    let source = "gen:\n  formula: |\n    #!/usr/bin/env python3\n    echo hi\n";
    assert!(collect(source, &BTreeMap::new()).unwrap().is_empty());
  }

  #[test]
  fn rejects_malformed_definition() {
    let err = collect("#! just text\n", &BTreeMap::new()).unwrap_err();
    assert!(matches!(err, SakefileError::InvalidMacro { line: 1, .. }));
    assert!(parse_override("1BAD=x").is_err());
    assert_eq!(parse_override("N=a=b").unwrap(), ("N".to_string(), "a=b".to_string()));
  }

  #[test]
  fn expands_plain_and_braced_forms() {
    let macros = defs(&[("CC", "gcc"), ("OUT", "bin")]);
    assert_eq!(expand("$CC -o ${OUT}/app", &macros), "gcc -o bin/app");
    assert_eq!(expand("${OUT}x", &macros), "binx");
  }

  #[test]
  fn leaves_undefined_references_alone() {
    let macros = defs(&[("CC", "gcc")]);
    assert_eq!(expand("echo $HOME ${PATH} $CC $", &macros), "echo $HOME ${PATH} gcc $");
    assert_eq!(expand("cost: $5", &macros), "cost: $5");
  }
}

// src/args.rs

//! `--script-args` preloading.
//!
//! The scanner hands over one raw string like `user=root,pass={x=1}`.
//! Bare words in value position are quoted so the whole thing can be
//! evaluated as a Lua table constructor; the resulting table is exposed
//! to scripts as `scan.args`.

use mlua::{Lua, Table};

use crate::errors::{EngineError, Result};

/// Parse the raw `--script-args` string into a Lua table.
///
/// Parse failures are fatal to the scan and carry the offending text.
pub fn parse_script_args(lua: &Lua, raw: &str) -> Result<Table> {
    let quoted = quote_bare_words(raw);
    let chunk = format!("return {{{quoted}}}");
    lua.load(&chunk)
        .set_name("script-args")
        .eval::<Table>()
        .map_err(|e| {
            EngineError::Config(format!("failed to parse --script-args \"{raw}\": {e}"))
        })
}

/// Quote every bare `[A-Za-z0-9_]+` word that is not a table key, so
/// `a=foo,b=bar` becomes `a="foo",b="bar"` before evaluation.
///
/// Quoted strings pass through untouched (including escapes); everything
/// else (braces, commas, equals) is copied verbatim.
fn quote_bare_words(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' {
            let quote = c;
            out.push(c);
            i += 1;
            while i < chars.len() {
                let ch = chars[i];
                out.push(ch);
                i += 1;
                if ch == '\\' && i < chars.len() {
                    out.push(chars[i]);
                    i += 1;
                    continue;
                }
                if ch == quote {
                    break;
                }
            }
        } else if c.is_ascii_alphanumeric() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();

            // Look past whitespace: a word followed by `=` is a table key.
            let mut j = i;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && chars[j] == '=' {
                out.push_str(&word);
            } else {
                out.push('"');
                out.push_str(&word);
                out.push('"');
            }
        } else {
            out.push(c);
            i += 1;
        }
    }

    out
}

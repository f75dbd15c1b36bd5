// src/script/selector.rs

//! Resolution of user rules against the script index and the filesystem.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::Lua;
use tracing::{debug, info, warn};

use crate::api::{PathKind, ScanApi};
use crate::errors::{EngineError, Result};
use crate::script::{index, loader, Script, ScriptIndex};

/// Rules the user may not supply explicitly; the scanner injects them
/// itself when the matching mode is on.
pub const RESERVED_RULES: &[&str] = &["version"];

/// One entry of the canonical rule table.
///
/// Keys of the table are lower-cased; `original` keeps the user's casing
/// for error messages.
#[derive(Debug)]
struct RuleEntry {
    original: String,
    loaded: bool,
}

/// Resolve the user's rule list into an ordered list of loaded scripts.
///
/// Category rules are satisfied by walking the script index; whatever is
/// left is tried as a filename (with and without the `.nse` suffix) and
/// then as a directory. A rule that resolves to none of those is fatal.
pub fn select_scripts(lua: &Lua, api: &dyn ScanApi, rules: &[String]) -> Result<Vec<Rc<Script>>> {
    for rule in rules {
        if RESERVED_RULES
            .iter()
            .any(|r| r.eq_ignore_ascii_case(rule))
        {
            return Err(EngineError::Config(format!(
                "explicitly specifying rule '{rule}' is prohibited"
            )));
        }
    }

    let mut effective: Vec<String> = rules.to_vec();
    if effective.is_empty() && api.default_mode() {
        effective.push("default".to_string());
    }
    if api.scriptversion() {
        effective.push("version".to_string());
    }

    let mut table: HashMap<String, RuleEntry> = HashMap::new();
    for rule in &effective {
        table.entry(rule.to_lowercase()).or_insert(RuleEntry {
            original: rule.clone(),
            loaded: false,
        });
    }

    let mut scripts: Vec<Rc<Script>> = Vec::new();
    let mut loaded_files: HashSet<PathBuf> = HashSet::new();

    let index = load_index_with_rebuild(api)?;
    select_from_index(lua, api, &index, &mut table, &mut scripts, &mut loaded_files)?;
    select_by_name(
        lua,
        api,
        &effective,
        &mut table,
        &mut scripts,
        &mut loaded_files,
    )?;

    info!("Loaded {} scripts for scanning.", scripts.len());
    Ok(scripts)
}

/// Load the index, rebuilding it once if it is missing or unreadable.
fn load_index_with_rebuild(api: &dyn ScanApi) -> Result<ScriptIndex> {
    let path = api.script_dbpath();
    match index::load_index(&path) {
        Ok(ix) => Ok(ix),
        Err(first) => {
            warn!(
                path = %path.display(),
                error = %first,
                "script index missing or unreadable; attempting a rebuild"
            );
            if !api.updatedb() {
                return Err(EngineError::Config(format!(
                    "script index at {} could not be rebuilt",
                    path.display()
                )));
            }
            index::load_index(&path)
        }
    }
}

/// Walk the index and load every entry a rule selects.
///
/// An entry matches when its category is a rule, when its script name is
/// a rule, or when the user said `all` (which never pulls in `version`).
fn select_from_index(
    lua: &Lua,
    api: &dyn ScanApi,
    index: &ScriptIndex,
    table: &mut HashMap<String, RuleEntry>,
    scripts: &mut Vec<Rc<Script>>,
    loaded_files: &mut HashSet<PathBuf>,
) -> Result<()> {
    // `all` is satisfied by definition, even when every entry is also
    // claimed by a more specific rule or the index has nothing to offer.
    let want_all = match table.get_mut("all") {
        Some(rule) => {
            rule.loaded = true;
            true
        }
        None => false,
    };

    for entry in &index.entries {
        let category = entry.category.to_lowercase();
        let name = short_script_name(&entry.filename).to_lowercase();

        let mut matched = false;
        if let Some(rule) = table.get_mut(&category) {
            rule.loaded = true;
            matched = true;
        }
        if let Some(rule) = table.get_mut(&name) {
            rule.loaded = true;
            matched = true;
        }
        if !matched && want_all && category != "version" {
            matched = true;
        }
        if !matched {
            continue;
        }

        let (kind, absolute) = api
            .fetchfile_absolute(Path::new(&entry.filename))
            .ok_or_else(|| {
                EngineError::Config(format!(
                    "script index entry '{}' does not resolve to a file; \
                     the index may be out of date",
                    entry.filename
                ))
            })?;
        if kind != PathKind::File {
            return Err(EngineError::Config(format!(
                "script index entry '{}' is not a file",
                entry.filename
            )));
        }

        if loaded_files.insert(absolute.clone()) {
            scripts.push(Rc::new(loader::load_script(lua, &absolute)?));
        }
    }

    Ok(())
}

/// Try every still-unsatisfied rule as a filename or directory.
fn select_by_name(
    lua: &Lua,
    api: &dyn ScanApi,
    effective: &[String],
    table: &mut HashMap<String, RuleEntry>,
    scripts: &mut Vec<Rc<Script>>,
    loaded_files: &mut HashSet<PathBuf>,
) -> Result<()> {
    for rule in effective {
        let key = rule.to_lowercase();
        if table.get(&key).map(|r| r.loaded).unwrap_or(true) {
            continue;
        }

        let resolved = api
            .fetchfile_absolute(Path::new(rule))
            .or_else(|| api.fetchfile_absolute(Path::new(&format!("{rule}.nse"))));

        match resolved {
            Some((PathKind::File, absolute)) => {
                if loaded_files.insert(absolute.clone()) {
                    scripts.push(Rc::new(loader::load_script(lua, &absolute)?));
                } else {
                    debug!(file = %absolute.display(), "script already loaded; skipping");
                }
            }
            Some((PathKind::Directory, dir)) => {
                for file in api.dump_dir(&dir)? {
                    if loaded_files.insert(file.clone()) {
                        scripts.push(Rc::new(loader::load_script(lua, &file)?));
                    } else {
                        debug!(file = %file.display(), "script already loaded; skipping");
                    }
                }
            }
            None => {
                let original = table
                    .get(&key)
                    .map(|r| r.original.clone())
                    .unwrap_or_else(|| rule.clone());
                return Err(EngineError::Config(format!(
                    "No such category, filename or directory: {original}"
                )));
            }
        }

        if let Some(entry) = table.get_mut(&key) {
            entry.loaded = true;
        }
    }

    Ok(())
}

/// Final path component without the `.nse` suffix.
fn short_script_name(filename: &str) -> &str {
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);
    base.strip_suffix(".nse").unwrap_or(base)
}

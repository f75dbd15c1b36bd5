// src/script/loader.rs

//! Loading and validation of a single script file.

use std::fs;
use std::path::Path;

use mlua::{Lua, Table, Value};
use tracing::{debug, warn};

use crate::errors::{EngineError, Result};
use crate::lua_api::fresh_script_env;
use crate::script::Script;

fn validation_error(filename: &Path, reason: impl Into<String>) -> EngineError {
    EngineError::ScriptValidation {
        file: filename.display().to_string(),
        reason: reason.into(),
    }
}

/// Load one script file and check the declared-fields contract.
///
/// The body is executed once into a throwaway environment purely to
/// inspect what it declares; per-task environments are populated later by
/// re-running the retained source.
pub fn load_script(lua: &Lua, filename: &Path) -> Result<Script> {
    if filename.extension().and_then(|e| e.to_str()) != Some("nse") {
        warn!(
            file = %filename.display(),
            "script file does not have the .nse extension"
        );
    }

    let source = fs::read_to_string(filename)?;

    let basename = filename
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| validation_error(filename, "path has no file name"))?;
    let short_basename = basename
        .strip_suffix(".nse")
        .unwrap_or(&basename)
        .to_string();

    // Probe run: evaluate the body once and look at what it left behind.
    let env = fresh_script_env(lua, &filename.display().to_string())?;
    let body = lua
        .load(source.as_str())
        .set_name(basename.clone())
        .set_environment(env.clone())
        .into_function()
        .map_err(|e| validation_error(filename, format!("failed to compile: {e}")))?;
    body.call::<()>(())
        .map_err(|e| validation_error(filename, format!("body raised an error: {e}")))?;

    let description = match env.raw_get::<Value>("description")? {
        Value::String(s) => s.to_string_lossy().to_string(),
        Value::Nil => return Err(validation_error(filename, "'description' is missing")),
        _ => return Err(validation_error(filename, "'description' must be a string")),
    };

    if !matches!(env.raw_get::<Value>("action")?, Value::Function(_)) {
        return Err(validation_error(filename, "'action' must be a function"));
    }

    let categories = read_categories(filename, &env)?;

    let has_hostrule = matches!(env.raw_get::<Value>("hostrule")?, Value::Function(_));
    let has_portrule = matches!(env.raw_get::<Value>("portrule")?, Value::Function(_));
    if !has_hostrule && !has_portrule {
        return Err(validation_error(
            filename,
            "at least one of 'hostrule' or 'portrule' must be a function",
        ));
    }

    let author = optional_string(&env, "author")?;
    let license = optional_string(&env, "license")?;
    let runlevel = read_runlevel(&env)?;

    debug!(
        script = %short_basename,
        runlevel,
        categories = ?categories,
        "loaded script"
    );

    Ok(Script {
        filename: filename.to_path_buf(),
        basename,
        id: short_basename.clone(),
        short_basename,
        categories,
        author,
        license,
        description,
        runlevel,
        has_hostrule,
        has_portrule,
        source,
    })
}

fn read_categories(filename: &Path, env: &Table) -> Result<Vec<String>> {
    let table = match env.raw_get::<Value>("categories")? {
        Value::Table(t) => t,
        Value::Nil => return Err(validation_error(filename, "'categories' is missing")),
        _ => return Err(validation_error(filename, "'categories' must be a sequence")),
    };

    let mut categories = Vec::new();
    for entry in table.sequence_values::<Value>() {
        match entry? {
            Value::String(s) => categories.push(s.to_string_lossy().to_string()),
            _ => {
                return Err(validation_error(
                    filename,
                    "'categories' entries must all be strings",
                ))
            }
        }
    }
    if categories.is_empty() {
        return Err(validation_error(filename, "'categories' must not be empty"));
    }
    Ok(categories)
}

fn optional_string(env: &Table, key: &str) -> Result<Option<String>> {
    match env.raw_get::<Value>(key)? {
        Value::String(s) => Ok(Some(s.to_string_lossy().to_string())),
        _ => Ok(None),
    }
}

/// Numeric `runlevel` global, ceiled; defaults to 1, never below 1.
pub(crate) fn read_runlevel(env: &Table) -> Result<u32> {
    let raw = match env.raw_get::<Value>("runlevel")? {
        Value::Integer(i) => i as f64,
        Value::Number(n) => n,
        _ => 1.0,
    };
    let ceiled = raw.ceil();
    // Non-finite values (NaN, infinities) fall back to 1 too.
    if !ceiled.is_finite() || ceiled < 1.0 {
        return Ok(1);
    }
    Ok(ceiled as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_script(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    const VALID: &str = r#"
        description = "Grabs the service banner."
        categories = {"default", "discovery"}
        author = "somebody"

        function portrule(host, port)
            return port.state == "open"
        end

        function action(host, port)
            return "banner"
        end
    "#;

    #[test]
    fn valid_script_loads() {
        let lua = Lua::new();
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "banner.nse", VALID);

        let script = load_script(&lua, &path).unwrap();
        assert_eq!(script.id, "banner");
        assert_eq!(script.basename, "banner.nse");
        assert_eq!(script.short_basename, "banner");
        assert_eq!(script.categories, vec!["default", "discovery"]);
        assert_eq!(script.author.as_deref(), Some("somebody"));
        assert_eq!(script.runlevel, 1);
        assert!(script.has_portrule);
        assert!(!script.has_hostrule);
    }

    #[test]
    fn missing_description_is_rejected() {
        let lua = Lua::new();
        let dir = TempDir::new().unwrap();
        let path = write_script(
            &dir,
            "bad.nse",
            r#"
            categories = {"default"}
            function hostrule(host) return true end
            function action(host) return "x" end
            "#,
        );

        let err = load_script(&lua, &path).unwrap_err().to_string();
        assert!(err.contains("bad.nse"), "{err}");
        assert!(err.contains("description"), "{err}");
    }

    #[test]
    fn non_string_category_is_rejected() {
        let lua = Lua::new();
        let dir = TempDir::new().unwrap();
        let path = write_script(
            &dir,
            "bad-cat.nse",
            r#"
            description = "x"
            categories = {"default", 42}
            function hostrule(host) return true end
            function action(host) return "x" end
            "#,
        );

        let err = load_script(&lua, &path).unwrap_err().to_string();
        assert!(err.contains("categories"), "{err}");
    }

    #[test]
    fn missing_rules_are_rejected() {
        let lua = Lua::new();
        let dir = TempDir::new().unwrap();
        let path = write_script(
            &dir,
            "no-rule.nse",
            r#"
            description = "x"
            categories = {"default"}
            function action(host) return "x" end
            "#,
        );

        let err = load_script(&lua, &path).unwrap_err().to_string();
        assert!(err.contains("hostrule"), "{err}");
    }

    #[test]
    fn fractional_runlevel_is_ceiled() {
        let lua = Lua::new();
        let dir = TempDir::new().unwrap();
        let path = write_script(
            &dir,
            "late.nse",
            r#"
            description = "x"
            categories = {"default"}
            runlevel = 1.5
            function hostrule(host) return true end
            function action(host) return "x" end
            "#,
        );

        let script = load_script(&lua, &path).unwrap();
        assert_eq!(script.runlevel, 2);
    }

    #[test]
    fn nan_runlevel_falls_back_to_one() {
        let lua = Lua::new();
        let dir = TempDir::new().unwrap();
        let path = write_script(
            &dir,
            "odd.nse",
            r#"
            description = "x"
            categories = {"default"}
            runlevel = 0/0
            function hostrule(host) return true end
            function action(host) return "x" end
            "#,
        );

        let script = load_script(&lua, &path).unwrap();
        assert_eq!(script.runlevel, 1);
    }

    #[test]
    fn non_nse_extension_still_loads() {
        let lua = Lua::new();
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "banner.lua", VALID);

        let script = load_script(&lua, &path).unwrap();
        assert_eq!(script.id, "banner.lua");
        assert_eq!(script.short_basename, "banner.lua");
    }

    #[test]
    fn compile_error_names_the_file() {
        let lua = Lua::new();
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, "broken.nse", "function action( -- unterminated");

        let err = load_script(&lua, &path).unwrap_err().to_string();
        assert!(err.contains("broken.nse"), "{err}");
    }
}

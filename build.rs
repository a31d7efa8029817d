// build.rs

use std::collections::BTreeMap;
use std::env;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

/// Every message must exist in this language; the others override it key by key.
const BASE_LANG: &str = "en";
const LOCALES_DIR: &str = "locales";

type Messages = BTreeMap<String, String>;

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo:rerun-if-env-changed=JOBCTL_LANG");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed={LOCALES_DIR}");

    let available = available_languages()?;
    let requested = requested_language();
    let lang = if available.contains(&requested) {
        requested
    } else {
        println!(
            "cargo:warning=No {LOCALES_DIR}/{requested}.toml (have {available:?}); messages stay in '{BASE_LANG}'."
        );
        BASE_LANG.to_string()
    };
    println!("cargo:rustc-env=JOBCTL_LANG_EFFECTIVE={lang}");

    let mut messages = read_locale(BASE_LANG)?;
    if lang != BASE_LANG {
        messages.extend(read_locale(&lang)?);
    }

    let out_dir = env::var_os("OUT_DIR").ok_or("OUT_DIR is not set")?;
    let dest = PathBuf::from(out_dir).join("translations.rs");
    fs::write(&dest, render_macro(&messages))?;
    Ok(())
}

/// The languages with a file under `locales/`, sorted.
fn available_languages() -> Result<Vec<String>, Box<dyn Error>> {
    let mut langs = Vec::new();
    for entry in fs::read_dir(LOCALES_DIR)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "toml") {
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                langs.push(stem.to_string());
            }
        }
    }
    langs.sort();
    Ok(langs)
}

/// A `lang_xx` feature wins over `JOBCTL_LANG`; without either the base language is used.
fn requested_language() -> String {
    let mut features: Vec<String> = env::vars()
        .filter_map(|(key, _)| key.strip_prefix("CARGO_FEATURE_LANG_").map(str::to_lowercase))
        .collect();
    features.sort();

    match features.split_first() {
        Some((first, rest)) => {
            if !rest.is_empty() {
                println!(
                    "cargo:warning=Several language features enabled ({features:?}); using '{first}'."
                );
            }
            first.clone()
        }
        None => env::var("JOBCTL_LANG").unwrap_or_else(|_| BASE_LANG.to_string()),
    }
}

/// Reads `locales/<lang>.toml`, a flat table of message keys.
fn read_locale(lang: &str) -> Result<Messages, Box<dyn Error>> {
    let path = Path::new(LOCALES_DIR).join(format!("{lang}.toml"));
    let content = fs::read_to_string(&path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let messages = toml::from_str(&content)
        .map_err(|e| format!("{} is not a flat table of strings: {e}", path.display()))?;
    Ok(messages)
}

/// One literal arm per key; an unknown key fails to compile.
fn render_macro(messages: &Messages) -> String {
    let mut code = String::from("#[macro_export]\nmacro_rules! t {\n");
    for (key, text) in messages {
        code.push_str(&format!("    ({key:?}) => {{ {text:?} }};\n"));
    }
    code.push_str(
        "    ($key:expr) => {{ compile_error!(concat!(\"Missing translation key: \", $key)) }};\n",
    );
    code.push_str("}\n");
    code
}

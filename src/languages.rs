//! Language definitions for preparation and execution

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::config::JudgeConfig;

const BUILTIN_LANGUAGES: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/languages.toml"));

/// How a language turns a source file into something runnable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageKind {
    /// Built to a native executable
    Compiled {
        compiler: String,
        /// Flags passed on every attempt (e.g. `-O2`)
        flags: Vec<String>,
        /// Standards tried in order, most recent first (e.g. `c++20`)
        std_flags: Vec<String>,
    },
    /// Run as `<interpreter> [args...] <source>`
    Interpreted {
        interpreter: String,
        args: Vec<String>,
    },
}

/// Configuration for a supported programming language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageConfig {
    /// Canonical name (the TOML table key)
    pub name: String,
    pub kind: LanguageKind,
}

impl LanguageConfig {
    pub fn is_compiled(&self) -> bool {
        matches!(self.kind, LanguageKind::Compiled { .. })
    }
}

/// Raw TOML configuration for a language
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLanguageConfig {
    compiler: Option<String>,
    #[serde(default)]
    flags: Vec<String>,
    #[serde(default)]
    std_flags: Vec<String>,
    interpreter: Option<String>,
    #[serde(default)]
    interpreter_args: Vec<String>,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Lookup table from language tag (name or alias, case-insensitive) to config
#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    languages: HashMap<String, Arc<LanguageConfig>>,
}

impl LanguageRegistry {
    /// Definitions shipped with the binary
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_LANGUAGES).context("Invalid built-in languages.toml")
    }

    /// The file named by `config.languages_path`, or the built-in set
    pub fn load(config: &JudgeConfig) -> Result<Self> {
        match &config.languages_path {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read language config {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid language config {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw_configs: HashMap<String, RawLanguageConfig> = toml::from_str(content)?;
        let mut languages = HashMap::new();

        for (name, raw) in raw_configs {
            let kind = match (raw.compiler, raw.interpreter) {
                (Some(compiler), None) => LanguageKind::Compiled {
                    compiler,
                    flags: raw.flags,
                    std_flags: raw.std_flags,
                },
                (None, Some(interpreter)) => LanguageKind::Interpreted {
                    interpreter,
                    args: raw.interpreter_args,
                },
                (Some(_), Some(_)) => {
                    bail!("Language {} sets both compiler and interpreter", name)
                }
                (None, None) => bail!("Language {} needs a compiler or an interpreter", name),
            };

            let config = Arc::new(LanguageConfig {
                name: name.to_lowercase(),
                kind,
            });

            languages.insert(name.to_lowercase(), config.clone());
            for alias in raw.aliases {
                languages.insert(alias.to_lowercase(), config.clone());
            }
        }

        Ok(Self { languages })
    }

    /// Get language configuration by name or alias
    pub fn get(&self, language: &str) -> Option<Arc<LanguageConfig>> {
        self.languages.get(&language.to_lowercase()).cloned()
    }

    /// All accepted tags, aliases included, sorted
    pub fn supported_languages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.languages.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_languages() {
        let registry = LanguageRegistry::builtin().unwrap();

        let cpp = registry.get("CPP").unwrap();
        match &cpp.kind {
            LanguageKind::Compiled {
                compiler,
                flags,
                std_flags,
            } => {
                assert_eq!(compiler, "g++");
                assert_eq!(flags, &vec!["-O2".to_string()]);
                assert_eq!(std_flags.first().map(String::as_str), Some("c++20"));
                assert_eq!(std_flags.last().map(String::as_str), Some("gnu++17"));
            }
            other => panic!("cpp should be compiled, got {:?}", other),
        }

        assert_eq!(registry.get("c++").unwrap().name, "cpp");
        assert_eq!(registry.get("py").unwrap().name, "python");
        assert!(!registry.get("python3").unwrap().is_compiled());
        assert!(registry.get("brainfuck").is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[c]
compiler = "gcc"
std_flags = ["c17", "c11"]

[ruby]
interpreter = "ruby"
interpreter_args = ["--disable-gems"]
aliases = ["rb"]
"#
        )
        .unwrap();

        let registry = LanguageRegistry::from_file(file.path()).unwrap();
        assert!(registry.get("c").unwrap().is_compiled());
        assert_eq!(
            registry.get("rb").unwrap().kind,
            LanguageKind::Interpreted {
                interpreter: "ruby".into(),
                args: vec!["--disable-gems".into()],
            }
        );
        assert_eq!(registry.supported_languages(), vec!["c", "rb", "ruby"]);
    }

    #[test]
    fn test_rejects_ambiguous_language() {
        let err = LanguageRegistry::from_toml_str(
            r#"
[odd]
compiler = "gcc"
interpreter = "sh"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("both compiler and interpreter"));

        assert!(LanguageRegistry::from_toml_str("[empty]\n").is_err());
    }
}

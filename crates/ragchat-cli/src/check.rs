//! Installation check.

use std::path::Path;

use anyhow::{bail, Result};
use walkdir::WalkDir;

use ragchat_core::{ContentType, RagConfig, RagError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub outcome: Outcome,
    pub message: String,
}

impl CheckResult {
    fn new(outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
        }
    }
}

/// Load the configuration, run every check and print a report.
pub fn run(config_path: Option<&Path>) -> Result<()> {
    println!("ragchat installation check");
    println!("{}", "=".repeat(50));

    let config = match RagConfig::from_env(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("[fail] configuration: {}", e);
            bail!("Installation check failed");
        }
    };

    let results = check_config(&config);
    for result in &results {
        let tag = match result.outcome {
            Outcome::Pass => "[ok]  ",
            Outcome::Warn => "[warn]",
            Outcome::Fail => "[fail]",
        };
        println!("{} {}", tag, result.message);
    }

    println!("{}", "=".repeat(50));
    if results.iter().any(|r| r.outcome == Outcome::Fail) {
        println!("Some checks failed. Please fix the issues above.");
        bail!("Installation check failed");
    }

    println!("All checks passed. Start chatting with `ragchat chat`.");
    Ok(())
}

/// Check configuration, directories, documents and embedding model files.
pub fn check_config(config: &RagConfig) -> Vec<CheckResult> {
    let mut results = Vec::new();

    if Path::new(".env").exists() {
        results.push(CheckResult::new(Outcome::Pass, ".env file exists"));
    }

    match config.validate() {
        Ok(()) => results.push(CheckResult::new(Outcome::Pass, "configuration is valid")),
        Err(RagError::MissingApiKey) => results.push(CheckResult::new(
            Outcome::Warn,
            "Google API key not configured (set GOOGLE_API_KEY in .env)",
        )),
        Err(e) => results.push(CheckResult::new(Outcome::Fail, e.to_string())),
    }

    let docs_dir = &config.storage.documents_dir;
    if docs_dir.is_dir() {
        results.push(CheckResult::new(
            Outcome::Pass,
            format!("{}/", docs_dir.display()),
        ));

        let files = supported_files(docs_dir);
        if files.is_empty() {
            results.push(CheckResult::new(
                Outcome::Warn,
                format!("no documents found in {}", docs_dir.display()),
            ));
        } else {
            results.push(CheckResult::new(
                Outcome::Pass,
                format!("found {} document(s): {}", files.len(), files.join(", ")),
            ));
        }
    } else {
        results.push(CheckResult::new(
            Outcome::Fail,
            format!("{}/ (missing)", docs_dir.display()),
        ));
    }

    let store_dir = &config.storage.vector_store_path;
    if store_dir.is_dir() {
        results.push(CheckResult::new(
            Outcome::Pass,
            format!("{}/", store_dir.display()),
        ));
    } else {
        results.push(CheckResult::new(
            Outcome::Warn,
            format!("{}/ (will be created on first index)", store_dir.display()),
        ));
    }

    for file in [config.embedding.onnx_file(), config.embedding.tokenizer_file()] {
        if file.is_file() {
            results.push(CheckResult::new(
                Outcome::Pass,
                format!("embedding model file {}", file.display()),
            ));
        } else {
            results.push(CheckResult::new(
                Outcome::Fail,
                format!("embedding model file {} (missing)", file.display()),
            ));
        }
    }

    results
}

/// Names of loadable files under `dir`, sorted.
fn supported_files(dir: &Path) -> Vec<String> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| ContentType::from_path(&e.path().to_string_lossy()).is_supported())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> RagConfig {
        let mut config = RagConfig::default();
        config.storage.documents_dir = dir.join("documents");
        config.storage.vector_store_path = dir.join("vector_store");
        config.embedding.model_path = dir.join("model");
        config
    }

    fn outcome_of<'a>(results: &'a [CheckResult], needle: &str) -> Option<&'a CheckResult> {
        results.iter().find(|r| r.message.contains(needle))
    }

    #[test]
    fn test_fresh_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let results = check_config(&config_in(dir.path()));

        assert_eq!(
            outcome_of(&results, "GOOGLE_API_KEY").unwrap().outcome,
            Outcome::Warn
        );
        assert_eq!(outcome_of(&results, "(missing)").unwrap().outcome, Outcome::Fail);
        assert_eq!(
            outcome_of(&results, "will be created").unwrap().outcome,
            Outcome::Warn
        );
    }

    #[test]
    fn test_complete_installation_passes() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.llm.api_key = Some("key".to_string());

        std::fs::create_dir_all(&config.storage.documents_dir).unwrap();
        std::fs::create_dir_all(&config.storage.vector_store_path).unwrap();
        std::fs::create_dir_all(&config.embedding.model_path).unwrap();
        std::fs::write(config.storage.documents_dir.join("guide.md"), "# Guide").unwrap();
        std::fs::write(config.storage.documents_dir.join("data.csv"), "a,b").unwrap();
        std::fs::write(config.embedding.onnx_file(), b"onnx").unwrap();
        std::fs::write(config.embedding.tokenizer_file(), b"{}").unwrap();

        let results = check_config(&config);

        assert!(results.iter().all(|r| r.outcome == Outcome::Pass), "{:?}", results);
        assert!(outcome_of(&results, "found 1 document(s): guide.md").is_some());
    }
}

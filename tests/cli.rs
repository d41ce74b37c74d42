//! Binary-level checks: argument handling, validation order and exit codes.
//! None of these reach the network or a database.

mod common;

use std::fs;
use std::process::{Command, Output};
use tempfile::TempDir;

const OPENAI_KEYS: [&str; 5] = [
    "OPENAI_API_KEY",
    "DATABASE_URL",
    "PG_VECTOR_COLLECTION_NAME",
    "OPENAI_EMBEDDING_MODEL",
    "OPENAI_LLM_MODEL",
];

/// Run `rag` in `dir` with an empty environment plus `env`.
fn rag(dir: &TempDir, args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(common::rag_binary());
    cmd.current_dir(dir.path())
        .env_clear()
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .arg("--env-file")
        .arg(dir.path().join("missing.env"))
        .args(args);
    for (k, v) in env {
        cmd.env(k, v);
    }
    cmd.output().expect("failed to run rag binary")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn ingest_without_model_prints_usage() {
    let tmp = TempDir::new().unwrap();
    let output = rag(&tmp, &["ingest"], &[]);
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Uso: rag ingest <openai|gemini>"), "{}", stdout);
}

#[test]
fn ingest_with_invalid_model_fails() {
    let tmp = TempDir::new().unwrap();
    let output = rag(&tmp, &["ingest", "claude"], &[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Invalid LLM model: 'claude'. Use openai or gemini."));
}

#[test]
fn ingest_reports_first_missing_key() {
    let tmp = TempDir::new().unwrap();
    let output = rag(&tmp, &["ingest", "openai"], &[]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Environment variable OPENAI_API_KEY is not set"));

    let output = rag(&tmp, &["ingest", "gemini"], &[("GOOGLE_API_KEY", "g")]);
    assert!(stderr(&output).contains("Environment variable DATABASE_URL is not set"));
}

#[test]
fn ingest_checks_pdf_path_after_keys() {
    let tmp = TempDir::new().unwrap();
    let env: Vec<(&str, &str)> = OPENAI_KEYS.iter().map(|k| (*k, "x")).collect();
    let output = rag(&tmp, &["ingest", "openai"], &env);
    assert!(stderr(&output).contains("Environment variable PDF_PATH is not set"));

    let mut env = env;
    env.push(("PDF_PATH", "document.pdf"));
    let output = rag(&tmp, &["ingest", "openai"], &env);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("document.pdf not found"), "{}", err);
}

#[test]
fn env_file_is_loaded() {
    let tmp = TempDir::new().unwrap();
    let contents: String = OPENAI_KEYS.iter().map(|k| format!("{}=x\n", k)).collect();
    fs::write(tmp.path().join("rag.env"), contents).unwrap();

    let output = Command::new(common::rag_binary())
        .current_dir(tmp.path())
        .env_clear()
        .args(["--env-file", "rag.env", "ingest", "openai"])
        .output()
        .unwrap();
    assert!(stderr(&output).contains("Environment variable PDF_PATH is not set"));
}

#[test]
fn ask_rejects_blank_question_first() {
    let tmp = TempDir::new().unwrap();
    let output = rag(&tmp, &["ask", "  ", "--model", "nope"], &[]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Question is not set"));

    let output = rag(&tmp, &["ask", "Qual o total?", "--model", "nope"], &[]);
    assert!(stderr(&output).contains("Invalid LLM model: 'nope'"));
}

#[test]
fn invalid_config_file_is_reported() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("rag.toml"), "[chunking]\nchunk_size = 100\nchunk_overlap = 200\n").unwrap();
    let output = Command::new(common::rag_binary())
        .current_dir(tmp.path())
        .env_clear()
        .args(["--config", "rag.toml", "ingest", "openai"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("chunk_overlap"));
}

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use docvault_persistence::{
    ErrorResponse, Request, Response, StoreConfig, WorkerHandle, spawn_worker,
};
use serde_json::Value;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tracing::{debug, trace, warn};

use crate::cli::{LoadArgs, SaveArgs, StoreArgs};
use docvault_cli::logging::redact_value;

/// Resolve the store settings: settings file first, then flag overrides.
pub fn store_config(args: &StoreArgs) -> Result<StoreConfig> {
    let mut config = match &args.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("load settings {}", path.display()))?,
        None => StoreConfig::load_or_default(),
    };
    if let Some(root) = &args.root {
        config.root = Some(root.clone());
    }
    if let Some(origin) = &args.origin {
        config.origin = origin.clone();
    }
    if let Some(file_name) = &args.file_name {
        config.file_name = file_name.clone();
    }
    config.validate().context("check store settings")?;
    Ok(config)
}

pub fn run_path(config: &StoreConfig) -> Result<()> {
    let path = config.document_path().context("resolve document path")?;
    println!("{}", path.display());
    Ok(())
}

pub async fn run_save(config: &StoreConfig, args: &SaveArgs, timeout: Duration) -> Result<()> {
    let text = match (&args.document, &args.file) {
        (Some(document), _) => document.clone(),
        (None, Some(path)) => read_document_file(path).await?,
        (None, None) => bail!("no document given"),
    };
    let envelope = save_envelope(&text)?;

    let worker = start_worker(config)?;
    worker.post(envelope).await?;

    let pending = tokio::time::timeout(timeout, worker.shutdown())
        .await
        .context("timed out waiting for the save to finish")?;
    for response in pending {
        if let Response::Error(error) = response {
            bail!(describe_error(&error));
        }
    }
    Ok(())
}

pub async fn run_load(config: &StoreConfig, args: &LoadArgs, timeout: Duration) -> Result<()> {
    let mut worker = start_worker(config)?;
    let response = tokio::time::timeout(timeout, worker.load())
        .await
        .context("timed out waiting for the document")??;

    match response {
        Response::Loaded(text) => {
            trace!(document = redact_value(&text), "Loaded document");
            println!("{}", render_loaded(&text, args.pretty));
            Ok(())
        }
        Response::Error(error) => bail!(describe_error(&error)),
    }
}

pub async fn run_serve(config: &StoreConfig) -> Result<()> {
    let worker = start_worker(config)?;
    serve(
        worker,
        BufReader::new(tokio::io::stdin()),
        &mut tokio::io::stdout(),
    )
    .await
}

/// Bridge JSON lines from `input` to the worker and its responses to `out`.
///
/// Every non-blank line, parsable or not, goes through the worker queue, so
/// responses come out in the order their requests came in.
async fn serve<R, W>(mut worker: WorkerHandle, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("read request from stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                trace!(request = redact_value(&line), "Received request line");
                match serde_json::from_str::<Value>(&line) {
                    Ok(message) => worker.post(message).await?,
                    Err(e) => {
                        warn!("Malformed request line: {e}");
                        worker.post_malformed(e.to_string()).await?;
                    }
                }
            }
            Some(response) = worker.recv() => {
                write_response(out, &response).await?;
            }
        }
    }

    debug!("stdin closed, draining worker");
    for response in worker.shutdown().await {
        write_response(out, &response).await?;
    }
    Ok(())
}

fn start_worker(config: &StoreConfig) -> Result<WorkerHandle> {
    let store = config.open_fs_store().context("open document store")?;
    debug!("Starting worker for {}", store.document_path().display());
    Ok(spawn_worker(store, config.channel_capacity))
}

async fn read_document_file(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("read document from stdin")?;
        return Ok(text);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read document {}", path.display()))
}

/// Parse a JSON object and wrap it as a save envelope.
pub fn save_envelope(text: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(text).context("parse document JSON")?;
    let Value::Object(fields) = value else {
        bail!("document must be a JSON object");
    };
    Ok(Request::save_envelope(fields))
}

/// Text to print for a loaded document.
pub fn render_loaded(text: &str, pretty: bool) -> String {
    if pretty
        && let Ok(value) = serde_json::from_str::<Value>(text)
        && let Ok(rendered) = serde_json::to_string_pretty(&value)
    {
        return rendered;
    }
    text.to_string()
}

fn describe_error(error: &ErrorResponse) -> String {
    format!("{} ({})", error.message, error.kind)
}

async fn write_response<W: AsyncWrite + Unpin>(out: &mut W, response: &Response) -> Result<()> {
    let mut line = serde_json::to_string(response).context("encode response")?;
    line.push('\n');
    out.write_all(line.as_bytes())
        .await
        .context("write response to stdout")?;
    out.flush().await.context("flush stdout")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use docvault_persistence::{DocumentStore, ErrorKind, MemoryStorage};
    use serde_json::json;
    use tempfile::tempdir;

    fn temp_store_args(dir: &Path) -> StoreArgs {
        StoreArgs {
            root: Some(dir.to_path_buf()),
            origin: Some("https://clinic.example".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_save_envelope_adds_type() {
        let envelope = save_envelope(r#"{"name":"Ada","type":"other"}"#).unwrap();
        assert_eq!(envelope, json!({"type": "save", "name": "Ada"}));
    }

    #[test]
    fn test_save_envelope_rejects_non_objects() {
        assert!(save_envelope("[1, 2]").is_err());
        assert!(save_envelope("not json").is_err());
    }

    #[test]
    fn test_render_loaded() {
        assert_eq!(render_loaded("", true), "");
        assert_eq!(render_loaded(r#"{"a":1}"#, false), r#"{"a":1}"#);
        insta::assert_snapshot!(render_loaded(r#"{"a":1}"#, true), @r#"
        {
          "a": 1
        }
        "#);
        assert_eq!(render_loaded("{broken", true), "{broken");
    }

    #[test]
    fn test_store_config_flags_override_file() {
        let dir = tempdir().unwrap();
        let settings = dir.path().join("settings.toml");
        fs::write(&settings, "origin = \"from-file\"\nfile_name = \"Other.txt\"\n").unwrap();

        let args = StoreArgs {
            config: Some(settings),
            ..temp_store_args(dir.path())
        };
        let config = store_config(&args).unwrap();
        assert_eq!(config.origin, "https://clinic.example");
        assert_eq!(config.file_name, "Other.txt");
        assert_eq!(config.root.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_store_config_rejects_bad_file_name() {
        let dir = tempdir().unwrap();
        let args = StoreArgs {
            config: Some(dir.path().join("missing.toml")),
            ..Default::default()
        };
        assert!(store_config(&args).is_err());

        let args = StoreArgs {
            config: None,
            file_name: Some("../up.txt".to_string()),
            ..temp_store_args(dir.path())
        };
        assert!(store_config(&args).is_err());
    }

    #[tokio::test]
    async fn test_save_then_load_through_commands() {
        let dir = tempdir().unwrap();
        let config = StoreConfig {
            root: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let args = SaveArgs {
            document: Some(r#"{"name":"Ada"}"#.to_string()),
            file: None,
        };
        run_save(&config, &args, Duration::from_secs(5)).await.unwrap();

        let stored = fs::read_to_string(config.document_path().unwrap()).unwrap();
        assert_eq!(stored, r#"{"name":"Ada","type":"save"}"#);

        let mut worker = start_worker(&config).unwrap();
        assert_eq!(
            worker.load().await.unwrap(),
            Response::Loaded(stored.clone())
        );
    }

    #[tokio::test]
    async fn test_write_response_lines() {
        let mut out = Vec::new();
        write_response(&mut out, &Response::Loaded(String::new())).await.unwrap();
        let error = ErrorResponse::new("load", ErrorKind::ReadFailure, "boom");
        write_response(&mut out, &Response::Error(error)).await.unwrap();

        insta::assert_snapshot!(String::from_utf8(out).unwrap(), @r#"
        ""
        {"type":"error","request":"load","kind":"read_failure","message":"boom"}
        "#);
    }

    #[tokio::test]
    async fn test_serve_answers_in_request_order() {
        let worker = spawn_worker(DocumentStore::with_default_name(MemoryStorage::new()), 8);
        let input: &[u8] =
            b"{\"type\":\"save\",\"n\":1}\n{\"type\":\"load\"}\nnot json\n\n{\"type\":\"load\"}\n";
        let mut out = Vec::new();
        serve(worker, input, &mut out).await.unwrap();

        let responses: Vec<Response> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let saved = Response::Loaded(r#"{"n":1,"type":"save"}"#.to_string());
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0], saved);
        let Response::Error(error) = &responses[1] else {
            panic!("expected an error for the malformed line");
        };
        assert_eq!(error.request, "unknown");
        assert_eq!(error.kind, ErrorKind::Protocol);
        assert_eq!(responses[2], saved);
    }

    #[tokio::test]
    async fn test_read_document_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, r#"{"name":"Ada"}"#).unwrap();
        assert_eq!(read_document_file(&path).await.unwrap(), r#"{"name":"Ada"}"#);
        assert!(read_document_file(&dir.path().join("missing.json")).await.is_err());
    }
}

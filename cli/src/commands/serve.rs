// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `guardian serve`
//!
//! Runs the gateway in the foreground. Requests arrive as one JSON object
//! per line on stdin and each gets one JSON line on stdout. Logs go to
//! stderr. The process exits on EOF, Ctrl+C or SIGTERM.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::info;

use site_guardian_core::{application::MessageRouter, gateway_config::GatewayConfig};

use crate::gateway::GatewayServices;

pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = GatewayConfig::load_or_default(config_path.clone())
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    let services = GatewayServices::from_config(&config, config_path.as_deref())?;
    let bridge = services.start_bridge();
    let watcher = services.watch_settings().await;
    let router = services.router();
    info!(name = %config.metadata.name, "Gateway serving on stdio");

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    tokio::select! {
        result = serve_lines(&router, stdin, stdout) => {
            let handled = result?;
            info!(handled, "Input closed, gateway stopping");
        }
        _ = shutdown_signal() => {}
    }

    watcher.abort();
    bridge.abort();
    Ok(())
}

/// Answer every request line. Blank lines are skipped. Returns the number of requests handled.
pub async fn serve_lines<R, W>(router: &MessageRouter, input: R, mut output: W) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut handled = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read request")? {
        if line.trim().is_empty() {
            continue;
        }
        let response = router.handle_json(&line).await;
        let mut encoded = serde_json::to_vec(&response).context("Failed to encode response")?;
        encoded.push(b'\n');
        output
            .write_all(&encoded)
            .await
            .context("Failed to write response")?;
        output.flush().await.context("Failed to flush response")?;
        handled += 1;
    }

    Ok(handled)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_serve_lines_answers_each_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GatewayConfig::default();
        config.spec.storage.path = Some(dir.path().join("settings.json"));
        let services = GatewayServices::from_config(&config, None).unwrap();
        let router = services.router();

        let input = concat!(
            r#"{"action":"addControlledSite","domain":"https://www.Bank.com/"}"#,
            "\n\n",
            r#"{"action":"getControlledSites"}"#,
            "\n",
            "not json\n",
        );
        let mut output = Vec::new();
        let handled = serve_lines(&router, input.as_bytes(), &mut output).await.unwrap();
        assert_eq!(handled, 3);

        let answers: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(answers[0], json!({"success": true, "sites": ["bank.com"]}));
        assert_eq!(answers[1], json!({"success": true, "sites": ["bank.com"]}));
        assert_eq!(answers[2]["success"], false);
    }
}

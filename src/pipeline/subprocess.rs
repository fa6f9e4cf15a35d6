//! Purchase attempts through an external buy command.
//!
//! Some deployments keep trading in a separate script (one process per attempt).
//! The script's only interface is its output, so success is recognized by
//! scanning stdout and stderr for a transaction id or a `submitted` line.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::pipeline::attempt::{AttemptError, Confirmation, Fill, PurchaseAttempt, PurchaseOrder};
use crate::pipeline::registry::InFlightGuard;
use crate::types::PurchaseState;

static TX_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:txid|transactionid|transaction_id|transactionhash)["']?\s*[:=]\s*["']?([A-Za-z0-9|_\-]{8,})"#)
        .expect("valid transaction id pattern")
});

const SUBMITTED_MARKER: &str = "submitted";
const POOL_NOT_FOUND: &str = "pool not found";

/// Command line template for the buy script.
///
/// Arguments may contain `{symbol}`, `{token}`, `{vault}`, `{target}`, `{amount}`
/// and `{slippage}` placeholders, filled per order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl BuyCommand {
    /// Split a whitespace separated command line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Arguments with placeholders replaced for `order`.
    pub fn render_args(&self, order: &PurchaseOrder) -> Vec<String> {
        let symbol = order.event.symbol.clone().unwrap_or_else(|| order.label.clone());
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{symbol}", &symbol)
                    .replace("{token}", &order.event.token_name)
                    .replace("{vault}", &order.event.vault_address)
                    .replace("{target}", &order.target_token)
                    .replace("{amount}", &order.buy_amount.to_string())
                    .replace("{slippage}", &order.slippage.tolerance().to_string())
            })
            .collect()
    }
}

impl Default for BuyCommand {
    fn default() -> Self {
        Self {
            program: "node".to_string(),
            args: vec![
                "scripts/buy_launchpad_token.js".to_string(),
                "{symbol}".to_string(),
                "{amount}".to_string(),
                "{slippage}".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Signals collected from a buy command's output.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutputScan {
    pub transaction_id: Option<String>,
    pub submitted: bool,
    pub pool_not_found: Option<String>,
    pub last_error_line: Option<String>,
}

impl OutputScan {
    /// `true` when the output shows the trade reached the venue.
    pub fn reports_submission(&self) -> bool {
        self.transaction_id.is_some() || self.submitted
    }

    fn observe(&mut self, line: &str, stream: OutputStream) {
        if self.transaction_id.is_none() {
            if let Some(caps) = TX_ID_PATTERN.captures(line) {
                self.transaction_id = Some(caps[1].to_string());
            }
        }
        if line.contains(SUBMITTED_MARKER) {
            self.submitted = true;
        }
        if stream == OutputStream::Stderr {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                if self.pool_not_found.is_none() && trimmed.to_lowercase().contains(POOL_NOT_FOUND) {
                    self.pool_not_found = Some(trimmed.to_string());
                }
                self.last_error_line = Some(trimmed.to_string());
            }
        }
    }

    fn merge(mut self, other: OutputScan) -> Self {
        self.transaction_id = self.transaction_id.or(other.transaction_id);
        self.submitted |= other.submitted;
        self.pool_not_found = self.pool_not_found.or(other.pool_not_found);
        self.last_error_line = other.last_error_line.or(self.last_error_line);
        self
    }
}

async fn scan_stream<R>(reader: Option<R>, stream: OutputStream, label: &str) -> OutputScan
where
    R: AsyncRead + Unpin,
{
    let mut scan = OutputScan::default();
    let Some(reader) = reader else {
        return scan;
    };

    // lines are decoded lossily so a stray non-UTF-8 byte cannot end the scan early
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Stopped reading {:?} of buy command for {}: {}", stream, label, e);
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']);
        debug!("[{} {:?}] {}", label, stream, line);
        let had_pool_error = scan.pool_not_found.is_some();
        scan.observe(line, stream);
        if !had_pool_error && scan.pool_not_found.is_some() {
            info!("Pool not found for {}; will retry", label);
        }
    }
    scan
}

/// Runs the configured buy command once per attempt.
pub struct SubprocessAttempt {
    command: BuyCommand,
    env: Vec<(String, String)>,
}

impl SubprocessAttempt {
    /// `env` is added to the child's environment (wallet secrets, gateway URLs).
    pub fn new(command: BuyCommand, env: Vec<(String, String)>) -> Self {
        Self { command, env }
    }
}

#[async_trait]
impl PurchaseAttempt for SubprocessAttempt {
    #[instrument(skip_all, fields(token = %order.label))]
    async fn run(&self, order: &PurchaseOrder, guard: &InFlightGuard) -> Result<Fill, AttemptError> {
        guard.set_state(PurchaseState::Submitting);

        let args = self.command.render_args(order);
        info!("Running buy command for {}: {} {}", order.label, self.command.program, args.join(" "));

        let mut child = Command::new(&self.command.program)
            .args(&args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env("LAUNCHPAD_VAULT_ADDRESS", &order.event.vault_address)
            .env("LAUNCHPAD_TOKEN_NAME", &order.event.token_name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AttemptError::Launch(e.to_string()))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (out_scan, err_scan) = tokio::join!(
            scan_stream(stdout, OutputStream::Stdout, &order.label),
            scan_stream(stderr, OutputStream::Stderr, &order.label),
        );
        let scan = out_scan.merge(err_scan);

        let status = child
            .wait()
            .await
            .map_err(|e| AttemptError::Subprocess { status: None, reason: e.to_string() })?;

        if scan.reports_submission() {
            if !status.success() {
                warn!(
                    "Buy command for {} exited with {} but reported a submission; counting it as bought",
                    order.label, status
                );
            }
            info!(
                "Buy submitted for {} | txId={}",
                order.label,
                scan.transaction_id.as_deref().unwrap_or("unknown")
            );
            return Ok(Fill {
                transaction_id: scan.transaction_id,
                confirmation: Confirmation::NotAwaited,
            });
        }

        let reason = scan
            .pool_not_found
            .or(scan.last_error_line)
            .unwrap_or_else(|| format!("exited with {}", status));
        Err(AttemptError::Subprocess {
            status: status.code(),
            reason,
        })
    }
}

//! `ember run`: the polling daemon.
//!
//! Mirrors the stove into an in-memory host and reads user writes from
//! stdin, one `<id>=<value>` per line. `states` prints the current
//! points. Ctrl-C stops the loop.

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use ember_core::{Adapter, CoreError, Health, MemoryHost};
use serde_json::Value;
use tabled::Tabled;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{GlobalOpts, OutputFormat, RunArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

const STDIN_CHANNEL_SIZE: usize = 16;
const PROVISION_BACKOFF_START: Duration = Duration::from_secs(1);

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let adapter_config = config::adapter_config(global, &cfg, args.interval)?;

    let host = Arc::new(MemoryHost::new());
    let interval = adapter_config.poll_interval;
    let adapter = Adapter::new(adapter_config, Arc::clone(&host))?;

    let cancel = CancellationToken::new();
    let mut handles = vec![
        tokio::spawn(shutdown_on_ctrl_c(cancel.clone())),
        tokio::spawn(report_health(adapter.health(), cancel.clone())),
    ];
    let result = match provision_until_ready(&adapter, interval, &cancel).await {
        Ok(()) if cancel.is_cancelled() => Ok(()),
        Ok(()) => {
            if !args.no_stdin {
                let lines = spawn_stdin_reader();
                handles.push(tokio::spawn(relay_lines(
                    lines,
                    Arc::clone(&host),
                    global.output.clone(),
                    output::should_color(&global.color),
                    cancel.clone(),
                )));
            }
            adapter.run(cancel.clone()).await
        }
        Err(e) => Err(e),
    };

    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }
    Ok(result?)
}

// ── Startup ──────────────────────────────────────────────────────────

/// Provision the host, retrying with a doubling backoff capped at the
/// poll interval while the stove is unreachable. Returns early, without
/// error, once `cancel` fires.
async fn provision_until_ready(
    adapter: &Adapter<MemoryHost>,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<(), CoreError> {
    let mut backoff = PROVISION_BACKOFF_START.min(interval);
    loop {
        let attempt = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            attempt = adapter.provision_objects() => attempt,
        };
        match attempt {
            Ok(_) => return Ok(()),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!(error = %e, retry_in = ?backoff, "stove not ready, retrying"),
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            () = tokio::time::sleep(backoff) => {}
        }
        backoff = backoff.saturating_mul(2).min(interval);
    }
}

// ── Background tasks ─────────────────────────────────────────────────

async fn shutdown_on_ctrl_c(cancel: CancellationToken) {
    tokio::select! {
        () = cancel.cancelled() => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for ctrl-c");
                return;
            }
            info!("interrupt received, shutting down");
            cancel.cancel();
        }
    }
}

async fn report_health(mut health: watch::Receiver<Health>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = health.changed() => {
                if changed.is_err() {
                    break;
                }
                let h = *health.borrow_and_update();
                info!(
                    connected = h.connected,
                    missing_state = h.missing_state,
                    terminated = h.terminated,
                    "health"
                );
            }
        }
    }
}

/// Read stdin on a plain thread; a blocked read must not hold up
/// runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(STDIN_CHANNEL_SIZE);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn relay_lines(
    mut lines: mpsc::Receiver<String>,
    host: Arc<MemoryHost>,
    format: OutputFormat,
    color: bool,
    cancel: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(StdinCommand::States)) => print_states(&host, &format, color),
            Ok(Some(StdinCommand::Write { id, value })) => write_point(&host, &id, value),
            Err(reason) => warn!(line = %line, reason, "ignoring input"),
        }
    }
}

// ── Line protocol ────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum StdinCommand {
    States,
    Write { id: String, value: Value },
}

/// `states`, or `<id>=<value>` where the value is JSON if it parses as
/// such and a plain string otherwise.
fn parse_line(line: &str) -> Result<Option<StdinCommand>, &'static str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    if line == "states" {
        return Ok(Some(StdinCommand::States));
    }

    let (id, raw) = line.split_once('=').ok_or("expected <id>=<value> or 'states'")?;
    let id = id.trim();
    if id.is_empty() {
        return Err("missing state id");
    }
    let raw = raw.trim();
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()));
    Ok(Some(StdinCommand::Write {
        id: id.to_owned(),
        value,
    }))
}

fn write_point(host: &MemoryHost, id: &str, value: Value) {
    match host.object(id) {
        Some(meta) if meta.write => host.user_write(id, value),
        Some(_) => warn!(id, "state point is read-only"),
        None => warn!(id, "no such state point"),
    }
}

#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "Point")]
    id: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Ack")]
    ack: String,
}

#[derive(serde::Serialize)]
struct StateOut {
    id: String,
    val: Value,
    ack: bool,
}

fn print_states(host: &MemoryHost, format: &OutputFormat, color: bool) {
    let states: Vec<StateOut> = host
        .states()
        .into_iter()
        .map(|(id, s)| StateOut {
            id,
            val: s.val,
            ack: s.ack,
        })
        .collect();

    let rendered = output::render_list(
        format,
        &states,
        |s| StateRow {
            id: s.id.clone(),
            value: output::display_value(&s.val),
            ack: output::flag(s.ack, true, color),
        },
        |s| format!("{}={}", s.id, output::display_value(&s.val)),
    );
    match rendered {
        Ok(text) => output::print_output(&text, false),
        Err(e) => warn!(error = %e, "failed to render states"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ember_core::{AdapterConfig, ObjectMeta, ValueType};
    use secrecy::SecretString;
    use serde_json::json;

    fn unreachable_adapter() -> Adapter<MemoryHost> {
        let url = ember_config::parse_device_url("127.0.0.1:1").unwrap();
        let mut config = AdapterConfig::new(url, SecretString::from("1234".to_owned()));
        config.timeout = Duration::from_millis(200);
        Adapter::new(config, Arc::new(MemoryHost::new())).unwrap()
    }

    #[tokio::test]
    async fn provisioning_retries_until_cancelled() {
        let adapter = unreachable_adapter();
        let cancel = CancellationToken::new();

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            stopper.cancel();
        });

        let started = tokio::time::Instant::now();
        provision_until_ready(&adapter, Duration::from_secs(2), &cancel)
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(1500));
        assert!(!adapter.health().borrow().connected);
        assert!(!adapter.is_terminated().await);
    }

    #[tokio::test]
    async fn provisioning_stops_on_host_failure() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "meta": { "nonce": "AB" } })),
            )
            .mount(&server)
            .await;

        let url = ember_config::parse_device_url(&server.uri()).unwrap();
        let config = AdapterConfig::new(url, SecretString::from("1234".to_owned()));
        let host = Arc::new(MemoryHost::new());
        host.set_fail_reads(true);
        let adapter = Adapter::new(config, host).unwrap();

        let err = provision_until_ready(&adapter, Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(adapter.is_terminated().await);
    }

    #[test]
    fn parses_writes_as_json_or_string() {
        assert_eq!(
            parse_line("device.sp_temp = 21.5").unwrap(),
            Some(StdinCommand::Write {
                id: "device.sp_temp".into(),
                value: json!(21.5)
            })
        );
        assert_eq!(
            parse_line("device.prg=true").unwrap(),
            Some(StdinCommand::Write {
                id: "device.prg".into(),
                value: json!(true)
            })
        );
        assert_eq!(
            parse_line("device.x=hello").unwrap(),
            Some(StdinCommand::Write {
                id: "device.x".into(),
                value: json!("hello")
            })
        );
    }

    #[test]
    fn ignores_blank_lines_and_comments() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("# note").unwrap(), None);
        assert_eq!(parse_line("states").unwrap(), Some(StdinCommand::States));
        assert!(parse_line("nonsense").is_err());
        assert!(parse_line("=1").is_err());
    }

    #[test]
    fn only_writable_points_accept_user_writes() {
        let host = MemoryHost::new();
        host.insert_object("device.prg", ObjectMeta::writable("prg", ValueType::Boolean));
        host.insert_object("device.is_temp", ObjectMeta::read_only("is_temp", ValueType::Number));

        write_point(&host, "device.prg", json!(false));
        write_point(&host, "device.is_temp", json!(99));
        write_point(&host, "device.nope", json!(1));

        assert_eq!(host.value("device.prg"), Some(json!(false)));
        assert!(host.value("device.is_temp").is_none());
        assert!(host.value("device.nope").is_none());
    }
}

//! Subprocess delivery through `wakatime-cli`.
//!
//! The primary heartbeat goes in flags; the rest are written to the child's
//! stdin as one JSON array followed by a newline.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

use super::{Delivery, RequestContext, TodayResult, TodayStats, Transport};
use crate::config::obfuscate_key;
use crate::delivery::{FlushBatch, TransportOutcome};
use crate::error::TransportError;
use crate::types::Heartbeat;

/// Wraps `value` in double quotes, escaping embedded quotes, when it
/// contains a space.
pub fn quote(value: &str) -> String {
    if value.contains(' ') {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

fn push_common(args: &mut Vec<String>, ctx: &RequestContext) {
    if ctx.metrics {
        args.push("--metrics".to_string());
    }
    args.push("--key".to_string());
    args.push(quote(&ctx.api_key));
    if let Some(url) = &ctx.api_url {
        args.push("--api-url".to_string());
        args.push(quote(url));
    }
}

fn push_windows_paths(args: &mut Vec<String>, ctx: &RequestContext, log_flag: &str) {
    if cfg!(windows) {
        args.push("--config".to_string());
        args.push(quote(&ctx.config_file.to_string_lossy()));
        args.push(log_flag.to_string());
        args.push(quote(&ctx.log_file.to_string_lossy()));
    }
}

pub fn heartbeat_args(heartbeat: &Heartbeat, ctx: &RequestContext, has_extras: bool) -> Vec<String> {
    let mut args = vec![
        "--entity".to_string(),
        quote(&heartbeat.entity),
        "--time".to_string(),
        heartbeat.time.to_string(),
        "--plugin".to_string(),
        quote(&ctx.user_agent),
        "--lineno".to_string(),
        heartbeat.lineno.to_string(),
        "--cursorpos".to_string(),
        heartbeat.cursorpos.to_string(),
        "--lines-in-file".to_string(),
        heartbeat.lines_in_file.to_string(),
    ];

    if let Some(category) = heartbeat.category {
        args.push("--category".to_string());
        args.push(quote(category.as_str()));
    }
    if let Some(n) = heartbeat.ai_line_changes.filter(|n| *n != 0) {
        args.push("--ai-line-changes".to_string());
        args.push(n.to_string());
    }
    if let Some(n) = heartbeat.human_line_changes.filter(|n| *n != 0) {
        args.push("--human-line-changes".to_string());
        args.push(n.to_string());
    }

    push_common(&mut args, ctx);

    if let Some(project) = &heartbeat.alternate_project {
        args.push("--alternate-project".to_string());
        args.push(quote(project));
    }
    if let Some(folder) = &heartbeat.project_folder {
        args.push("--project-folder".to_string());
        args.push(quote(folder));
    }
    if heartbeat.is_write {
        args.push("--write".to_string());
    }

    push_windows_paths(&mut args, ctx, "--log-file");

    if heartbeat.is_unsaved_entity == Some(true) {
        args.push("--is-unsaved-entity".to_string());
    }
    if has_extras {
        args.push("--extra-heartbeats".to_string());
    }
    args
}

pub fn today_args(ctx: &RequestContext) -> Vec<String> {
    let mut args = vec![
        "--today".to_string(),
        "--output".to_string(),
        "json".to_string(),
        "--plugin".to_string(),
        quote(&ctx.user_agent),
    ];
    push_common(&mut args, ctx);
    push_windows_paths(&mut args, ctx, "--logfile");
    args
}

/// Renders a command line for logs with the api key masked.
pub fn format_arguments(binary: &Path, args: &[String]) -> String {
    let mut out = vec![quote(&binary.to_string_lossy())];
    let mut previous = "";
    for arg in args {
        if previous == "--key" {
            out.push(quote(&obfuscate_key(arg)));
        } else {
            out.push(quote(arg));
        }
        previous = arg;
    }
    out.join(" ")
}

#[derive(Debug, Deserialize)]
struct CliToday {
    #[serde(default)]
    text: Option<String>,
}

/// Parses `--today --output json` output. Unparseable or empty output means
/// no stats yet.
pub fn parse_today(stdout: &str) -> TodayStats {
    if stdout.trim().is_empty() {
        return TodayStats::default();
    }
    match serde_json::from_str::<CliToday>(stdout) {
        Ok(parsed) => TodayStats {
            text: parsed.text.unwrap_or_default().trim().to_string(),
        },
        Err(e) => {
            tracing::debug!(error = %e, output = %stdout, "Error parsing today coding activity as json");
            TodayStats::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct CliTransport {
    binary: PathBuf,
}

impl CliTransport {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn spawn(&self, args: &[String], stdin: Stdio) -> Result<Child, TransportError> {
        Command::new(&self.binary)
            .args(args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TransportError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })
    }

    async fn write_extras(child: &mut Child, extras: &[Heartbeat]) -> Result<(), TransportError> {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("stdin not piped"))?;
        let payload = serde_json::to_string(extras)?;
        stdin.write_all(payload.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.shutdown().await?;
        Ok(())
    }
}

fn exit_outcome(status: std::process::ExitStatus) -> TransportOutcome {
    match status.code() {
        Some(code) => TransportOutcome::Exit(code),
        None => TransportOutcome::Failed("terminated by signal".to_string()),
    }
}

impl Transport for CliTransport {
    async fn send(&self, ctx: RequestContext, batch: FlushBatch) -> Delivery {
        let FlushBatch { primary, extras } = batch;
        let args = heartbeat_args(&primary, &ctx, !extras.is_empty());
        tracing::debug!(command = %format_arguments(&self.binary, &args), "Sending heartbeat");

        let mut child = match self.spawn(&args, Stdio::piped()) {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start cli");
                return Delivery {
                    outcome: TransportOutcome::Failed(e.to_string()),
                    returned: extras,
                };
            }
        };

        let mut returned = Vec::new();
        if let Err(e) = Self::write_extras(&mut child, &extras).await {
            tracing::error!(error = %e, count = extras.len(), "Unable to write extra heartbeats to cli stdin");
            returned = extras;
        }

        let outcome = match child.wait_with_output().await {
            Ok(output) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    if !stderr.trim().is_empty() {
                        tracing::error!(stderr = %stderr.trim(), "cli stderr");
                    }
                    if !stdout.trim().is_empty() {
                        tracing::error!(stdout = %stdout.trim(), "cli stdout");
                    }
                }
                exit_outcome(output.status)
            }
            Err(e) => TransportOutcome::Failed(TransportError::Io(e).to_string()),
        };

        Delivery { outcome, returned }
    }

    async fn today(&self, ctx: RequestContext) -> TodayResult {
        let args = today_args(&ctx);
        tracing::debug!(
            command = %format_arguments(&self.binary, &args),
            "Fetching coding activity for today"
        );

        let output = match self.spawn(&args, Stdio::null()) {
            Ok(child) => child.wait_with_output().await.map_err(TransportError::Io),
            Err(e) => Err(e),
        };
        let output = match output {
            Ok(output) => output,
            Err(e) => return TodayResult::Failed(e.to_string()),
        };

        match output.status.code() {
            Some(0) => TodayResult::Stats(parse_today(&String::from_utf8_lossy(&output.stdout))),
            Some(102 | 112) => TodayResult::Offline,
            code => {
                tracing::debug!(
                    code = ?code,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Error fetching today coding activity"
                );
                TodayResult::Failed(format!("exit {:?}", code))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;

    fn ctx() -> RequestContext {
        RequestContext {
            api_key: "waka_00000000-0000-4000-8000-000000001234".to_string(),
            api_url: None,
            user_agent: "vscode/1.90.0 pulse/0.1.0".to_string(),
            metrics: false,
            machine_name: None,
            config_file: PathBuf::from("/home/u/.wakatime.cfg"),
            log_file: PathBuf::from("/home/u/.wakatime"),
            hide_categories: false,
        }
    }

    fn heartbeat() -> Heartbeat {
        Heartbeat {
            entity: "/repo/my file.ts".to_string(),
            time: 1_700_000_000.25,
            is_write: true,
            lineno: 3,
            cursorpos: 7,
            lines_in_file: 40,
            category: Some(Category::AiCoding),
            alternate_project: None,
            project_folder: Some("/repo".to_string()),
            ai_line_changes: Some(5),
            human_line_changes: Some(0),
            is_unsaved_entity: None,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_quote_only_values_with_spaces() {
        assert_eq!(quote("/a.ts"), "/a.ts");
        assert_eq!(quote("my file"), "\"my file\"");
        assert_eq!(quote("say \"hi\" now"), "\"say \\\"hi\\\" now\"");
    }

    #[test]
    fn test_heartbeat_args() {
        let args = heartbeat_args(&heartbeat(), &ctx(), false);

        assert_eq!(value_after(&args, "--entity"), Some("\"/repo/my file.ts\""));
        assert_eq!(value_after(&args, "--time"), Some("1700000000.25"));
        assert_eq!(value_after(&args, "--plugin"), Some("\"vscode/1.90.0 pulse/0.1.0\""));
        assert_eq!(value_after(&args, "--lineno"), Some("3"));
        assert_eq!(value_after(&args, "--cursorpos"), Some("7"));
        assert_eq!(value_after(&args, "--lines-in-file"), Some("40"));
        assert_eq!(value_after(&args, "--category"), Some("\"ai coding\""));
        assert_eq!(value_after(&args, "--ai-line-changes"), Some("5"));
        assert_eq!(value_after(&args, "--project-folder"), Some("/repo"));
        assert!(!args.contains(&"--human-line-changes".to_string()));
        assert!(!args.contains(&"--api-url".to_string()));
        assert!(!args.contains(&"--metrics".to_string()));
        assert!(args.contains(&"--write".to_string()));
        assert!(!args.contains(&"--extra-heartbeats".to_string()));
    }

    #[test]
    fn test_optional_flags() {
        let mut hb = heartbeat();
        hb.is_write = false;
        hb.is_unsaved_entity = Some(true);
        let mut ctx = ctx();
        ctx.metrics = true;
        ctx.api_url = Some("https://example.test/api/v1".to_string());

        let args = heartbeat_args(&hb, &ctx, true);
        assert!(args.contains(&"--metrics".to_string()));
        assert!(args.contains(&"--is-unsaved-entity".to_string()));
        assert!(args.contains(&"--extra-heartbeats".to_string()));
        assert!(!args.contains(&"--write".to_string()));
        assert_eq!(
            value_after(&args, "--api-url"),
            Some("https://example.test/api/v1")
        );
    }

    #[test]
    fn test_format_arguments_masks_key() {
        let args = today_args(&ctx());
        let line = format_arguments(Path::new("/opt/wakatime cli"), &args);
        assert!(line.starts_with("\"/opt/wakatime cli\" --today --output json"));
        assert!(line.contains("--key XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXX1234"));
        assert!(!line.contains("000000001234"));
    }

    #[test]
    fn test_parse_today() {
        let stats = parse_today(r#"{"text":" 2 hrs 5 mins ","has_team_features":true}"#);
        assert_eq!(stats.text, "2 hrs 5 mins");
        assert_eq!(parse_today(""), TodayStats::default());
        assert_eq!(parse_today("not json"), TodayStats::default());
    }

    #[tokio::test]
    async fn test_missing_binary_returns_extras() {
        let transport = CliTransport::new("/nonexistent/wakatime-cli");
        let mut second = heartbeat();
        second.entity = "/b.ts".to_string();
        let delivery = transport
            .send(
                ctx(),
                FlushBatch {
                    primary: heartbeat(),
                    extras: vec![second.clone()],
                },
            )
            .await;

        assert!(matches!(delivery.outcome, TransportOutcome::Failed(_)));
        assert_eq!(delivery.returned, vec![second]);
    }

    /// Writes a stand-in cli that records its arguments and stdin, then
    /// exits with `code`.
    #[cfg(unix)]
    fn fake_cli(dir: &Path, code: i32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("wakatime-cli");
        let body = format!(
            "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{dir}/args'\ncat > '{dir}/stdin'\nexit {code}\n",
            dir = dir.display(),
            code = code
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_send_streams_extras_and_reports_exit_code() {
        let temp = tempfile::tempdir().unwrap();
        let transport = CliTransport::new(fake_cli(temp.path(), 104));
        let mut primary = heartbeat();
        primary.entity = "/a.ts".to_string();
        let mut extra = heartbeat();
        extra.entity = "/b.ts".to_string();

        let delivery = transport
            .send(
                ctx(),
                FlushBatch {
                    primary,
                    extras: vec![extra],
                },
            )
            .await;

        assert_eq!(delivery.outcome, TransportOutcome::Exit(104));
        assert!(delivery.returned.is_empty());

        let args = std::fs::read_to_string(temp.path().join("args")).unwrap();
        let args: Vec<String> = args.lines().map(str::to_string).collect();
        assert_eq!(value_after(&args, "--entity"), Some("/a.ts"));
        assert!(args.contains(&"--extra-heartbeats".to_string()));

        let stdin = std::fs::read_to_string(temp.path().join("stdin")).unwrap();
        assert!(stdin.ends_with("]\n"), "stdin was {:?}", stdin);
        let extras: serde_json::Value = serde_json::from_str(stdin.trim_end()).unwrap();
        let extras = extras.as_array().unwrap();
        assert_eq!(extras.len(), 1);
        assert_eq!(extras[0]["entity"], "/b.ts");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_send_without_extras_writes_empty_array() {
        let temp = tempfile::tempdir().unwrap();
        let transport = CliTransport::new(fake_cli(temp.path(), 0));

        let delivery = transport
            .send(
                ctx(),
                FlushBatch {
                    primary: heartbeat(),
                    extras: Vec::new(),
                },
            )
            .await;

        assert_eq!(delivery.outcome, TransportOutcome::Exit(0));
        let args = std::fs::read_to_string(temp.path().join("args")).unwrap();
        assert!(!args.lines().any(|a| a == "--extra-heartbeats"));
        let stdin = std::fs::read_to_string(temp.path().join("stdin")).unwrap();
        assert_eq!(stdin, "[]\n");
    }
}

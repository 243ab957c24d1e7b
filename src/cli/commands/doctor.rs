//! Doctor command - verify system requirements and configuration.

use crate::cli::preflight::{env_key_set, version_arg};
use crate::cli::Output;
use crate::config::Settings;
use console::style;
use std::path::Path;
use std::process::Command;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

fn print_section(title: &str, checks: &[CheckResult]) {
    println!("{}", style(title).bold());
    for check in checks {
        check.print();
    }
    println!();
}

/// Run all diagnostic checks.
pub fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("vidpipe doctor");
    println!();
    println!("Checking system requirements and configuration...\n");

    let mut checks = Vec::new();

    // Download tools are interchangeable, so a missing one is only a warning.
    let tools = vec![
        check_tool("yt-dlp", install_hint_ytdlp(), false),
        check_tool("youtube-dl", install_hint_ytdlp(), false),
        check_tool("ffmpeg", install_hint_ffmpeg(), true),
        check_tool("ffprobe", install_hint_ffmpeg(), true),
        check_tool("whisper", "Install with: pip install openai-whisper", false),
    ];
    print_section("External Tools", &tools);
    checks.extend(tools);

    let keys = vec![
        check_api_key("OPENAI_API_KEY", "sk-"),
        check_api_key("ANTHROPIC_API_KEY", "sk-ant-"),
    ];
    print_section("API Keys", &keys);
    checks.extend(keys);

    let dirs = check_directories(settings);
    print_section("Directories", &dirs);
    checks.extend(dirs);

    let config = vec![check_config(settings)];
    print_section("Configuration", &config);
    checks.extend(config);

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before running a batch.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! vidpipe is ready to use.");
    }

    Ok(())
}

/// Check if an external tool is available.
fn check_tool(name: &str, hint: &str, required: bool) -> CheckResult {
    let missing = |message: &str| {
        if required {
            CheckResult::error(name, message, hint)
        } else {
            CheckResult::warning(name, message, hint)
        }
    };

    match Command::new(name).arg(version_arg(name)).output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or("installed")
                .trim()
                .to_string();

            let version_display = if version.chars().count() > 50 {
                format!("{}...", version.chars().take(50).collect::<String>())
            } else {
                version
            };

            CheckResult::ok(name, &version_display)
        }
        Ok(_) => missing("installed but not working"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => missing("not found"),
        Err(e) => missing(&format!("error: {}", e)),
    }
}

/// Check whether an API key is present; a strategy without one is skipped.
fn check_api_key(name: &str, prefix: &str) -> CheckResult {
    let hint = format!("Set with: export {}='{}...'", name, prefix);
    match std::env::var(name) {
        Ok(key) if key.starts_with(prefix) && key.len() > 20 => {
            let masked = format!("{}...{}", &key[..prefix.len()], &key[key.len() - 4..]);
            CheckResult::ok(name, &format!("configured ({})", masked))
        }
        Ok(_) if env_key_set(name) => CheckResult::warning(
            name,
            "set but format looks unusual",
            &format!("Expected format: {}...", prefix),
        ),
        _ => CheckResult::warning(name, "not set", &hint),
    }
}

/// Check the output directory and checkpoint database.
fn check_directories(settings: &Settings) -> Vec<CheckResult> {
    let output_dir = settings.output_dir();
    let checkpoint = settings.checkpoint_path();

    vec![
        check_dir("Output directory", &output_dir),
        if checkpoint.exists() {
            let size = std::fs::metadata(&checkpoint)
                .map(|m| format_size(m.len()))
                .unwrap_or_else(|_| "unknown size".to_string());
            CheckResult::ok(
                "Checkpoints",
                &format!("{} ({})", checkpoint.display(), size),
            )
        } else {
            CheckResult::warning(
                "Checkpoints",
                &format!("{} (not created yet)", checkpoint.display()),
                "The database is created by the first run",
            )
        },
    ]
}

fn check_dir(name: &str, path: &Path) -> CheckResult {
    if path.is_dir() {
        CheckResult::ok(name, &path.display().to_string())
    } else if path.exists() {
        CheckResult::error(
            name,
            &format!("{} is not a directory", path.display()),
            "Point general.output_dir at a directory",
        )
    } else {
        CheckResult::warning(
            name,
            &format!("{} (will be created)", path.display()),
            "Directory will be created on first use",
        )
    }
}

/// Check the config file and the values in it.
fn check_config(settings: &Settings) -> CheckResult {
    if let Err(e) = settings.validate() {
        return CheckResult::error("Config", &e.to_string(), "Fix the value or run: vidpipe config init --force");
    }

    let config_path = Settings::default_config_path();
    if config_path.exists() {
        CheckResult::ok("Config", &format!("{}", config_path.display()))
    } else {
        CheckResult::warning("Config", "using defaults", "Create with: vidpipe config init")
    }
}

/// Format file size in human-readable format.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Platform-specific install hint for yt-dlp.
fn install_hint_ytdlp() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install yt-dlp"
    } else if cfg!(target_os = "linux") {
        "Install with: pip install yt-dlp (or your package manager)"
    } else {
        "Install from: https://github.com/yt-dlp/yt-dlp"
    }
}

/// Platform-specific install hint for ffmpeg.
fn install_hint_ffmpeg() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install ffmpeg"
    } else if cfg!(target_os = "linux") {
        "Install with: sudo apt install ffmpeg (or your package manager)"
    } else {
        "Install from: https://ffmpeg.org/download.html"
    }
}

//! Renders the `rided(1)` manual page from the daemon's settings table.
//!
//! The page lands in `target/generated-man/<target>/<profile>` for packagers
//! and in `OUT_DIR` for anything else in the build that wants it.

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use time::format_description::well_known::Iso8601;

const EPOCH_DATE: &str = "1970-01-01";

/// One environment knob documented in the ENVIRONMENT section.
struct Setting {
    variable: &'static str,
    default: Option<&'static str>,
    summary: &'static str,
}

const SETTINGS: &[Setting] = &[
    Setting {
        variable: "RIDED_DAEMON_SOCKET",
        default: Some("unix://$XDG_RUNTIME_DIR/rided/rided.sock"),
        summary: "Session endpoint, as unix:///path or tcp://host:port.",
    },
    Setting {
        variable: "RIDED_LOG_FILTER",
        default: Some("info"),
        summary: "Tracing filter directives.",
    },
    Setting {
        variable: "RIDED_LOG_FORMAT",
        default: Some("json"),
        summary: "Log output, either json or compact.",
    },
    Setting {
        variable: "RIDED_FAN_OUT_RADIUS_KM",
        default: Some("5.0"),
        summary: "Radius within which online drivers hear about a new request.",
    },
    Setting {
        variable: "RIDED_PRESENCE_TTL_SECS",
        default: Some("300"),
        summary: "Seconds without a location update before a driver is swept offline.",
    },
    Setting {
        variable: "RIDED_SWEEP_INTERVAL_SECS",
        default: Some("60"),
        summary: "Seconds between staleness sweeps.",
    },
    Setting {
        variable: "RIDED_TOMBSTONE_RETENTION_SECS",
        default: Some("3600"),
        summary: "Seconds a finished ride remains queryable.",
    },
    Setting {
        variable: "RIDED_CONFIG_PATH",
        default: None,
        summary: "TOML file layered beneath the environment.",
    },
    Setting {
        variable: "RIDED_FOREGROUND",
        default: None,
        summary: "Stay attached to the terminal instead of detaching.",
    },
];

/// Resolves the page date, honouring reproducible-build timestamps.
fn page_date() -> String {
    let Some(raw) = env::var("SOURCE_DATE_EPOCH").ok() else {
        return EPOCH_DATE.to_owned();
    };
    let formatted = raw
        .parse::<i64>()
        .ok()
        .and_then(|seconds| OffsetDateTime::from_unix_timestamp(seconds).ok())
        .and_then(|moment| moment.format(&Iso8601::DATE).ok());
    formatted.unwrap_or_else(|| {
        println!(
            "cargo:warning=ignoring unusable SOURCE_DATE_EPOCH '{raw}'; dating page {EPOCH_DATE}"
        );
        EPOCH_DATE.to_owned()
    })
}

/// Escapes hyphens and leading dots so roff prints them literally.
fn roff(text: &str) -> String {
    let escaped = text.replace('\\', "\\e").replace('-', "\\-");
    if escaped.starts_with('.') || escaped.starts_with('\'') {
        format!("\\&{escaped}")
    } else {
        escaped
    }
}

fn render(binary: &str, version: &str, date: &str) -> Result<String, std::fmt::Error> {
    let mut page = String::new();
    let title = binary.to_uppercase();
    writeln!(
        page,
        ".TH \"{title}\" \"1\" \"{date}\" \"{binary} {version}\" \"Ride Dispatch\""
    )?;
    writeln!(page, ".SH NAME\n{binary} \\- ride dispatch coordinator")?;
    writeln!(page, ".SH SYNOPSIS\n.B {binary}")?;
    writeln!(
        page,
        ".SH DESCRIPTION\n{}",
        roff(
            "Accepts rider and driver sessions as newline-delimited JSON, fans ride \
             requests out to nearby online drivers, and relays the ride lifecycle to both \
             parties until completion or cancellation."
        )
    )?;
    writeln!(page, ".SH ENVIRONMENT")?;
    for setting in SETTINGS {
        writeln!(page, ".TP\n.B {}", setting.variable)?;
        match setting.default {
            Some(default) => writeln!(
                page,
                "{} Defaults to {}.",
                roff(setting.summary),
                roff(default)
            )?,
            None => writeln!(page, "{}", roff(setting.summary))?,
        }
    }
    writeln!(
        page,
        ".SH FILES\n{}",
        roff(
            "The runtime directory holds rided.lock, rided.pid and rided.health while the \
             daemon runs."
        )
    )?;
    Ok(page)
}

/// `OUT_DIR` is `<target>/<profile>/build/<crate>-<hash>/out`; walk back to `<target>`.
fn target_root() -> PathBuf {
    env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .and_then(|out| out.ancestors().nth(4).map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("target"))
}

fn install(page: &str, dir: &Path, name: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let staged = dir.join(format!("{name}.tmp"));
    let destination = dir.join(name);
    fs::write(&staged, page)?;
    fs::rename(&staged, &destination)?;
    Ok(destination)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    for variable in ["SOURCE_DATE_EPOCH", "TARGET", "PROFILE"] {
        println!("cargo:rerun-if-env-changed={variable}");
    }
    println!("cargo:rerun-if-changed=build.rs");

    let binary = env::var("CARGO_PKG_NAME").unwrap_or_else(|_| "rided".to_owned());
    let version = env::var("CARGO_PKG_VERSION")?;
    let page = render(&binary, &version, &page_date())?;
    let name = format!("{binary}.1");

    let target = env::var("TARGET").unwrap_or_else(|_| "unknown-target".to_owned());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown-profile".to_owned());
    let packaged = target_root()
        .join("generated-man")
        .join(target)
        .join(profile);
    install(&page, &packaged, &name)?;

    if let Some(out_dir) = env::var_os("OUT_DIR").map(PathBuf::from)
        && let Err(error) = install(&page, &out_dir, &name)
    {
        println!(
            "cargo:warning=could not stage {name} in {}: {error}",
            out_dir.display()
        );
    }
    Ok(())
}

//! Build script for tandem-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Validates platform.toml and embeds it as a postcard blob

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tandem_core::config::SystemConfig;

/// Board wiring options that are not part of the kernel configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BoardConfig {
    enable_active_low: bool,
    estop_active_low: bool,
    link_baud: u32,
}

fn main() {
    setup_linker();
    embed_config();
}

/// Set up linker search paths for memory.x
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Copy memory.x to the output directory
    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    // Tell rustc where to find memory.x
    println!("cargo:rustc-link-search={}", out_dir.display());

    // Re-run if memory.x changes
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}

/// Validate platform.toml and write the embedded configuration
///
/// Produces `config.bin` (postcard-encoded [`SystemConfig`]) and
/// `board.rs` (wiring constants) in `OUT_DIR`.
fn embed_config() {
    println!("cargo:rerun-if-changed=platform.toml");

    let config_path = Path::new("platform.toml");

    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: platform.toml not found!                                 ║\n\
            ║                                                                  ║\n\
            ║  The firmware requires a platform.toml configuration file.       ║\n\
            ║  Please create one in the tandem-firmware directory.             ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    let content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Failed to read platform.toml                             ║\n\
                ║                                                                  ║\n\
                ║  Error: {:<56} ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                e
            );
        }
    };

    let value: toml::Value = match toml::from_str(&content) {
        Ok(value) => value,
        Err(e) => fail("Invalid TOML syntax in platform.toml", &e.to_string()),
    };

    validate_required_sections(&value);

    let board: BoardConfig = match value.get("board").cloned().map(|b| b.try_into()) {
        Some(Ok(board)) => board,
        Some(Err(e)) => fail("Invalid [board] section", &e.to_string()),
        None => unreachable!("checked by validate_required_sections"),
    };

    let config: SystemConfig = match toml::from_str(&content) {
        Ok(config) => config,
        Err(e) => fail("Invalid kernel configuration", &e.to_string()),
    };
    if let Err(e) = config.validate() {
        fail("Kernel configuration rejected", &format!("{:?}", e));
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let blob = postcard::to_stdvec(&config).unwrap();
    fs::write(out_dir.join("config.bin"), &blob).unwrap();
    fs::write(out_dir.join("board.rs"), board_constants(&board)).unwrap();

    println!(
        "cargo:warning=platform.toml validated successfully ({} byte config)",
        blob.len()
    );
}

/// Rust source for the board wiring constants
fn board_constants(board: &BoardConfig) -> String {
    format!(
        "/// Driver enable lines energize the motors when driven low\n\
         pub const ENABLE_ACTIVE_LOW: bool = {};\n\
         /// The emergency-stop button pulls its input low when pressed\n\
         pub const ESTOP_ACTIVE_LOW: bool = {};\n\
         /// Host link baud rate\n\
         pub const LINK_BAUD: u32 = {};\n",
        board.enable_active_low, board.estop_active_low, board.link_baud
    )
}

/// Validate that required sections exist
fn validate_required_sections(config: &toml::Value) {
    let mut errors = Vec::new();

    for section in ["limits", "tasks", "timeouts", "devices", "board"] {
        if config.get(section).is_none() {
            errors.push(format!("Missing [{}] section", section));
        }
    }

    if let Some(limits) = config.get("limits").and_then(|l| l.as_array()) {
        if limits.len() != 2 {
            errors.push(format!("[[limits]] needs one entry per motor (2), found {}", limits.len()));
        }
    }

    report("Missing required sections in platform.toml", &errors);
}

/// Format error message lines with box drawing
fn format_error_lines(msg: &str) -> String {
    msg.lines()
        .map(|line| {
            let truncated = if line.len() > 64 {
                format!("{}...", &line[..61])
            } else {
                line.to_string()
            };
            format!("║  {:<64} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn fail(title: &str, detail: &str) -> ! {
    panic!(
        "\n\
        ╔══════════════════════════════════════════════════════════════════╗\n\
        ║  ERROR: {:<56} ║\n\
        ╠══════════════════════════════════════════════════════════════════╣\n\
        {}\n\
        ╚══════════════════════════════════════════════════════════════════╝\n",
        title,
        format_error_lines(detail)
    );
}

fn report(title: &str, errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    panic!(
        "\n\
        ╔══════════════════════════════════════════════════════════════════╗\n\
        ║  ERROR: {:<56} ║\n\
        ╠══════════════════════════════════════════════════════════════════╣\n\
        {}\n\
        ╚══════════════════════════════════════════════════════════════════╝\n",
        title,
        errors
            .iter()
            .map(|e| format!("║  • {:<62} ║", e))
            .collect::<Vec<_>>()
            .join("\n")
    );
}

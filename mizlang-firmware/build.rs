//! Build script for mizlang-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Validates link.toml at compile time and stores it as postcard bytes
//! - Emits the handshake magic as a Rust constant

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use mizlang_core::config::{LinkConfig, MAX_LINK_CONFIG_SIZE};

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
    setup_linker(&out_dir);
    generate_link_config(&out_dir);
}

/// Set up linker search paths for memory.x
fn setup_linker(out_dir: &Path) {
    // Copy memory.x to the output directory
    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    // Tell rustc where to find memory.x
    println!("cargo:rustc-link-search={}", out_dir.display());

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");
    #[cfg(feature = "defmt")]
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");

    // Re-run if memory.x changes
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Validate link.toml and write link_config.bin and handshake_magic.rs
fn generate_link_config(out_dir: &Path) {
    println!("cargo:rerun-if-changed=link.toml");

    let config_path = Path::new("link.toml");

    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: link.toml not found!                                     ║\n\
            ║                                                                  ║\n\
            ║  The firmware requires a link.toml configuration file.           ║\n\
            ║  Please create one in the mizlang-firmware directory.            ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    let content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Failed to read link.toml                                 ║\n\
                ║                                                                  ║\n\
                ║  Error: {:<56} ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                e
            );
        }
    };

    let config: toml::Value = match toml::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            let error_msg = e.to_string();
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Invalid TOML syntax in link.toml                         ║\n\
                ╠══════════════════════════════════════════════════════════════════╣\n\
                {}\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                format_error_lines(&error_msg)
            );
        }
    };

    let mut errors = Vec::new();
    let link = validate_link(&config, &mut errors);
    let magic = validate_magic(&config, &mut errors);

    if !errors.is_empty() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: Invalid values in link.toml                              ║\n\
            ╠══════════════════════════════════════════════════════════════════╣\n\
            {}\n\
            ╚══════════════════════════════════════════════════════════════════╝\n",
            errors
                .iter()
                .map(|e| format!("║  • {:<62} ║", e))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    let mut buf = [0u8; MAX_LINK_CONFIG_SIZE];
    let bytes = link
        .to_slice(&mut buf)
        .expect("link config exceeds MAX_LINK_CONFIG_SIZE");
    fs::write(out_dir.join("link_config.bin"), bytes).unwrap();
    fs::write(out_dir.join("handshake_magic.rs"), magic_source(&magic)).unwrap();

    println!("cargo:warning=link.toml validated successfully");
}

/// Render the magic as a fixed-size array constant
fn magic_source(magic: &[u8]) -> String {
    let bytes = magic
        .iter()
        .map(|b| format!("0x{:02X}", b))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "pub const HANDSHAKE_MAGIC: [u8; {}] = [{}];\n",
        magic.len(),
        bytes
    )
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

/// Read `[link]`, falling back to defaults for missing keys
fn validate_link(config: &toml::Value, errors: &mut Vec<String>) -> LinkConfig {
    let mut link = LinkConfig::DEFAULT;

    let table = match config.get("link") {
        Some(toml::Value::Table(t)) => t,
        Some(_) => {
            errors.push("[link] must be a table".to_string());
            return link;
        }
        None => return link,
    };

    for (key, value) in table {
        let parsed = match value {
            toml::Value::Integer(n) => u8::try_from(*n).ok(),
            _ => None,
        };

        match (key.as_str(), parsed) {
            ("handshake_retries", Some(n)) => link.handshake_retries = n,
            ("write_stall_limit", Some(n)) => link.write_stall_limit = n,
            ("handshake_retries" | "write_stall_limit", None) => {
                errors.push(format!("[link] {} must be an integer 0-255", key));
            }
            _ => errors.push(format!("[link] unknown key '{}'", key)),
        }
    }

    link
}

/// Read `[handshake] magic`, a non-empty byte array
fn validate_magic(config: &toml::Value, errors: &mut Vec<String>) -> Vec<u8> {
    let magic = match config.get("handshake").and_then(|h| h.get("magic")) {
        Some(toml::Value::Array(items)) => items,
        Some(_) => {
            errors.push("[handshake] magic must be an array of bytes".to_string());
            return Vec::new();
        }
        None => {
            errors.push("Missing [handshake] magic".to_string());
            return Vec::new();
        }
    };

    let bytes: Vec<u8> = magic
        .iter()
        .filter_map(|item| match item {
            toml::Value::Integer(n) => u8::try_from(*n).ok(),
            _ => None,
        })
        .collect();

    if bytes.len() != magic.len() {
        errors.push("[handshake] magic entries must be integers 0-255".to_string());
    }
    if bytes.is_empty() || bytes.len() > 8 {
        errors.push("[handshake] magic must be 1-8 bytes".to_string());
    }

    bytes
}

//! Build step for logical plugin references.
//!
//! [`Builder`] is the contract the synthesizer calls when a module has to
//! be produced. [`CargoBuilder`] implements it by generating a small shim
//! crate that re-exports the plugin crate's constructor under the entry
//! symbol, compiling it as a `dylib` and copying the result to the
//! requested output path.
//!
//! # Plugin source layout
//!
//! ```text
//! plugins-src/
//! └── broker/
//!     └── rabbitmq/          <- package name must be `rabbitmq`
//!         ├── Cargo.toml
//!         └── src/lib.rs     <- exports `pub fn new_broker() -> impl Plugin`
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use super::types::PluginSpec;

static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

static CRATE_NAME_INVALID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("valid crate-name regex"));

/// Produces a loadable module at `output` for `spec`.
///
/// Implementations must either leave a loadable module at `output` or
/// return an error. They are never called when the cache reports the
/// output as reusable.
#[cfg_attr(test, mockall::automock)]
pub trait Builder {
    fn build(&self, output: &Path, spec: &PluginSpec) -> anyhow::Result<()>;
}

/// Builds plugins with cargo through a generated shim crate.
#[derive(Debug, Clone)]
pub struct CargoBuilder {
    cargo: String,
    host_crate: PathBuf,
    build_dir: PathBuf,
    release: bool,
}

impl CargoBuilder {
    pub fn new(
        cargo: impl Into<String>,
        host_crate: impl Into<PathBuf>,
        build_dir: impl Into<PathBuf>,
        release: bool,
    ) -> Self {
        Self {
            cargo: cargo.into(),
            host_crate: host_crate.into(),
            build_dir: build_dir.into(),
            release,
        }
    }

    fn profile_dir(&self) -> &'static str {
        if self.release {
            "release"
        } else {
            "debug"
        }
    }

    /// Write the shim crate for `spec` and return its directory.
    fn write_shim(&self, crate_name: &str, spec: &PluginSpec) -> anyhow::Result<PathBuf> {
        let source = fs::canonicalize(&spec.source_path).with_context(|| {
            format!("plugin source not found at {}", spec.source_path.display())
        })?;
        let host = fs::canonicalize(&self.host_crate).with_context(|| {
            format!("host crate not found at {}", self.host_crate.display())
        })?;

        let shim_dir = self.build_dir.join(crate_name);
        fs::create_dir_all(&shim_dir)
            .with_context(|| format!("failed to create {}", shim_dir.display()))?;
        fs::write(
            shim_dir.join("Cargo.toml"),
            render_manifest(crate_name, &spec.name, &source, &host),
        )?;
        fs::write(
            shim_dir.join("lib.rs"),
            render_lib(&spec.entry_symbol, &constructor_name(&spec.entry_symbol)),
        )?;
        Ok(shim_dir)
    }
}

impl Builder for CargoBuilder {
    fn build(&self, output: &Path, spec: &PluginSpec) -> anyhow::Result<()> {
        if !IDENT_RE.is_match(&spec.entry_symbol) {
            bail!(
                "entry symbol '{}' for category '{}' is not a valid Rust identifier",
                spec.entry_symbol,
                spec.category
            );
        }

        let crate_name = shim_crate_name(spec);
        let shim_dir = self.write_shim(&crate_name, spec)?;
        let target_dir = self.build_dir.join("target");

        let mut cmd = Command::new(&self.cargo);
        cmd.arg("build")
            .arg("--manifest-path")
            .arg(shim_dir.join("Cargo.toml"))
            .arg("--target-dir")
            .arg(&target_dir);
        if self.release {
            cmd.arg("--release");
        }

        info!(plugin = %spec.name, source = %spec.source_path.display(), "Building plugin");
        debug!(command = ?cmd, "Invoking cargo");

        let result = cmd
            .output()
            .with_context(|| format!("failed to run {}", self.cargo))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            bail!("cargo exited with {}: {}", result.status, stderr_tail(&stderr));
        }

        let built = target_dir.join(self.profile_dir()).join(format!(
            "{}{}{}",
            std::env::consts::DLL_PREFIX,
            crate_name,
            std::env::consts::DLL_SUFFIX
        ));
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::copy(&built, output).with_context(|| {
            format!("failed to copy {} to {}", built.display(), output.display())
        })?;

        Ok(())
    }
}

/// Snake-case constructor a plugin crate exports for `entry_symbol`
/// (`NewBroker` -> `new_broker`).
pub fn constructor_name(entry_symbol: &str) -> String {
    let mut out = String::with_capacity(entry_symbol.len() + 4);
    for (i, ch) in entry_symbol.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn shim_crate_name(spec: &PluginSpec) -> String {
    let raw = format!("plugin_shim_{}_{}", spec.category, spec.name);
    CRATE_NAME_INVALID_RE.replace_all(&raw, "_").into_owned()
}

fn render_manifest(crate_name: &str, package: &str, source: &Path, host: &Path) -> String {
    format!(
        r#"[package]
name = "{crate_name}"
version = "0.0.0"
edition = "2021"
publish = false

[lib]
crate-type = ["dylib"]
path = "lib.rs"

[dependencies]
plugin-loader = {{ path = {host:?} }}
plugin_source = {{ package = {package:?}, path = {source:?} }}

[workspace]
"#,
        crate_name = crate_name,
        host = host.to_string_lossy(),
        package = package,
        source = source.to_string_lossy(),
    )
}

fn render_lib(entry_symbol: &str, constructor: &str) -> String {
    format!(
        "plugin_loader::export_plugin!({}, plugin_source::{});\n",
        entry_symbol, constructor
    )
}

/// Last few lines of cargo's stderr, enough to show the failing diagnostic.
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    let start = lines.len().saturating_sub(20);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::types::PluginCategory;
    use tempfile::TempDir;

    fn spec(category: &str, name: &str, source: &Path) -> PluginSpec {
        let category = PluginCategory::parse(category);
        PluginSpec {
            name: name.to_string(),
            entry_symbol: category.entry_symbol().into_owned(),
            category,
            source_path: source.to_path_buf(),
        }
    }

    #[test]
    fn test_constructor_name() {
        assert_eq!(constructor_name("NewBroker"), "new_broker");
        assert_eq!(constructor_name("NewPlugin"), "new_plugin");
        assert_eq!(constructor_name("NewBasic_auth"), "new_basic_auth");
    }

    #[test]
    fn test_shim_crate_name_sanitised() {
        let s = spec("wrap-per", "rate.limit", Path::new("/src"));
        assert_eq!(shim_crate_name(&s), "plugin_shim_wrap_per_rate_limit");
    }

    #[test]
    fn test_render_lib() {
        assert_eq!(
            render_lib("NewBroker", "new_broker"),
            "plugin_loader::export_plugin!(NewBroker, plugin_source::new_broker);\n"
        );
    }

    #[test]
    fn test_render_manifest() {
        let manifest = render_manifest(
            "plugin_shim_broker_rabbitmq",
            "rabbitmq",
            Path::new("/src/broker/rabbitmq"),
            Path::new("/host"),
        );
        assert!(manifest.contains(r#"name = "plugin_shim_broker_rabbitmq""#));
        assert!(manifest.contains(r#"crate-type = ["dylib"]"#));
        assert!(manifest.contains(r#"plugin-loader = { path = "/host" }"#));
        assert!(manifest
            .contains(r#"plugin_source = { package = "rabbitmq", path = "/src/broker/rabbitmq" }"#));
        assert!(manifest.contains("[workspace]"));
    }

    #[test]
    fn test_build_rejects_invalid_symbol() {
        let tmp = TempDir::new().unwrap();
        let builder = CargoBuilder::new("cargo", tmp.path(), tmp.path().join("build"), true);
        let s = spec("foo-bar", "baz", tmp.path());
        assert_eq!(s.entry_symbol, "NewFoo-Bar");

        let err = builder.build(&tmp.path().join("out.so"), &s).unwrap_err();
        assert!(err.to_string().contains("not a valid Rust identifier"));
    }

    #[test]
    fn test_build_missing_source() {
        let tmp = TempDir::new().unwrap();
        let builder = CargoBuilder::new("cargo", tmp.path(), tmp.path().join("build"), true);
        let s = spec("broker", "rabbitmq", &tmp.path().join("missing/broker/rabbitmq"));

        let err = builder.build(&tmp.path().join("out.so"), &s).unwrap_err();
        assert!(format!("{:#}", err).contains("plugin source not found"));
    }

    #[test]
    fn test_build_missing_toolchain() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("broker/rabbitmq");
        fs::create_dir_all(&source).unwrap();
        let builder = CargoBuilder::new(
            "definitely-not-a-cargo-binary",
            tmp.path(),
            tmp.path().join("build"),
            false,
        );

        let err = builder
            .build(&tmp.path().join("out.so"), &spec("broker", "rabbitmq", &source))
            .unwrap_err();
        assert!(err.to_string().contains("failed to run definitely-not-a-cargo-binary"));
        assert!(tmp
            .path()
            .join("build/plugin_shim_broker_rabbitmq/lib.rs")
            .exists());
    }

    #[test]
    fn test_stderr_tail_limits_lines() {
        let stderr: String = (0..30).map(|i| format!("line {}\n", i)).collect();
        let tail = stderr_tail(&stderr);
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
    }
}

//! Plugin types for plugin-loader
//!
//! This module defines the types shared by every pipeline stage: the
//! closed set of plugin categories and their entry symbols, the build
//! request handed to a [`Builder`](super::builder::Builder), the [`Plugin`]
//! trait a loaded module hands back, and the [`EntryPoint`] wrapper the
//! loader resolves.

use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;

/// File extension of loadable modules on this platform (`so`, `dylib`, `dll`).
pub const MODULE_EXTENSION: &str = std::env::consts::DLL_EXTENSION;

/// Entry symbol of the reserved `micro` category, and the symbol every
/// direct module path is expected to export.
pub const DEFAULT_ENTRY_SYMBOL: &str = "NewPlugin";

/// Name of the exported static carrying a module's plugin ABI version.
pub const ABI_VERSION_SYMBOL: &str = "PLUGIN_ABI_VERSION";

/// ABI version a module must export to be loadable by this host.
///
/// Bump whenever the [`Plugin`] trait changes shape.
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// Category of a plugin, taken from the first segment of a logical reference.
///
/// Known categories map to a fixed entry symbol. The reserved `micro`
/// category always uses [`DEFAULT_ENTRY_SYMBOL`]; unlisted categories fall
/// back to `"New" + TitleCase(category)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PluginCategory {
    Broker,
    Client,
    Codec,
    Registry,
    Selector,
    Server,
    Transport,
    /// First-party host extensions.
    Micro,
    Other(String),
}

impl PluginCategory {
    /// Classify a path segment. Matching is exact (case-sensitive).
    pub fn parse(segment: &str) -> Self {
        match segment {
            "broker" => PluginCategory::Broker,
            "client" => PluginCategory::Client,
            "codec" => PluginCategory::Codec,
            "registry" => PluginCategory::Registry,
            "selector" => PluginCategory::Selector,
            "server" => PluginCategory::Server,
            "transport" => PluginCategory::Transport,
            "micro" => PluginCategory::Micro,
            other => PluginCategory::Other(other.to_string()),
        }
    }

    /// The category as written in identifiers.
    pub fn as_str(&self) -> &str {
        match self {
            PluginCategory::Broker => "broker",
            PluginCategory::Client => "client",
            PluginCategory::Codec => "codec",
            PluginCategory::Registry => "registry",
            PluginCategory::Selector => "selector",
            PluginCategory::Server => "server",
            PluginCategory::Transport => "transport",
            PluginCategory::Micro => "micro",
            PluginCategory::Other(name) => name,
        }
    }

    /// The exported constructor symbol a module of this category must provide.
    pub fn entry_symbol(&self) -> Cow<'static, str> {
        match self {
            PluginCategory::Broker => Cow::Borrowed("NewBroker"),
            PluginCategory::Client => Cow::Borrowed("NewClient"),
            PluginCategory::Codec => Cow::Borrowed("NewCodec"),
            PluginCategory::Registry => Cow::Borrowed("NewRegistry"),
            PluginCategory::Selector => Cow::Borrowed("NewSelector"),
            PluginCategory::Server => Cow::Borrowed("NewServer"),
            PluginCategory::Transport => Cow::Borrowed("NewTransport"),
            PluginCategory::Micro => Cow::Borrowed(DEFAULT_ENTRY_SYMBOL),
            PluginCategory::Other(name) => Cow::Owned(format!("New{}", title_case(name))),
        }
    }
}

impl fmt::Display for PluginCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper-case the first letter of every word.
///
/// Word boundaries are any character that is not a letter, digit or
/// underscore, so `basic_auth` stays one word and `foo-bar` becomes `Foo-Bar`.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut at_boundary = true;
    for ch in input.chars() {
        if at_boundary {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        at_boundary = !(ch.is_alphanumeric() || ch == '_');
    }
    out
}

/// A request to build one logical reference into a loadable module.
///
/// Created by the synthesizer and consumed once by the builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSpec {
    /// Last identifier segment (e.g. `rabbitmq`).
    pub name: String,

    /// First identifier segment.
    pub category: PluginCategory,

    /// Source location: the plugins source root joined with every non-empty
    /// segment.
    pub source_path: PathBuf,

    /// Symbol the built module must export.
    pub entry_symbol: String,
}

impl PluginSpec {
    /// Derive a spec from identifier segments.
    ///
    /// `segments` must hold at least two entries; the parser guarantees this.
    pub fn from_segments(segments: &[String], source_root: &std::path::Path) -> Self {
        let category = PluginCategory::parse(segments.first().map_or("", String::as_str));
        let name = segments.last().cloned().unwrap_or_default();
        let source_path = segments
            .iter()
            .filter(|segment| !segment.is_empty())
            .fold(source_root.to_path_buf(), |path, segment| path.join(segment));
        let entry_symbol = category.entry_symbol().into_owned();

        Self {
            name,
            category,
            source_path,
            entry_symbol,
        }
    }
}

/// An initialised extension of the host.
///
/// Modules hand out instances through their entry point; see
/// [`export_plugin!`](crate::export_plugin).
pub trait Plugin: Send {
    /// Unique name; the registry rejects duplicates.
    fn name(&self) -> &str;

    /// One-line human description, shown in registry listings.
    fn description(&self) -> &str {
        ""
    }

    /// Initialisation hook run once before registration.
    fn init(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Signature of the constructor every module exports.
pub type PluginEntryFn = fn() -> Box<dyn Plugin>;

/// A resolved, invocable entry point.
pub struct EntryPoint {
    symbol: String,
    constructor: Box<dyn Fn() -> Box<dyn Plugin> + Send + Sync>,
}

impl EntryPoint {
    pub fn new(
        symbol: impl Into<String>,
        constructor: impl Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            constructor: Box::new(constructor),
        }
    }

    /// The symbol this entry point was resolved from.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Call the constructor. May panic if the module does.
    pub fn invoke(&self) -> Box<dyn Plugin> {
        (self.constructor)()
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoint")
            .field("symbol", &self.symbol)
            .finish()
    }
}

/// Export a plugin constructor from a `dylib` crate.
///
/// Emits the `#[no_mangle]` entry function under `$symbol` together with
/// the ABI version static the loader checks.
///
/// ```rust,ignore
/// plugin_loader::export_plugin!(NewBroker, rabbitmq::new_broker);
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($symbol:ident, $constructor:path) => {
        #[no_mangle]
        #[allow(non_snake_case)]
        pub fn $symbol() -> ::std::boxed::Box<dyn $crate::plugins::Plugin> {
            ::std::boxed::Box::new($constructor())
        }

        #[no_mangle]
        pub static PLUGIN_ABI_VERSION: u32 = $crate::plugins::PLUGIN_ABI_VERSION;
    };
}

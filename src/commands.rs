//! Registry of the RPC commands the server understands.
//!
//! Every command carries its argument contract and the strategy used to
//! render its result. The table is checked for consistency once, the first
//! time it is consulted, and is immutable afterwards.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::OnceLock;
use thiserror::Error;

/// Argument keys taken by the global options.
pub const RESERVED_KEYS: [&str; 2] = ["port", "timeout"];

/// Which group a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// No arguments beyond the global options.
    Simple,
    /// Takes one or more session identifiers.
    SessionTargeted,
    /// Declares its own argument set.
    Custom,
}

/// Type a command-line value is coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Int,
    StringList,
}

/// How many tokens an argument consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    One,
    OneOrMore,
    ZeroOrOne,
}

/// Value used when an optional argument is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    Str(&'static str),
    Int(i64),
}

impl DefaultValue {
    pub fn to_json(self) -> Value {
        match self {
            DefaultValue::Str(s) => Value::from(s),
            DefaultValue::Int(n) => Value::from(n),
        }
    }

    fn matches(self, value_type: ValueType) -> bool {
        matches!(
            (self, value_type),
            (DefaultValue::Str(_), ValueType::String) | (DefaultValue::Int(_), ValueType::Int)
        )
    }
}

/// Table formatters for list-shaped replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFormatter {
    Groups,
    Peers,
    Sessions,
}

/// Strategy used to print a successful result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFormat {
    /// Indented, key-sorted JSON.
    RawJson,
    /// An array of pre-formatted lines.
    LineList,
    /// A single string split on line boundaries.
    SplitText,
    /// A structured result turned into table lines.
    Named(LineFormatter),
}

/// One argument of a command.
///
/// An argument with neither a short nor a long flag is positional.
#[derive(Debug, PartialEq, Eq)]
pub struct ArgumentDef {
    /// Key the value is stored under in the request params.
    pub key: &'static str,
    pub short: Option<char>,
    pub long: Option<&'static str>,
    pub value_type: ValueType,
    pub required: bool,
    pub default: Option<DefaultValue>,
    pub arity: Arity,
    pub help: &'static str,
}

impl ArgumentDef {
    const fn positional(key: &'static str, value_type: ValueType, help: &'static str) -> Self {
        Self {
            key,
            short: None,
            long: None,
            value_type,
            required: true,
            default: None,
            arity: Arity::One,
            help,
        }
    }

    const fn one_or_more(self) -> Self {
        Self {
            arity: Arity::OneOrMore,
            ..self
        }
    }

    const fn optional(self, default: DefaultValue) -> Self {
        Self {
            required: false,
            default: Some(default),
            ..self
        }
    }

    const fn zero_or_one(self, default: DefaultValue) -> Self {
        Self {
            arity: Arity::ZeroOrOne,
            ..self.optional(default)
        }
    }

    const fn flag(self, short: Option<char>, long: &'static str) -> Self {
        Self {
            short,
            long: Some(long),
            ..self
        }
    }

    /// Whether the argument is matched by position rather than by flag.
    pub fn is_positional(&self) -> bool {
        self.short.is_none() && self.long.is_none()
    }
}

/// Contract of a single RPC command.
#[derive(Debug, PartialEq, Eq)]
pub struct CommandSpec {
    /// Subcommand name, also sent as the RPC method.
    pub name: &'static str,
    pub kind: CommandKind,
    pub about: &'static str,
    pub args: &'static [ArgumentDef],
    pub format: ResultFormat,
}

impl CommandSpec {
    const fn simple(name: &'static str, about: &'static str, format: ResultFormat) -> Self {
        Self {
            name,
            kind: CommandKind::Simple,
            about,
            args: &[],
            format,
        }
    }

    const fn sessions(name: &'static str, about: &'static str, args: &'static [ArgumentDef]) -> Self {
        Self {
            name,
            kind: CommandKind::SessionTargeted,
            about,
            args,
            format: ResultFormat::RawJson,
        }
    }

    const fn custom(
        name: &'static str,
        about: &'static str,
        args: &'static [ArgumentDef],
        format: ResultFormat,
    ) -> Self {
        Self {
            name,
            kind: CommandKind::Custom,
            about,
            args,
            format,
        }
    }
}

static SESSION_ARGS: [ArgumentDef; 1] = [ArgumentDef::positional(
    "session_ids",
    ValueType::StringList,
    "list of session ids",
)
.one_or_more()];

static ADD_PEER_ARGS: [ArgumentDef; 1] = [ArgumentDef::positional(
    "real_name",
    ValueType::String,
    "e.g. \"a.domain.name s995 t\"",
)];

static DAEMON_URL_ARGS: [ArgumentDef; 1] = [ArgumentDef::positional(
    "daemon_url",
    ValueType::String,
    "see documentation of DAEMON_URL envvar",
)
.zero_or_one(DefaultValue::Str(""))];

static QUERY_ARGS: [ArgumentDef; 2] = [
    ArgumentDef::positional("limit", ValueType::Int, "UTXO and history output limit")
        .flag(Some('l'), "limit")
        .optional(DefaultValue::Int(1000)),
    ArgumentDef::positional(
        "items",
        ValueType::StringList,
        "hex scripts, or addresses, to query",
    )
    .one_or_more(),
];

static REORG_ARGS: [ArgumentDef; 1] =
    [ArgumentDef::positional("count", ValueType::Int, "number of blocks to back up")
        .zero_or_one(DefaultValue::Int(3))];

static LIST_OBJECTS_ARGS: [ArgumentDef; 1] =
    [ArgumentDef::positional("limit", ValueType::Int, "max number of types to return")
        .flag(None, "limit")
        .optional(DefaultValue::Int(50))];

static BACKREF_CHAIN_ARGS: [ArgumentDef; 1] = [ArgumentDef::positional(
    "objtype",
    ValueType::String,
    "e.g. \"_asyncio.Task\"",
)];

static COMMANDS: [CommandSpec; 13] = [
    CommandSpec::simple(
        "getinfo",
        "Print a summary of server state",
        ResultFormat::RawJson,
    ),
    CommandSpec::simple(
        "groups",
        "Print current session groups",
        ResultFormat::Named(LineFormatter::Groups),
    ),
    CommandSpec::simple(
        "peers",
        "Print information about peer servers for the same coin",
        ResultFormat::Named(LineFormatter::Peers),
    ),
    CommandSpec::simple(
        "sessions",
        "Print information about client sessions",
        ResultFormat::Named(LineFormatter::Sessions),
    ),
    CommandSpec::simple("stop", "Shut down the server cleanly", ResultFormat::RawJson),
    CommandSpec::sessions("disconnect", "Disconnect sessions", &SESSION_ARGS),
    CommandSpec::sessions("log", "Control logging of sessions", &SESSION_ARGS),
    CommandSpec::custom(
        "add_peer",
        "add a peer to the peers list",
        &ADD_PEER_ARGS,
        ResultFormat::RawJson,
    ),
    CommandSpec::custom(
        "daemon_url",
        "replace the daemon's URL at run-time, and forcefully rotate to the first URL in the list",
        &DAEMON_URL_ARGS,
        ResultFormat::RawJson,
    ),
    CommandSpec::custom(
        "query",
        "query the UTXO and history databases",
        &QUERY_ARGS,
        ResultFormat::LineList,
    ),
    CommandSpec::custom(
        "reorg",
        "simulate a chain reorganization",
        &REORG_ARGS,
        ResultFormat::RawJson,
    ),
    CommandSpec::custom(
        "debug_memusage_list_all_objects",
        "Print a table of types of most common types in memory",
        &LIST_OBJECTS_ARGS,
        ResultFormat::SplitText,
    ),
    CommandSpec::custom(
        "debug_memusage_get_random_backref_chain",
        "Return a dotfile as text containing the backref chain for a randomly selected object of type objtype",
        &BACKREF_CHAIN_ARGS,
        ResultFormat::SplitText,
    ),
];

/// Inconsistencies found while building the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("command name is empty")]
    EmptyName,
    #[error("command '{0}' is registered twice")]
    DuplicateCommand(&'static str),
    #[error("command '{command}' declares argument '{key}' twice")]
    DuplicateKey {
        command: &'static str,
        key: &'static str,
    },
    #[error("command '{command}' uses reserved argument key '{key}'")]
    ReservedKey {
        command: &'static str,
        key: &'static str,
    },
    #[error("command '{command}': positional '{key}' follows a variadic positional")]
    VariadicNotLast {
        command: &'static str,
        key: &'static str,
    },
    #[error("command '{command}': argument '{key}' has an arity that does not fit its type")]
    ArityMismatch {
        command: &'static str,
        key: &'static str,
    },
    #[error("command '{command}': required argument '{key}' has a default")]
    RequiredWithDefault {
        command: &'static str,
        key: &'static str,
    },
    #[error("command '{command}': optional argument '{key}' has no default")]
    MissingDefault {
        command: &'static str,
        key: &'static str,
    },
    #[error("command '{command}': default of '{key}' does not match its type")]
    DefaultTypeMismatch {
        command: &'static str,
        key: &'static str,
    },
}

/// Validated, immutable command table.
#[derive(Debug)]
pub struct Registry {
    commands: &'static [CommandSpec],
}

impl Registry {
    /// Build a registry over `commands`, rejecting inconsistent contracts.
    pub fn new(commands: &'static [CommandSpec]) -> Result<Self, RegistryError> {
        let mut names = HashSet::new();
        for spec in commands {
            if spec.name.is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if !names.insert(spec.name) {
                return Err(RegistryError::DuplicateCommand(spec.name));
            }
            validate_args(spec)?;
        }
        Ok(Self { commands })
    }

    /// Find the contract for `name`.
    pub fn lookup(&self, name: &str) -> Option<&'static CommandSpec> {
        self.commands.iter().find(|spec| spec.name == name)
    }

    /// All commands in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &'static CommandSpec> {
        self.commands.iter()
    }
}

fn validate_args(spec: &CommandSpec) -> Result<(), RegistryError> {
    let command = spec.name;
    let mut keys = HashSet::new();
    let mut seen_variadic = false;

    for def in spec.args {
        let key = def.key;
        if RESERVED_KEYS.contains(&key) {
            return Err(RegistryError::ReservedKey { command, key });
        }
        if !keys.insert(key) {
            return Err(RegistryError::DuplicateKey { command, key });
        }

        let list = def.value_type == ValueType::StringList;
        if list != (def.arity == Arity::OneOrMore) {
            return Err(RegistryError::ArityMismatch { command, key });
        }

        if def.is_positional() {
            if seen_variadic {
                return Err(RegistryError::VariadicNotLast { command, key });
            }
            seen_variadic = def.arity == Arity::OneOrMore;
        }

        match (def.required, def.default) {
            (true, Some(_)) => return Err(RegistryError::RequiredWithDefault { command, key }),
            (false, None) => return Err(RegistryError::MissingDefault { command, key }),
            (true, None) if def.arity == Arity::ZeroOrOne => {
                return Err(RegistryError::MissingDefault { command, key })
            }
            (_, Some(default)) if !default.matches(def.value_type) => {
                return Err(RegistryError::DefaultTypeMismatch { command, key })
            }
            _ => {}
        }
    }
    Ok(())
}

static REGISTRY: OnceLock<Result<Registry, RegistryError>> = OnceLock::new();

/// The process-wide command registry.
pub fn registry() -> Result<&'static Registry, RegistryError> {
    REGISTRY
        .get_or_init(|| Registry::new(&COMMANDS))
        .as_ref()
        .map_err(Clone::clone)
}

use thiserror::Error;

pub mod capability;
pub mod manifest;
pub mod module;

pub use module::{
    Module, ModuleDefinition, ModuleId, ModuleName, Origin, PackageFlags, PackageSpec, TestFilters,
};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading module manifest: {0}")]
    IO(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Module `{0}` must be a TOML table")]
    NotATable(String),
    #[error("Unknown key `{key}` in module `{module}`")]
    UnknownKey { module: String, key: String },
    #[error("Invalid tempest setting in module `{module}`: expected [section, key, value], got {len} values")]
    InvalidSetting { module: String, len: usize },
    #[error("Empty setup command in module `{0}`")]
    EmptyCommand(String),
}

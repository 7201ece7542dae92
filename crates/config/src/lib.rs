//! Configuration loading for the kraken gateway.
//!
//! Config files are TOML, YAML or JSON. `${VAR}` placeholders are resolved
//! from the environment before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{discover_and_load, load_config, load_or_discover, to_toml},
    schema::{KrakenConfig, RpcConfig},
};

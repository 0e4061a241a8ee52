mod adapter_config;
mod env_vars;

pub use adapter_config::{load_config, AdapterConfig, CredentialProfile, ObjectStorageConfig};

pub use env_vars::expand_env_vars;

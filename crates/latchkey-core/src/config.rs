/// Trait for loading service configuration from environment variables.
///
/// Implementors derive `serde::Deserialize` (using `#[serde(default = ...)]` for
/// optional settings) and call `Config::from_env()` at startup. Field names map
/// to upper-snake-case env vars, e.g. `magic_link_ttl_minutes` reads
/// `MAGIC_LINK_TTL_MINUTES`.
pub trait Config: Sized + serde::de::DeserializeOwned {
    fn try_from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// # Panics
    ///
    /// Panics if any required env var is missing or cannot be deserialized.
    fn from_env() -> Self {
        match Self::try_from_env() {
            Ok(config) => config,
            Err(e) => panic!("failed to load config from environment: {e}"),
        }
    }

    /// Load from an explicit iterator of `(KEY, value)` pairs. Used by tests so
    /// they never touch the process environment.
    fn from_pairs<I>(pairs: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter(pairs)
    }
}

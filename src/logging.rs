//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::error::ServerResult;

/// Install the global subscriber.
///
/// `RUST_LOG` refines the filter; `presence_relay=info` is always added.
/// Returns an error if a subscriber is already installed.
pub fn init_tracing(json: bool) -> ServerResult<()> {
    let filter = EnvFilter::from_default_env().add_directive("presence_relay=info".parse()?);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()?;
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()?;
    }

    Ok(())
}

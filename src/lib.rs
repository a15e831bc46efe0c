//! `winstate` is a higher-level, observable, strongly-typed model of the
//! desktop window state of a windowing operating system: the set of running
//! applications, their windows, the physical displays, and the virtual
//! workspaces ("spaces"). It sits on top of a low-level accessibility
//! interface ([`accessibility::Accessibility`]) that exposes UI objects as
//! opaque element handles carrying attribute dictionaries and emitting
//! asynchronous notifications.
//!
//! Clients call [`initialize`] once to build a [`state::State`], subscribe to
//! typed events ([`state::Event`]) for window/application/space/screen
//! changes, and read or mutate cached properties on [`window::Window`] and
//! [`application::Application`] without blocking on the slow, cross-process
//! accessibility channel.
//!
//! The crate ships one concrete [`accessibility::Accessibility`]
//! implementation, gated behind the `macos-backend` feature
//! ([`accessibility::backend`]), plus an in-memory mock
//! ([`accessibility::mock`]) the whole test suite is built against.
pub mod accessibility;
pub mod application;
pub mod config;
pub mod error;
pub mod geometry;
pub mod ids;
pub mod property;
pub mod screen;
mod space;
pub mod state;
pub mod window;

pub use accessibility::Accessibility;
pub use application::Application;
pub use config::Config;
pub use error::{Error, Result};
pub use geometry::{Point, Rect, Size};
pub use ids::{Pid, ScreenId, SpaceId};
pub use screen::Screen;
pub use state::{Event, State};
pub use window::Window;

#[cfg(feature = "serde")]
pub use space::RecoveryBlob;

/// Build a [`State`] against `accessibility` with the default [`Config`]:
/// enumerates running applications, subscribes to every external OS
/// collaborator, and resolves once initial property initialization is
/// complete.
pub async fn initialize<A: Accessibility>(accessibility: A) -> Result<State<A>> {
    initialize_with_config(accessibility, Config::default()).await
}

/// As [`initialize`], with an explicit [`Config`].
#[cfg(not(feature = "serde"))]
pub async fn initialize_with_config<A: Accessibility>(accessibility: A, config: Config) -> Result<State<A>> {
    State::bootstrap(accessibility, config).await
}

/// As [`initialize`], with an explicit [`Config`].
#[cfg(feature = "serde")]
pub async fn initialize_with_config<A: Accessibility>(accessibility: A, config: Config) -> Result<State<A>> {
    State::bootstrap(accessibility, config, None).await
}

/// As [`initialize_with_config`], but seeds the space observer from a
/// [`RecoveryBlob`] produced by [`State::recovery_blob`] on a previous run,
/// so internal space ids survive a process restart. Ignored if
/// `config.persist_space_probes` is `false`.
#[cfg(feature = "serde")]
pub async fn initialize_with_recovery_blob<A: Accessibility>(
    accessibility: A,
    config: Config,
    recovery_blob: &[u8],
) -> Result<State<A>> {
    State::bootstrap(accessibility, config, Some(recovery_blob)).await
}

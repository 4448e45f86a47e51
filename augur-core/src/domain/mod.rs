//! Domain types shared across the engine.

pub mod bar;
pub mod draw;
pub mod pick;
pub mod rules;
pub mod surface;

pub use bar::Bar;
pub use draw::DrawRow;
pub use pick::Pick;
pub use rules::{ConfigError, GameRules};
pub use surface::{renormalize, uniform, ProbabilitySurface, PROB_FLOOR};

/// Entity key: a game name or a ticker.
pub type EntityId = String;

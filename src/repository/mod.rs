//! Typed read-only query helpers over the relational schema

pub mod game;
pub mod matching;
pub mod player;
pub mod team;

pub use game::{DateQuery, GameRepository, GameSummary};
pub use player::{PlayerNameForm, PlayerRepository};
pub use team::{TeamNameForm, TeamRepository};

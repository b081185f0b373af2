mod game;

pub use game::{Action, Character, CharacterOption, GameSnapshot, Scene, Turn};

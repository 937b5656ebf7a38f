//! Application Services

mod movement_feed;

pub use movement_feed::{ClassifiedPoint, MovementFeed};

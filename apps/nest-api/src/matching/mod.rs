//! Mood profiles, compatibility scoring, and ranked candidate search.

pub mod engine;
pub mod mood;
pub mod score;

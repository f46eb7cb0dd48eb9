mod fixture;

pub use fixture::{Fixture, FixtureEntry, FixtureError};

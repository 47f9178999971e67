//! Pure policies applied on the cast-vote path.

pub mod weight;

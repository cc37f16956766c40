//! Read models assembled for the tracker API.

pub mod overview;

//! Small cross-cutting helpers used by the Intake API and Pipeline Engine.

pub mod sanitize;
pub mod time_range;

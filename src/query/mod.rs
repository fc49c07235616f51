pub mod builder;
pub mod engine;
pub mod guard;
pub mod summary;

pub use builder::{AppliedFilterReport, BuiltQuery, QueryFilter};
pub use engine::{DataEngine, InspectMode, QueryOutput, RawQueryOutput};
pub use guard::GuardedStatement;
pub use summary::{Availability, SummaryReport, Summarizer};

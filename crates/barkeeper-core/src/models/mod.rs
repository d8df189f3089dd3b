pub mod file;
pub mod policy;

pub use file::{AcceptedFile, IngestionOutcome};
pub use policy::{FieldRule, FileLimits, MimeMatch, ResolvedPolicy, ResolvedRule, UploadPolicy, JSON_MIMETYPE};

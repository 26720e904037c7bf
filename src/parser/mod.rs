// Text-level scanning: quoted spans, placeholder markers, connection strings
pub mod quotes;
pub mod normalize;
pub mod uri;

pub use quotes::{DEFAULT_QUOTES, QuoteSpan, ScannedScript, scan_quotes};
pub use normalize::{has_named_marker, named_markers_match, normalize};
pub use uri::{ParsedUri, parse_uri};

//! Read-only lookup engine for dictionaries in the StarDict on-disk format.
//!
//! A dictionary is a set of sibling files sharing one stem: `.ifo` metadata,
//! an `.idx`/`.idx.gz` headword index, a `.dict`/`.dict.dz` record payload
//! and an optional `.syn` synonym index. [`Library`] owns an ordered
//! collection of loaded dictionaries and exposes every lookup mode: exact
//! (with synonym and English-morphology fallback), fuzzy (bounded edit
//! distance), glob pattern, and full-text search over record bodies.
//!
//! # Example
//! ```no_run
//! use stardict_reader::{Library, QueryType, analyze_query};
//!
//! let mut lib = Library::new(true);
//! lib.load(["/usr/share/stardict/dic/mydict.ifo"]);
//! let (kind, payload) = analyze_query("banana");
//! assert_eq!(kind, QueryType::Simple);
//! for i in 0..lib.ndicts() {
//!     let hit = lib.simple_lookup(&payload, i).unwrap();
//!     for idx in hit.indices {
//!         let record = lib.record(i, idx).unwrap();
//!         println!("{}", record.text_fields().collect::<String>());
//!     }
//! }
//! ```

pub mod stardict;

pub use stardict::dict::Dict;
pub use stardict::error::{DictError, Result};
pub use stardict::ifo::DictInfo;
pub use stardict::library::{Library, MAX_FUZZY_DISTANCE, MAX_MATCH_ITEM_PER_LIB};
pub use stardict::query::{analyze_query, Pattern, QueryType};
pub use stardict::record::{Record, RecordField};
pub use stardict::WordLookup;

//! Pipeline stages, one module per command.
//!
//! | Stage | Reads | Writes |
//! |-------|-------|--------|
//! | [`research`] | topic | `output/knowledge_base.md` |
//! | [`sources`] | topic | `output/dynamic_sources.yaml` |
//! | [`discover`] | config, dynamic sources, processed log | `output/candidate_urls.txt` |
//! | [`filter`] | candidates, knowledge base | `database.md`, processed log |
//! | [`enhance`] | `database.md` | `images/`, `database.md` |
//! | [`deploy`] | project root | git remote |
//!
//! Site rendering and exports live in [`crate::outputs`].

pub mod deploy;
pub mod discover;
pub mod enhance;
pub mod filter;
pub mod research;
pub mod sources;

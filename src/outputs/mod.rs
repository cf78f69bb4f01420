//! Output generation for the website and JSON exports.
//!
//! # Submodules
//!
//! - [`site`]: Renders `build/index.html` from the database with ads interleaved
//! - [`json`]: Writes the database as a JSON array for API consumption
//!
//! # Output Structure
//!
//! ```text
//! project_root/
//! ├── build/
//! │   ├── index.html
//! │   └── images/
//! └── output/
//!     └── database.json
//! ```

pub mod json;
pub mod site;

//! Web access: feeds, landing pages, article text and hero images.
//!
//! Discovery follows a two-phase pattern per source:
//!
//! 1. **Feed**: try to read the source URL as RSS 2.0 or Atom ([`feed`])
//! 2. **Crawl**: otherwise treat it as an HTML landing page, collect
//!    same-site links and keep those whose page metadata carries a recent
//!    publication date ([`crawl`])
//!
//! Candidate articles are then fetched and reduced to paragraph text
//! ([`article`]); the enhancement stage downloads hero images ([`images`]).
//!
//! # Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`urls`] | URL normalization and link resolution |
//! | [`dates`] | Lenient publication date parsing |
//! | [`feed`] | RSS/Atom parsing |
//! | [`crawl`] | Same-site link collection and article date lookup |
//! | [`article`] | Paragraph text extraction |
//! | [`images`] | Hero image selection and download |

pub mod article;
pub mod crawl;
pub mod dates;
pub mod feed;
pub mod images;
pub mod urls;

use reqwest::Client;
use std::time::Duration;

/// Build an HTTP client with a fixed user agent, timeout and redirect limit.
pub fn client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(10))
        .timeout(timeout)
        .build()
}

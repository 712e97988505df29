//! Store Module
//!
//! Directory lifecycle and the entry catalog of one package.
//!
//! ## Package Layout
//! ```text
//! {landing_dir}/{name}/
//!   ├── header      version=1.0.0 [author=<name> ]locked=<t|f> geometry=<unit>x<page>
//!   ├── index       one line per non-transient entry
//!   └── var/
//!         └── pages  paged payloads of every entry
//! ```
//!
//! ## Index Line
//! ```text
//! id name kind value_kind load_immediate read_only page_count page...
//! 3  x    var  SCA        0              0         1          0
//! ```

mod header;
mod package;

pub use header::{Geometry, PackageHeader, Version};
pub use package::{EntryFailures, Store};

pub(crate) const HEADER_FILE: &str = "header";
pub(crate) const INDEX_FILE: &str = "index";
pub(crate) const VAR_DIR: &str = "var";
pub(crate) const PAGES_FILE: &str = "pages";
